use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;

use crate::model::Object;
use crate::parser::{ObjectParser, ParseError};
use crate::tokenizer::{Lexer, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    Free { gen_num: u16 },
    InUse { offset: u64, gen_num: u16 },
    Compressed { container: u32, index: usize },
}

#[derive(Debug, Default)]
pub struct XrefTable {
    pub entries: HashMap<u32, XrefEntry>,
    pub trailer: HashMap<String, Object>,
}

#[derive(Debug)]
pub enum XrefError {
    MissingStartxref,
    MalformedTable(String),
    MalformedStream(String),
    MissingRoot,
    Parse(ParseError),
}

impl fmt::Display for XrefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XrefError::MissingStartxref => write!(f, "startxref not found"),
            XrefError::MalformedTable(msg) => write!(f, "malformed xref table: {}", msg),
            XrefError::MalformedStream(msg) => write!(f, "malformed xref stream: {}", msg),
            XrefError::MissingRoot => write!(f, "missing /Root in trailer"),
            XrefError::Parse(err) => write!(f, "xref parse error: {}", err),
        }
    }
}

impl std::error::Error for XrefError {}

impl From<ParseError> for XrefError {
    fn from(err: ParseError) -> Self {
        XrefError::Parse(err)
    }
}

const STARTXREF_WINDOW: usize = 1024;

/// Builds the object directory by following the xref chain from the last
/// `startxref` marker. Entries and trailer keys merge oldest-wins while
/// walking `/Prev`, so incremental updates override their predecessors.
pub fn parse_xref(data: &[u8]) -> Result<XrefTable, XrefError> {
    let mut table = XrefTable::default();
    let mut next_offset = Some(find_startxref(data)?);
    let mut visited: HashSet<u64> = HashSet::new();

    while let Some(offset) = next_offset {
        if !visited.insert(offset) {
            break;
        }
        let start = offset as usize;
        if start >= data.len() {
            return Err(XrefError::MalformedTable(format!(
                "xref offset {} past end of file",
                offset
            )));
        }

        let section_trailer = if data[start..].starts_with(b"xref") {
            read_classic_section(data, start, &mut table.entries)?
        } else {
            read_stream_section(data, start, &mut table.entries)?
        };

        next_offset = section_trailer
            .get("/Prev")
            .and_then(|v| v.as_i64())
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v != 0);
        for (key, value) in section_trailer {
            table.trailer.entry(key).or_insert(value);
        }
    }

    if !table.trailer.contains_key("/Root") {
        return Err(XrefError::MissingRoot);
    }
    Ok(table)
}

fn find_startxref(data: &[u8]) -> Result<u64, XrefError> {
    let tail_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let tail = &data[tail_start..];
    let idx = memchr::memmem::rfind(tail, b"startxref").ok_or(XrefError::MissingStartxref)?;

    let mut pos = tail_start + idx + b"startxref".len();
    while pos < data.len() && data[pos].is_ascii_whitespace() {
        pos += 1;
    }
    let digits_start = pos;
    while pos < data.len() && data[pos].is_ascii_digit() {
        pos += 1;
    }
    if digits_start == pos {
        return Err(XrefError::MissingStartxref);
    }
    std::str::from_utf8(&data[digits_start..pos])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(XrefError::MissingStartxref)
}

/// Classical table: subsections of `start count` headers followed by exactly
/// `count` 20-byte lines, terminated by the `trailer` dictionary.
fn read_classic_section(
    data: &[u8],
    start: usize,
    entries: &mut HashMap<u32, XrefEntry>,
) -> Result<HashMap<String, Object>, XrefError> {
    let mut lexer = Lexer::new(data);
    lexer.set_position(start + b"xref".len());

    loop {
        lexer.skip_whitespace_and_comments();
        let pos = lexer.position();
        if data[pos..].starts_with(b"trailer") {
            lexer.set_position(pos + b"trailer".len());
            break;
        }

        let sub_start = match lexer.next_token() {
            Some(Token::Integer(v)) if v >= 0 => v as u32,
            other => {
                return Err(XrefError::MalformedTable(format!(
                    "expected subsection start, got {:?}",
                    other
                )));
            }
        };
        let count = match lexer.next_token() {
            Some(Token::Integer(v)) if v >= 0 => v as usize,
            other => {
                return Err(XrefError::MalformedTable(format!(
                    "expected subsection count, got {:?}",
                    other
                )));
            }
        };

        lexer.skip_whitespace_and_comments();
        let mut pos = lexer.position();
        for i in 0..count {
            let line = data.get(pos..pos + 20).ok_or_else(|| {
                XrefError::MalformedTable("truncated xref subsection".to_string())
            })?;
            let entry = parse_table_line(line).ok_or_else(|| {
                XrefError::MalformedTable(format!("bad xref line for object {}", sub_start + i as u32))
            })?;
            entries.entry(sub_start + i as u32).or_insert(entry);
            pos += 20;
        }
        lexer.set_position(pos);
    }

    let mut parser = ObjectParser::new(lexer);
    match parser.read_object()? {
        Some(Object::Dictionary(dict)) => Ok(dict),
        other => Err(XrefError::MalformedTable(format!(
            "expected trailer dictionary, got {:?}",
            other
        ))),
    }
}

/// One 20-byte line: `oooooooooo ggggg t` plus a 2-byte terminator.
fn parse_table_line(line: &[u8]) -> Option<XrefEntry> {
    let offset: u64 = std::str::from_utf8(&line[0..10]).ok()?.trim().parse().ok()?;
    let gen_num: u16 = std::str::from_utf8(&line[11..16]).ok()?.trim().parse().ok()?;
    match line[17] {
        b'f' => Some(XrefEntry::Free { gen_num }),
        b'n' => Some(XrefEntry::InUse { offset, gen_num }),
        _ => None,
    }
}

fn read_stream_section(
    data: &[u8],
    start: usize,
    entries: &mut HashMap<u32, XrefEntry>,
) -> Result<HashMap<String, Object>, XrefError> {
    let mut parser = ObjectParser::at_offset(data, start);
    // Indirect object header: num gen obj.
    for _ in 0..3 {
        parser.read_object()?;
    }

    let dict = match parser.read_object()? {
        Some(Object::Dictionary(dict)) => dict,
        other => {
            return Err(XrefError::MalformedStream(format!(
                "expected stream dictionary, got {:?}",
                other
            )));
        }
    };
    if dict.get("/Type").and_then(|v| v.as_name()) != Some("/XRef") {
        return Err(XrefError::MalformedStream("missing /Type /XRef".to_string()));
    }

    let length = dict
        .get("/Length")
        .and_then(|v| v.as_i64())
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| XrefError::MalformedStream("missing /Length".to_string()))?;

    let widths = dict
        .get("/W")
        .and_then(|v| v.as_array())
        .filter(|arr| arr.len() == 3)
        .ok_or_else(|| XrefError::MalformedStream("invalid /W array".to_string()))?;
    let w: [usize; 3] = [
        widths[0].as_i64().unwrap_or(0).max(0) as usize,
        widths[1].as_i64().unwrap_or(0).max(0) as usize,
        widths[2].as_i64().unwrap_or(0).max(0) as usize,
    ];
    let stride = w[0] + w[1] + w[2];
    if stride == 0 {
        return Err(XrefError::MalformedStream("zero-width /W array".to_string()));
    }

    let index = match dict.get("/Index").and_then(|v| v.as_array()) {
        Some(arr) => arr
            .chunks(2)
            .filter_map(|pair| {
                let start = pair.first()?.as_i64()?;
                let count = pair.get(1)?.as_i64()?;
                Some((start.max(0) as u32, count.max(0) as usize))
            })
            .collect(),
        None => {
            let size = dict.get("/Size").and_then(|v| v.as_i64()).unwrap_or(0);
            vec![(0u32, size.max(0) as usize)]
        }
    };

    if !parser.peek_is_keyword("stream") {
        return Err(XrefError::MalformedStream("missing stream keyword".to_string()));
    }
    let _ = parser.next_token();
    let raw = parser.consume_stream(length);

    let mut decoded = if uses_flate_filter(&dict) {
        inflate(&raw).map_err(XrefError::MalformedStream)?
    } else {
        raw
    };

    let (predictor, columns) = decode_parms(&dict);
    if predictor >= 10 {
        let columns = if columns == 0 { stride } else { columns };
        decoded = apply_png_predictor(&decoded, columns, predictor)?;
    }

    parse_stream_entries(&decoded, w, &index, entries);

    Ok(dict)
}

fn uses_flate_filter(dict: &HashMap<String, Object>) -> bool {
    match dict.get("/Filter") {
        Some(Object::Name(name)) => name == "/FlateDecode",
        Some(Object::Array(items)) => {
            matches!(items.first(), Some(Object::Name(name)) if name == "/FlateDecode")
        }
        _ => false,
    }
}

fn decode_parms(dict: &HashMap<String, Object>) -> (i64, usize) {
    let Some(parms) = dict.get("/DecodeParms").and_then(|v| v.as_dict()) else {
        return (1, 0);
    };
    let predictor = parms.get("/Predictor").and_then(|v| v.as_i64()).unwrap_or(1);
    let columns = parms
        .get("/Columns")
        .and_then(|v| v.as_i64())
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(0);
    (predictor, columns)
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| format!("inflate failed: {}", e))?;
    Ok(out)
}

/// Rows of `w0+w1+w2` big-endian fields. A width of 0 defaults the field to
/// 0, except that a zero-width type field means every row is in-use.
fn parse_stream_entries(
    decoded: &[u8],
    w: [usize; 3],
    index: &[(u32, usize)],
    entries: &mut HashMap<u32, XrefEntry>,
) {
    let stride = w[0] + w[1] + w[2];
    let mut cursor = 0usize;
    for &(start, count) in index {
        for j in 0..count {
            if cursor + stride > decoded.len() {
                return;
            }
            let f1 = if w[0] == 0 {
                1
            } else {
                read_field(decoded, cursor, w[0])
            };
            let f2 = read_field(decoded, cursor + w[0], w[1]);
            let f3 = read_field(decoded, cursor + w[0] + w[1], w[2]);
            cursor += stride;

            let id = start + j as u32;
            let entry = match f1 {
                0 => XrefEntry::Free { gen_num: f3 as u16 },
                1 => XrefEntry::InUse {
                    offset: f2,
                    gen_num: f3 as u16,
                },
                2 => XrefEntry::Compressed {
                    container: f2 as u32,
                    index: f3 as usize,
                },
                _ => continue,
            };
            entries.entry(id).or_insert(entry);
        }
    }
}

fn read_field(data: &[u8], start: usize, width: usize) -> u64 {
    let mut value = 0u64;
    for &byte in &data[start..start + width] {
        value = (value << 8) | byte as u64;
    }
    value
}

fn apply_png_predictor(data: &[u8], columns: usize, predictor: i64) -> Result<Vec<u8>, XrefError> {
    if !(10..=15).contains(&predictor) {
        return Err(XrefError::MalformedStream(format!(
            "unsupported predictor {}",
            predictor
        )));
    }
    if columns == 0 {
        return Err(XrefError::MalformedStream("zero predictor columns".to_string()));
    }

    // Each row carries a leading filter byte.
    let row_size = columns + 1;
    let row_count = data.len() / row_size;
    let mut out = vec![0u8; row_count * columns];
    let mut prev_row = vec![0u8; columns];

    for i in 0..row_count {
        let row_start = i * row_size;
        let filter = data[row_start];
        let row = &data[row_start + 1..row_start + row_size];
        let out_row = &mut out[i * columns..(i + 1) * columns];

        match filter {
            1 => {
                let mut left = 0u8;
                for x in 0..columns {
                    let value = row[x].wrapping_add(left);
                    out_row[x] = value;
                    left = value;
                }
            }
            2 => {
                for x in 0..columns {
                    out_row[x] = row[x].wrapping_add(prev_row[x]);
                }
            }
            3 => {
                let mut left = 0u8;
                for x in 0..columns {
                    let avg = ((left as u16 + prev_row[x] as u16) / 2) as u8;
                    let value = row[x].wrapping_add(avg);
                    out_row[x] = value;
                    left = value;
                }
            }
            4 => {
                let mut left = 0u8;
                let mut upper_left = 0u8;
                for x in 0..columns {
                    let upper = prev_row[x];
                    let value = row[x].wrapping_add(paeth(left, upper, upper_left));
                    out_row[x] = value;
                    left = value;
                    upper_left = upper;
                }
            }
            // 0 is no filter; unknown filter bytes degrade the same way.
            _ => out_row.copy_from_slice(row),
        }
        prev_row.copy_from_slice(out_row);
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
