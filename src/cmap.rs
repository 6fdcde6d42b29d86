use std::collections::HashMap;

use crate::model::Object;
use crate::parser::ObjectParser;

/// Mapping from raw 1- or 2-byte character codes to Unicode strings, built
/// from a ToUnicode stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CMap {
    map: HashMap<Vec<u8>, String>,
}

impl CMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

/// Parses a ToUnicode stream. Everything that is not a bfchar/bfrange block
/// is PostScript boilerplate and gets skipped; per-entry oddities skip the
/// entry and keep going.
pub fn parse_cmap(data: &[u8]) -> CMap {
    let mut cmap = CMap::new();
    let mut parser = ObjectParser::from_bytes(data);

    loop {
        let obj = match parser.read_object() {
            Ok(Some(obj)) => obj,
            Ok(None) => break,
            Err(_) => continue,
        };
        match obj.as_keyword() {
            Some("beginbfchar") => parse_bfchar(&mut parser, &mut cmap),
            Some("beginbfrange") => parse_bfrange(&mut parser, &mut cmap),
            _ => {}
        }
    }
    cmap
}

/// `<src> <dst>` pairs until `endbfchar`.
fn parse_bfchar(parser: &mut ObjectParser<'_>, cmap: &mut CMap) {
    loop {
        let src = match parser.read_object() {
            Ok(Some(obj)) => obj,
            Ok(None) => return,
            Err(_) => continue,
        };
        match src {
            Object::Keyword(kw) if kw == "endbfchar" => return,
            Object::Keyword(_) => continue,
            Object::HexString(src) => {
                let Ok(Some(Object::HexString(dst))) = parser.read_object() else {
                    continue;
                };
                cmap.map.insert(src, utf16be_to_string(&dst));
            }
            _ => {
                let _ = parser.read_object();
            }
        }
    }
}

/// `<start> <end> <dstStart>` or `<start> <end> [<dst> ...]` rows until
/// `endbfrange`.
fn parse_bfrange(parser: &mut ObjectParser<'_>, cmap: &mut CMap) {
    loop {
        let start = match parser.read_object() {
            Ok(Some(obj)) => obj,
            Ok(None) => return,
            Err(_) => continue,
        };
        match &start {
            Object::Keyword(kw) if kw == "endbfrange" => return,
            Object::Keyword(_) => continue,
            _ => {}
        }
        let (Ok(Some(end)), Ok(Some(dst))) = (parser.read_object(), parser.read_object()) else {
            return;
        };

        let (Object::HexString(start), Object::HexString(end)) = (start, end) else {
            continue;
        };
        let key_width = start.len();
        let start_code = bytes_to_code(&start);
        let end_code = bytes_to_code(&end);
        // Codes are at most 2 bytes wide; anything larger is garbage.
        if end_code < start_code || end_code - start_code > 0xFFFF {
            continue;
        }

        match dst {
            Object::Array(items) => {
                for (i, item) in items.into_iter().enumerate() {
                    let Object::HexString(dst) = item else {
                        continue;
                    };
                    let code = start_code + i as u32;
                    if code > end_code {
                        break;
                    }
                    cmap.map
                        .insert(code_to_bytes(code, key_width), utf16be_to_string(&dst));
                }
            }
            Object::HexString(dst) => {
                let dst_width = dst.len();
                let dst_start = bytes_to_code(&dst);
                for i in 0..=(end_code - start_code) {
                    let key = code_to_bytes(start_code + i, key_width);
                    // The destination increments in its last byte, then
                    // re-decodes as UTF-16BE at the original width.
                    let value = code_to_bytes(dst_start + i, dst_width);
                    cmap.map.insert(key, utf16be_to_string(&value));
                }
            }
            _ => {}
        }
    }
}

fn bytes_to_code(bytes: &[u8]) -> u32 {
    let mut value = 0u32;
    for &byte in bytes {
        value = (value << 8) | byte as u32;
    }
    value
}

fn code_to_bytes(mut value: u32, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    for slot in out.iter_mut().rev() {
        *slot = (value & 0xFF) as u8;
        value >>= 8;
    }
    out
}

/// Destination bytes are UTF-16BE with surrogate pairs; odd-length payloads
/// fall back to the raw byte string.
fn utf16be_to_string(bytes: &[u8]) -> String {
    if bytes.len() % 2 != 0 {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
