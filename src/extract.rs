use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use crate::cmap::{CMap, parse_cmap};
use crate::content::{ContentStreamParser, Operation};
use crate::model::{Image, ImageKind, Object};
use crate::reader::Reader;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Matrix {
    pub(crate) a: f64,
    pub(crate) b: f64,
    pub(crate) c: f64,
    pub(crate) d: f64,
    pub(crate) e: f64,
    pub(crate) f: f64,
}

impl Matrix {
    fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    /// `x.multiply(y)` composes so that `y` applies first: the result is
    /// `y × x` in the row-vector convention with rows (a b 0)(c d 0)(e f 1).
    fn multiply(self, other: Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    fn translate(tx: f64, ty: f64) -> Matrix {
        Matrix {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: tx,
            f: ty,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct GraphicsState {
    ctm: Matrix,
}

#[derive(Clone, Debug)]
struct TextState {
    font: Option<Arc<Font>>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    /// Horizontal scaling in percent.
    scale: f64,
    leading: f64,
    tm: Matrix,
    tlm: Matrix,
}

impl TextState {
    fn new() -> Self {
        Self {
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            scale: 100.0,
            leading: 0.0,
            tm: Matrix::identity(),
            tlm: Matrix::identity(),
        }
    }
}

/// Per-font decoding and metric state, cached on the reader by object
/// number so repeated pages pay for parsing once.
#[derive(Debug, Clone)]
pub(crate) struct Font {
    base_font: String,
    cmap: CMap,
    /// Char code to glyph name, from /Encoding /Differences.
    encoding: HashMap<u32, String>,
    /// Char code to width in 1/1000 em.
    widths: HashMap<u32, f64>,
    missing_width: f64,
    space_width: f64,
    is_cid: bool,
}

const DEFAULT_SPACE_WIDTH: f64 = 250.0;

fn load_font(reader: &Reader, dict: &HashMap<String, Object>, obj_num: u32) -> Arc<Font> {
    if obj_num != 0 {
        if let Some(cached) = reader.cached_font(obj_num) {
            return cached;
        }
    }

    let base_font = dict
        .get("/BaseFont")
        .map(|v| reader.resolve(v))
        .as_ref()
        .and_then(|v| v.as_name())
        .unwrap_or("")
        .to_string();

    let mut widths: HashMap<u32, f64> = HashMap::new();
    let mut is_cid = false;
    match dict.get("/FirstChar").map(|v| reader.resolve(v)).and_then(|v| v.as_i64()) {
        Some(first_char) => {
            if let Some(width_array) = dict
                .get("/Widths")
                .map(|v| reader.resolve(v))
                .as_ref()
                .and_then(|v| v.as_array())
            {
                for (i, width) in width_array.iter().enumerate() {
                    if let Some(width) = width.as_f64() {
                        widths.insert((first_char + i as i64).max(0) as u32, width);
                    }
                }
            }
        }
        None => is_cid = true,
    }

    let space_width = widths.get(&32).copied().unwrap_or(DEFAULT_SPACE_WIDTH);

    let mut cmap = CMap::new();
    let mut encoding = HashMap::new();
    match dict.get("/ToUnicode").map(|v| reader.resolve(v)) {
        Some(Object::Stream { data, .. }) => cmap = parse_cmap(&data),
        _ => {
            if let Some(enc) = dict.get("/Encoding") {
                encoding = parse_encoding_differences(reader, enc);
            }
        }
    }

    let font = Arc::new(Font {
        base_font,
        cmap,
        encoding,
        widths,
        missing_width: 0.0,
        space_width,
        is_cid,
    });
    debug!(
        "loaded font {} (cid={}, {} widths, {} cmap entries)",
        font.base_font,
        font.is_cid,
        font.widths.len(),
        font.cmap.len()
    );
    if obj_num != 0 {
        reader.cache_font(obj_num, font.clone());
    }
    font
}

/// Walks /Differences: a number selects the current code, each following
/// name binds to sequential codes. Named built-in encodings are ignored.
fn parse_encoding_differences(reader: &Reader, enc: &Object) -> HashMap<u32, String> {
    let mut out = HashMap::new();
    let resolved = reader.resolve(enc);
    let Some(enc_dict) = resolved.as_dict() else {
        return out;
    };
    let differences = enc_dict.get("/Differences").map(|d| reader.resolve(d));
    let Some(differences) = differences.as_ref().and_then(|d| d.as_array()) else {
        return out;
    };

    let mut current_code: u32 = 0;
    for item in differences {
        match item {
            Object::Number(code) => current_code = (*code).max(0.0) as u32,
            Object::Name(glyph_name) => {
                out.insert(current_code, glyph_name.clone());
                current_code += 1;
            }
            _ => {}
        }
    }
    out
}

/// Runs the page's content operators and reconstructs reading-order text
/// plus (optionally) image placements.
pub struct Extractor<'a> {
    reader: &'a Reader,
    page: &'a HashMap<String, Object>,

    gstate: GraphicsState,
    gstack: Vec<GraphicsState>,
    text: TextState,

    fonts: HashMap<String, Arc<Font>>,

    last_x: f64,
    last_y: f64,
    buffer: String,

    images: Option<Vec<Image>>,
    xobjects: Option<HashMap<String, Object>>,
}

impl<'a> Extractor<'a> {
    pub fn new(
        reader: &'a Reader,
        page: &'a HashMap<String, Object>,
        extract_images: bool,
    ) -> Self {
        let mut fonts = HashMap::new();
        let mut xobjects = None;

        let resources = page.get("/Resources").map(|r| reader.resolve(r));
        if let Some(resources) = resources.as_ref().and_then(|r| r.as_dict()) {
            let font_dict = resources.get("/Font").map(|f| reader.resolve(f));
            if let Some(font_dict) = font_dict.as_ref().and_then(|f| f.as_dict()) {
                for (name, font_ref) in font_dict {
                    let obj_num = match font_ref {
                        Object::Reference { obj_num, .. } => *obj_num,
                        _ => 0,
                    };
                    let font_obj = reader.resolve(font_ref);
                    if let Some(dict) = font_obj.as_dict() {
                        fonts.insert(name.clone(), load_font(reader, dict, obj_num));
                    }
                }
            }
            if extract_images {
                xobjects = resources
                    .get("/XObject")
                    .map(|x| reader.resolve(x))
                    .as_ref()
                    .and_then(|x| x.as_dict())
                    .cloned();
            }
        }

        Extractor {
            reader,
            page,
            gstate: GraphicsState {
                ctm: Matrix::identity(),
            },
            gstack: Vec::new(),
            text: TextState::new(),
            fonts,
            last_x: 0.0,
            last_y: 0.0,
            buffer: String::new(),
            images: extract_images.then(Vec::new),
            xobjects,
        }
    }

    pub fn extract_text(&mut self) -> String {
        let contents = self.page.get("/Contents").map(|c| self.reader.resolve(c));
        let mut streams: Vec<Vec<u8>> = Vec::new();
        match contents {
            Some(Object::Array(items)) => {
                for item in items {
                    if let Object::Stream { data, .. } = self.reader.resolve(&item) {
                        streams.push(data);
                    }
                }
            }
            Some(Object::Stream { data, .. }) => streams.push(data),
            _ => {}
        }

        for data in streams {
            let mut parser = ContentStreamParser::new(&data);
            while let Some(op) = parser.next_operation() {
                self.process_op(op);
            }
        }
        self.buffer.clone()
    }

    /// Images recorded on this page; `None` when extraction was disabled.
    pub fn into_images(self) -> Option<Vec<Image>> {
        self.images
    }

    fn process_op(&mut self, op: Operation) {
        match op.operator.as_str() {
            "q" => self.gstack.push(self.gstate),
            "Q" => {
                if let Some(prev) = self.gstack.pop() {
                    self.gstate = prev;
                }
            }
            "cm" => {
                if op.operands.len() == 6 {
                    let m = matrix_from_operands(&op.operands);
                    self.gstate.ctm = self.gstate.ctm.multiply(m);
                }
            }
            "BT" => {
                self.text.tm = Matrix::identity();
                self.text.tlm = Matrix::identity();
            }
            "ET" => {}
            "Tc" => self.text.char_spacing = operand_num(&op.operands, 0),
            "Tw" => self.text.word_spacing = operand_num(&op.operands, 0),
            "Tz" => self.text.scale = operand_num(&op.operands, 0),
            "TL" => self.text.leading = operand_num(&op.operands, 0),
            "Tf" => {
                if let Some(name) = op.operands.first().and_then(|v| v.as_name()) {
                    if let Some(font) = self.fonts.get(name) {
                        self.text.font = Some(font.clone());
                    }
                }
                self.text.font_size = operand_num(&op.operands, 1);
            }
            "Td" => {
                let tx = operand_num(&op.operands, 0);
                let ty = operand_num(&op.operands, 1);
                self.text.tlm = self.text.tlm.multiply(Matrix::translate(tx, ty));
                self.text.tm = self.text.tlm;
            }
            "TD" => {
                let tx = operand_num(&op.operands, 0);
                let ty = operand_num(&op.operands, 1);
                self.text.leading = -ty;
                self.text.tlm = self.text.tlm.multiply(Matrix::translate(tx, ty));
                self.text.tm = self.text.tlm;
            }
            "Tm" => {
                if op.operands.len() == 6 {
                    let m = matrix_from_operands(&op.operands);
                    self.text.tm = m;
                    self.text.tlm = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(bytes) = op.operands.first().and_then(|v| v.as_string_bytes()) {
                    self.show_string(bytes);
                }
            }
            "TJ" => {
                let Some(Object::Array(items)) = op.operands.into_iter().next() else {
                    return;
                };
                for item in items {
                    match item {
                        Object::Number(kern) => {
                            let shift = -kern / 1000.0
                                * self.text.font_size
                                * (self.text.scale / 100.0);
                            self.text.tm.e += shift * self.text.tm.a;
                            self.text.tm.f += shift * self.text.tm.b;
                        }
                        Object::String(bytes) | Object::HexString(bytes) => {
                            self.show_string(&bytes);
                        }
                        _ => {}
                    }
                }
            }
            "'" => {
                self.next_line();
                if let Some(bytes) = op.operands.first().and_then(|v| v.as_string_bytes()) {
                    self.show_string(bytes);
                }
            }
            "\"" => {
                if op.operands.len() >= 3 {
                    self.text.word_spacing = operand_num(&op.operands, 0);
                    self.text.char_spacing = operand_num(&op.operands, 1);
                    self.next_line();
                    if let Some(bytes) = op.operands.get(2).and_then(|v| v.as_string_bytes()) {
                        self.show_string(bytes);
                    }
                }
            }
            "BI" => {
                if self.images.is_some() {
                    if let Some(dict) = op.operands.first().and_then(|v| v.as_dict()) {
                        self.record_inline_image(dict);
                    }
                }
            }
            "Do" => {
                if self.images.is_some() {
                    if let Some(name) = op.operands.first().and_then(|v| v.as_name()) {
                        self.handle_do(name);
                    }
                }
            }
            // Painting, color and marked-content operators carry nothing
            // the text machine needs.
            _ => {}
        }
    }

    fn next_line(&mut self) {
        let ty = -self.text.leading;
        self.text.tlm = self.text.tlm.multiply(Matrix::translate(0.0, ty));
        self.text.tm = self.text.tlm;
    }

    /// Shows one string: synthesizes a line break or space from the
    /// position delta, decodes the bytes, then advances the text matrix by
    /// the string's width.
    fn show_string(&mut self, bytes: &[u8]) {
        let fm = self.gstate.ctm.multiply(self.text.tm);
        let (x, y) = (fm.e, fm.f);

        let font = self.text.font.clone();
        let size = self.text.font_size;
        let scale = self.text.scale / 100.0;

        let space_width_user = font
            .as_ref()
            .map(|f| f.space_width / 1000.0 * size * scale)
            .unwrap_or(0.0);
        let threshold = (size * 0.2).max(space_width_user * 0.5);

        if (y - self.last_y).abs() > size * 0.5 {
            if !self.buffer.is_empty() {
                self.buffer.push('\n');
            }
        } else {
            let gap = x - self.last_x;
            if gap > threshold
                && !self.buffer.is_empty()
                && !self.buffer.ends_with('\n')
                && !self.buffer.ends_with(' ')
            {
                self.buffer.push(' ');
            }
        }

        let decoded = decode_string(font.as_deref(), bytes);
        self.buffer.push_str(&decoded);

        let total = match font.as_deref() {
            Some(font) if !font.widths.is_empty() => {
                let mut sum = 0.0;
                for &byte in bytes {
                    sum += font
                        .widths
                        .get(&(byte as u32))
                        .copied()
                        .unwrap_or(font.missing_width);
                }
                let mut total = sum / 1000.0 * size;
                total += bytes.len() as f64 * self.text.char_spacing;
                let space_count = decoded.matches(' ').count();
                total += space_count as f64 * self.text.word_spacing;
                total * scale
            }
            // No metrics: 0.5 em per decoded character.
            _ => decoded.chars().count() as f64 * size * 0.5 * scale,
        };

        self.last_x = x + total;
        self.last_y = y;
        self.text.tm.e += total * self.text.tm.a;
        self.text.tm.f += total * self.text.tm.b;
    }

    fn handle_do(&mut self, name: &str) {
        let Some(xobj_ref) = self.xobjects.as_ref().and_then(|d| d.get(name)).cloned() else {
            return;
        };
        let mut visited = HashSet::new();
        if let Object::Reference { obj_num, gen_num } = &xobj_ref {
            visited.insert((*obj_num, *gen_num));
        }
        let xobj = self.reader.resolve(&xobj_ref);
        self.record_xobject(name, &xobj, &mut visited);
    }

    fn record_xobject(&mut self, name: &str, xobj: &Object, visited: &mut HashSet<(u32, u16)>) {
        let dict = match xobj {
            Object::Stream { dict, .. } => dict,
            Object::Dictionary(dict) => dict,
            _ => return,
        };
        let subtype = dict.get("/Subtype").map(|s| self.reader.resolve(s));
        match subtype.as_ref().and_then(|s| s.as_name()) {
            Some("/Form") => self.process_form_xobject(xobj, visited),
            Some("/Image") => {
                let width = dict
                    .get("/Width")
                    .map(|v| self.reader.resolve(v))
                    .and_then(|v| v.as_f64());
                let height = dict
                    .get("/Height")
                    .map(|v| self.reader.resolve(v))
                    .and_then(|v| v.as_f64());
                let color_space = dict
                    .get("/ColorSpace")
                    .map(|v| self.reader.resolve(v))
                    .as_ref()
                    .and_then(|v| v.as_name())
                    .map(|v| v.trim_start_matches('/').to_string());
                let image = Image {
                    kind: ImageKind::Image,
                    id: Some(name.trim_start_matches('/').to_string()),
                    rect: Some(self.image_rect()),
                    width,
                    height,
                    color_space,
                };
                if let Some(images) = &mut self.images {
                    images.push(image);
                }
            }
            _ => {}
        }
    }

    /// Forms hold nested content streams that can paint further XObjects;
    /// only their `Do` operators matter here. The visited set breaks
    /// reference cycles between forms.
    fn process_form_xobject(&mut self, form: &Object, visited: &mut HashSet<(u32, u16)>) {
        let Object::Stream { dict, data } = form else {
            return;
        };
        let form_resources = dict.get("/Resources").map(|r| self.reader.resolve(r));
        let nested_xobjects = form_resources
            .as_ref()
            .and_then(|r| r.as_dict())
            .and_then(|d| d.get("/XObject"))
            .map(|x| self.reader.resolve(x));
        let Some(nested_xobjects) = nested_xobjects.as_ref().and_then(|x| x.as_dict()) else {
            return;
        };

        let mut parser = ContentStreamParser::new(data);
        while let Some(op) = parser.next_operation() {
            if op.operator != "Do" {
                continue;
            }
            let Some(name) = op.operands.first().and_then(|v| v.as_name()) else {
                continue;
            };
            let Some(nested_ref) = nested_xobjects.get(name) else {
                continue;
            };
            if let Object::Reference { obj_num, gen_num } = nested_ref {
                if !visited.insert((*obj_num, *gen_num)) {
                    continue;
                }
            }
            let nested = self.reader.resolve(nested_ref);
            self.record_xobject(name, &nested, visited);
        }
    }

    fn record_inline_image(&mut self, dict: &HashMap<String, Object>) {
        let width = dict
            .get("/W")
            .or_else(|| dict.get("/Width"))
            .and_then(|v| v.as_f64());
        let height = dict
            .get("/H")
            .or_else(|| dict.get("/Height"))
            .and_then(|v| v.as_f64());
        let color_space = dict
            .get("/CS")
            .or_else(|| dict.get("/ColorSpace"))
            .and_then(|v| v.as_name())
            .map(|v| v.trim_start_matches('/').to_string());
        let image = Image {
            kind: ImageKind::InlineImage,
            id: None,
            rect: Some(self.image_rect()),
            width,
            height,
            color_space,
        };
        if let Some(images) = &mut self.images {
            images.push(image);
        }
    }

    /// Images paint into the unit square; the CTM turns that into a page
    /// position and extent.
    fn image_rect(&self) -> [f64; 4] {
        let ctm = self.gstate.ctm;
        [
            ctm.e,
            ctm.f,
            (ctm.a * ctm.a + ctm.b * ctm.b).sqrt(),
            (ctm.c * ctm.c + ctm.d * ctm.d).sqrt(),
        ]
    }
}

fn operand_num(operands: &[Object], index: usize) -> f64 {
    operands.get(index).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn matrix_from_operands(operands: &[Object]) -> Matrix {
    Matrix {
        a: operand_num(operands, 0),
        b: operand_num(operands, 1),
        c: operand_num(operands, 2),
        d: operand_num(operands, 3),
        e: operand_num(operands, 4),
        f: operand_num(operands, 5),
    }
}

/// Decodes glyph codes through three fallbacks: ToUnicode CMap (greedy
/// 2-byte then 1-byte), /Encoding glyph names, then printable ASCII.
fn decode_string(font: Option<&Font>, bytes: &[u8]) -> String {
    match font {
        Some(font) if !font.cmap.is_empty() => {
            let mut out = String::new();
            let mut i = 0;
            while i < bytes.len() {
                if i + 1 < bytes.len() {
                    if let Some(mapped) = font.cmap.get(&bytes[i..i + 2]) {
                        out.push_str(mapped);
                        i += 2;
                        continue;
                    }
                }
                if let Some(mapped) = font.cmap.get(&bytes[i..i + 1]) {
                    out.push_str(mapped);
                    i += 1;
                    continue;
                }
                out.push(bytes[i] as char);
                i += 1;
            }
            out
        }
        Some(font) if !font.encoding.is_empty() => {
            let mut out = String::new();
            for &byte in bytes {
                match font.encoding.get(&(byte as u32)) {
                    Some(glyph_name) => match glyph_to_unicode(glyph_name) {
                        Some(mapped) => out.push_str(mapped),
                        None => {
                            let raw = glyph_name.as_bytes();
                            if raw.len() == 2 && raw[0] == b'/' {
                                out.push(raw[1] as char);
                            } else {
                                out.push(byte as char);
                            }
                        }
                    },
                    None => out.push(byte as char),
                }
            }
            out
        }
        _ => filter_control_chars(bytes),
    }
}

/// Keeps printable ASCII plus tab/LF/CR; other control bytes are dropped.
fn filter_control_chars(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|&&b| (0x20..=0x7E).contains(&b) || matches!(b, 0x09 | 0x0A | 0x0D))
        .map(|&b| b as char)
        .collect()
}

/// PostScript glyph name to Unicode, covering ASCII, ligatures, extended
/// Latin, math, Greek, astronomy symbols, super/subscripts and zero-width
/// characters.
fn glyph_to_unicode(name: &str) -> Option<&'static str> {
    let mapped = match name {
        "/space" => " ",
        "/exclam" => "!",
        "/quotedbl" => "\"",
        "/numbersign" => "#",
        "/dollar" => "$",
        "/percent" => "%",
        "/ampersand" => "&",
        "/quoteright" | "/quotesingle" => "'",
        "/parenleft" => "(",
        "/parenright" => ")",
        "/asterisk" => "*",
        "/plus" => "+",
        "/comma" => ",",
        "/hyphen" => "-",
        "/period" => ".",
        "/slash" => "/",
        "/zero" => "0",
        "/one" => "1",
        "/two" => "2",
        "/three" => "3",
        "/four" => "4",
        "/five" => "5",
        "/six" => "6",
        "/seven" => "7",
        "/eight" => "8",
        "/nine" => "9",
        "/colon" => ":",
        "/semicolon" => ";",
        "/less" => "<",
        "/equal" => "=",
        "/greater" => ">",
        "/question" => "?",
        "/at" => "@",
        "/A" => "A",
        "/B" => "B",
        "/C" => "C",
        "/D" => "D",
        "/E" => "E",
        "/F" => "F",
        "/G" => "G",
        "/H" => "H",
        "/I" => "I",
        "/J" => "J",
        "/K" => "K",
        "/L" => "L",
        "/M" => "M",
        "/N" => "N",
        "/O" => "O",
        "/P" => "P",
        "/Q" => "Q",
        "/R" => "R",
        "/S" => "S",
        "/T" => "T",
        "/U" => "U",
        "/V" => "V",
        "/W" => "W",
        "/X" => "X",
        "/Y" => "Y",
        "/Z" => "Z",
        "/bracketleft" => "[",
        "/backslash" => "\\",
        "/bracketright" => "]",
        "/asciicircum" => "^",
        "/underscore" => "_",
        "/grave" | "/quoteleft" => "`",
        "/a" => "a",
        "/b" => "b",
        "/c" => "c",
        "/d" => "d",
        "/e" => "e",
        "/f" => "f",
        "/g" => "g",
        "/h" => "h",
        "/i" => "i",
        "/j" => "j",
        "/k" => "k",
        "/l" => "l",
        "/m" => "m",
        "/n" => "n",
        "/o" => "o",
        "/p" => "p",
        "/q" => "q",
        "/r" => "r",
        "/s" => "s",
        "/t" => "t",
        "/u" => "u",
        "/v" => "v",
        "/w" => "w",
        "/x" => "x",
        "/y" => "y",
        "/z" => "z",
        "/braceleft" => "{",
        "/bar" => "|",
        "/braceright" => "}",
        "/asciitilde" => "~",

        // Ligatures
        "/fi" => "fi",
        "/fl" => "fl",
        "/ff" => "ff",
        "/ffi" => "ffi",
        "/ffl" => "ffl",
        "/st" => "st",
        "/ct" => "ct",
        "/IJ" => "IJ",
        "/ij" => "ij",

        // Extended Latin
        "/AE" => "Æ",
        "/ae" => "æ",
        "/OE" => "Œ",
        "/oe" => "œ",
        "/oslash" => "ø",
        "/Oslash" => "Ø",
        "/lslash" => "ł",
        "/Lslash" => "Ł",
        "/Eth" => "Ð",
        "/eth" => "ð",
        "/Thorn" => "Þ",
        "/thorn" => "þ",
        "/ssharp" => "ß",
        "/Scaron" => "Š",
        "/scaron" => "š",
        "/Zcaron" => "Ž",
        "/zcaron" => "ž",
        "/Ccedilla" => "Ç",
        "/ccedilla" => "ç",

        // Mathematical operators; minus is U+2212, not the hyphen.
        "/minus" => "−",
        "/multiply" => "×",
        "/divide" => "÷",
        "/notequal" => "≠",
        "/lessequal" => "≤",
        "/greaterequal" => "≥",
        "/approxequal" => "≈",
        "/infinity" => "∞",
        "/integral" => "∫",
        "/product" => "∏",
        "/summation" => "∑",
        "/radical" => "√",
        "/partialdiff" => "∂",
        "/plusminus" => "±",
        "/therefore" => "∴",
        "/proportional" => "∝",
        "/angle" => "∠",
        "/logicaland" => "∧",
        "/logicalor" => "∨",
        "/intersection" => "∩",
        "/union" => "∪",

        // Greek
        "/Alpha" => "Α",
        "/Beta" => "Β",
        "/Gamma" => "Γ",
        "/Delta" => "Δ",
        "/Epsilon" => "Ε",
        "/Zeta" => "Ζ",
        "/Eta" => "Η",
        "/Theta" => "Θ",
        "/Iota" => "Ι",
        "/Kappa" => "Κ",
        "/Lambda" => "Λ",
        "/Mu" => "Μ",
        "/Nu" => "Ν",
        "/Xi" => "Ξ",
        "/Omicron" => "Ο",
        "/Pi" => "Π",
        "/Rho" => "Ρ",
        "/Sigma" => "Σ",
        "/Tau" => "Τ",
        "/Upsilon" => "Υ",
        "/Phi" => "Φ",
        "/Chi" => "Χ",
        "/Psi" => "Ψ",
        "/Omega" => "Ω",
        "/alpha" => "α",
        "/beta" => "β",
        "/gamma" => "γ",
        "/delta" => "δ",
        "/epsilon" => "ε",
        "/zeta" => "ζ",
        "/eta" => "η",
        "/theta" => "θ",
        "/iota" => "ι",
        "/kappa" => "κ",
        "/lambda" => "λ",
        "/mu" => "μ",
        "/nu" => "ν",
        "/xi" => "ξ",
        "/omicron" => "ο",
        "/pi" => "π",
        "/rho" => "ρ",
        "/sigma" => "σ",
        "/tau" => "τ",
        "/upsilon" => "υ",
        "/phi" => "φ",
        "/chi" => "χ",
        "/psi" => "ψ",
        "/omega" => "ω",

        // Astronomy and physics
        "/circledot" => "⊙",
        "/sun" => "☉",
        "/venus" => "♀",
        "/earth" => "♁",
        "/mars" => "♂",
        "/jupiter" => "♃",
        "/saturn" => "♄",
        "/uranus" => "♅",
        "/neptune" => "♆",
        "/pluto" => "♇",

        // Superscripts
        "/zero.superior" => "⁰",
        "/one.superior" => "¹",
        "/two.superior" => "²",
        "/three.superior" => "³",
        "/four.superior" => "⁴",
        "/five.superior" => "⁵",
        "/six.superior" => "⁶",
        "/seven.superior" => "⁷",
        "/eight.superior" => "⁸",
        "/nine.superior" => "⁹",
        "/plus.superior" => "⁺",
        "/minus.superior" => "⁻",

        // Subscripts
        "/zero.inferior" => "₀",
        "/one.inferior" => "₁",
        "/two.inferior" => "₂",
        "/three.inferior" => "₃",
        "/four.inferior" => "₄",
        "/five.inferior" => "₅",
        "/six.inferior" => "₆",
        "/seven.inferior" => "₇",
        "/eight.inferior" => "₈",
        "/nine.inferior" => "₉",
        "/plus.inferior" => "₊",
        "/minus.inferior" => "₋",

        // Zero-width characters
        "/zerowidthspace" => "\u{200B}",
        "/zerowidthnonjoiner" => "\u{200C}",
        "/zerowidthjoiner" => "\u{200D}",

        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_font() -> Font {
        Font {
            base_font: "/Helvetica".to_string(),
            cmap: CMap::new(),
            encoding: HashMap::new(),
            widths: HashMap::new(),
            missing_width: 0.0,
            space_width: DEFAULT_SPACE_WIDTH,
            is_cid: false,
        }
    }

    #[test]
    fn multiply_applies_argument_first() {
        let scale = Matrix {
            a: 2.0,
            b: 0.0,
            c: 0.0,
            d: 2.0,
            e: 0.0,
            f: 0.0,
        };
        // translate-then-scale: the translation doubles.
        let m = scale.multiply(Matrix::translate(10.0, 5.0));
        assert_eq!((m.e, m.f), (20.0, 10.0));
        // scale-then-translate: the translation stays put.
        let m = Matrix::translate(10.0, 5.0).multiply(scale);
        assert_eq!((m.e, m.f), (10.0, 5.0));
    }

    #[test]
    fn translate_composes_additively() {
        let m = Matrix::translate(3.0, 4.0).multiply(Matrix::translate(1.0, 2.0));
        assert_eq!((m.e, m.f), (4.0, 6.0));
    }

    #[test]
    fn decode_prefers_two_byte_cmap_keys() {
        let mut font = test_font();
        font.cmap = parse_cmap(b"1 beginbfchar\n<0041> <0061>\nendbfchar\n1 beginbfchar\n<42> <0058>\nendbfchar");
        assert_eq!(decode_string(Some(&font), &[0x00, 0x41]), "a");
        assert_eq!(decode_string(Some(&font), &[0x42]), "X");
        // Unmapped bytes pass through one at a time.
        assert_eq!(decode_string(Some(&font), &[0x43]), "C");
    }

    #[test]
    fn decode_uses_encoding_glyph_names() {
        let mut font = test_font();
        font.encoding.insert(0x01, "/fi".to_string());
        font.encoding.insert(0x02, "/q".to_string());
        font.encoding.insert(0x03, "/unknownglyph".to_string());
        assert_eq!(decode_string(Some(&font), &[0x01, 0x02]), "fiq");
        // Unknown long names fall back to the raw byte.
        assert_eq!(decode_string(Some(&font), &[0x03]), "\u{3}");
        // No entry at all also falls back to the byte.
        assert_eq!(decode_string(Some(&font), b"A"), "A");
    }

    #[test]
    fn decode_without_font_filters_control_bytes() {
        assert_eq!(decode_string(None, b"He\x00ll\x07o\tworld\n"), "Hello\tworld\n");
        assert_eq!(decode_string(None, &[0x1B, 0x7F]), "");
    }

    #[test]
    fn glyph_table_covers_the_special_ranges() {
        assert_eq!(glyph_to_unicode("/space"), Some(" "));
        assert_eq!(glyph_to_unicode("/ffi"), Some("ffi"));
        assert_eq!(glyph_to_unicode("/minus"), Some("−"));
        assert_eq!(glyph_to_unicode("/omega"), Some("ω"));
        assert_eq!(glyph_to_unicode("/saturn"), Some("♄"));
        assert_eq!(glyph_to_unicode("/two.superior"), Some("²"));
        assert_eq!(glyph_to_unicode("/nine.inferior"), Some("₉"));
        assert_eq!(glyph_to_unicode("/zerowidthjoiner"), Some("\u{200D}"));
        assert_eq!(glyph_to_unicode("/bogus"), None);
    }
}
