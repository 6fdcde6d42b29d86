use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::sync::{Arc, Mutex};

use log::warn;

use crate::extract::Font;
use crate::model::Object;
use crate::parser::{ObjectParser, ParseError};
use crate::pdf_crypto::EncryptionHandler;
use crate::xref::{XrefEntry, XrefError, XrefTable, parse_xref};

#[derive(Debug)]
pub enum ReadError {
    Io(std::io::Error),
    Xref(XrefError),
    Parse(ParseError),
    Crypto(String),
    MissingObject { obj_num: u32 },
    TypeMismatch { expected: &'static str, found: String },
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Io(err) => write!(f, "io error: {}", err),
            ReadError::Xref(err) => write!(f, "{}", err),
            ReadError::Parse(err) => write!(f, "{}", err),
            ReadError::Crypto(msg) => write!(f, "{}", msg),
            ReadError::MissingObject { obj_num } => {
                write!(f, "object {} not found in xref", obj_num)
            }
            ReadError::TypeMismatch { expected, found } => {
                write!(f, "expected {}, got {}", expected, found)
            }
        }
    }
}

impl std::error::Error for ReadError {}

impl From<std::io::Error> for ReadError {
    fn from(err: std::io::Error) -> Self {
        ReadError::Io(err)
    }
}

impl From<XrefError> for ReadError {
    fn from(err: XrefError) -> Self {
        ReadError::Xref(err)
    }
}

impl From<ParseError> for ReadError {
    fn from(err: ParseError) -> Self {
        ReadError::Parse(err)
    }
}

/// Dictionary keys whose values stay outside the encryption envelope.
fn is_metadata_key(key: &str) -> bool {
    matches!(
        key,
        "/Type"
            | "/Subtype"
            | "/Length"
            | "/Filter"
            | "/DecodeParms"
            | "/Width"
            | "/Height"
            | "/BitsPerComponent"
            | "/ColorSpace"
            | "/Encrypt"
            | "/ID"
            | "/Size"
            | "/Root"
            | "/Info"
            | "/Prev"
            | "/Index"
            | "/W"
            | "/First"
            | "/N"
    )
}

/// One document reader: owns the file bytes, the xref directory, the
/// optional decryption state and a per-document font cache. Instances are
/// independent; per-page parallelism runs one reader per worker.
pub struct Reader {
    data: Vec<u8>,
    xref: XrefTable,
    encryption: Option<EncryptionHandler>,
    encrypt_ref: Option<(u32, u16)>,
    pages: Vec<HashMap<String, Object>>,
    font_cache: Mutex<HashMap<u32, Arc<Font>>>,
}

impl Reader {
    pub fn open(path: &str) -> Result<Self, ReadError> {
        Self::from_bytes(fs::read(path)?)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, ReadError> {
        let xref = parse_xref(&data)?;
        let mut reader = Reader {
            data,
            xref,
            encryption: None,
            encrypt_ref: None,
            pages: Vec::new(),
            font_cache: Mutex::new(HashMap::new()),
        };

        if let Some(encrypt_obj) = reader.xref.trailer.get("/Encrypt").cloned() {
            reader.encrypt_ref = match &encrypt_obj {
                Object::Reference { obj_num, gen_num } => Some((*obj_num, *gen_num)),
                _ => None,
            };
            let encrypt_dict = reader.resolve(&encrypt_obj);
            let dict = encrypt_dict.as_dict().ok_or(ReadError::TypeMismatch {
                expected: "/Encrypt dictionary",
                found: "non-dictionary".to_string(),
            })?;
            let file_id = reader.file_id();
            let handler = EncryptionHandler::from_dict(dict, &file_id)
                .map_err(|err| ReadError::Crypto(err.to_string()))?;
            reader.encryption = Some(handler);
        }

        reader.pages = reader.collect_pages();
        Ok(reader)
    }

    /// First element of the trailer `/ID` array, or empty when absent.
    fn file_id(&self) -> Vec<u8> {
        self.xref
            .trailer
            .get("/ID")
            .map(|id| self.resolve(id))
            .as_ref()
            .and_then(|id| id.as_array())
            .and_then(|arr| arr.first())
            .and_then(|first| first.as_string_bytes())
            .map(|bytes| bytes.to_vec())
            .unwrap_or_default()
    }

    pub fn is_encrypted(&self) -> bool {
        self.xref.trailer.contains_key("/Encrypt")
    }

    pub fn trailer(&self) -> &HashMap<String, Object> {
        &self.xref.trailer
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn get_page(&self, index: usize) -> Option<&HashMap<String, Object>> {
        self.pages.get(index)
    }

    pub fn info(&self) -> Option<HashMap<String, Object>> {
        let info = self.xref.trailer.get("/Info")?;
        match self.resolve(info) {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Resolves an indirect reference to its object; anything unresolvable
    /// degrades to `Null` so one bad reference cannot poison a page.
    pub fn resolve(&self, obj: &Object) -> Object {
        match obj {
            Object::Reference { obj_num, gen_num } => {
                match self.get_object(*obj_num, *gen_num) {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        warn!("failed to resolve object {} {}: {}", obj_num, gen_num, err);
                        Object::Null
                    }
                }
            }
            other => other.clone(),
        }
    }

    pub fn get_object(&self, obj_num: u32, gen_num: u16) -> Result<Object, ReadError> {
        let entry = self
            .xref
            .entries
            .get(&obj_num)
            .copied()
            .ok_or(ReadError::MissingObject { obj_num })?;

        match entry {
            XrefEntry::Free { .. } => Ok(Object::Null),
            XrefEntry::Compressed { container, index } => {
                self.get_compressed_object(container, index)
            }
            XrefEntry::InUse { offset, .. } => {
                self.read_object_at(offset as usize, obj_num, gen_num)
            }
        }
    }

    fn read_object_at(
        &self,
        offset: usize,
        obj_num: u32,
        gen_num: u16,
    ) -> Result<Object, ReadError> {
        let mut parser = ObjectParser::at_offset(&self.data, offset);
        // Consume the `num gen obj` header.
        for _ in 0..3 {
            parser.read_object()?;
        }

        let obj = parser
            .read_object()?
            .ok_or(ReadError::Parse(ParseError::UnexpectedEnd { pos: offset }))?;

        if let Object::Dictionary(dict) = obj {
            if parser.peek_is_keyword("stream") {
                let _ = parser.next_token();
                return self.read_stream(dict, &mut parser, obj_num, gen_num);
            }
            return Ok(self.maybe_decrypt(Object::Dictionary(dict), obj_num, gen_num));
        }
        Ok(self.maybe_decrypt(obj, obj_num, gen_num))
    }

    /// Reads a stream body: exactly `/Length` bytes from the same slice the
    /// tokens came from, decrypted before any filter runs.
    fn read_stream(
        &self,
        dict: HashMap<String, Object>,
        parser: &mut ObjectParser<'_>,
        obj_num: u32,
        gen_num: u16,
    ) -> Result<Object, ReadError> {
        let length_obj = dict.get("/Length").cloned().unwrap_or(Object::Null);
        let length = match self.resolve(&length_obj).as_i64() {
            Some(v) if v >= 0 => v as usize,
            _ => {
                return Err(ReadError::TypeMismatch {
                    expected: "stream /Length integer",
                    found: format!("{:?}", length_obj),
                });
            }
        };

        let mut data = parser.consume_stream(length);

        if let Some(handler) = &self.encryption {
            match handler.decrypt(&data, obj_num, gen_num) {
                Ok(decrypted) => data = decrypted,
                Err(err) => {
                    // Keep the raw bytes; a later filter or parse may still
                    // salvage something.
                    warn!("stream {} {}: decryption failed: {}", obj_num, gen_num, err);
                }
            }
        }

        let data = self.apply_filters(&dict, data);
        Ok(Object::Stream { dict, data })
    }

    fn apply_filters(&self, dict: &HashMap<String, Object>, data: Vec<u8>) -> Vec<u8> {
        let Some(filter_obj) = dict.get("/Filter") else {
            return data;
        };
        let filter_obj = self.resolve(filter_obj);
        let mut filters: Vec<String> = Vec::new();
        match filter_obj {
            Object::Name(name) => filters.push(name),
            Object::Array(items) => {
                for item in items {
                    if let Object::Name(name) = self.resolve(&item) {
                        filters.push(name);
                    }
                }
            }
            _ => {}
        }

        let mut data = data;
        for filter in filters {
            if filter == "/FlateDecode" {
                data = flate_decode(&data);
            } else {
                warn!("unsupported stream filter {}; passing data through", filter);
            }
        }
        data
    }

    /// Unpacks one entry of a compressed object stream: `/N` pairs of
    /// `obj_num offset` tokens, payload starting `/First` bytes in.
    fn get_compressed_object(&self, container: u32, index: usize) -> Result<Object, ReadError> {
        let container_obj = self.get_object(container, 0)?;
        let Object::Stream { dict, data } = container_obj else {
            return Err(ReadError::TypeMismatch {
                expected: "object stream",
                found: format!("{:?}", container_obj),
            });
        };

        let n = dict
            .get("/N")
            .and_then(|v| v.as_i64())
            .and_then(|v| usize::try_from(v).ok())
            .ok_or(ReadError::TypeMismatch {
                expected: "object stream /N integer",
                found: "missing".to_string(),
            })?;
        let first = dict
            .get("/First")
            .and_then(|v| v.as_i64())
            .and_then(|v| usize::try_from(v).ok())
            .ok_or(ReadError::TypeMismatch {
                expected: "object stream /First integer",
                found: "missing".to_string(),
            })?;

        let mut header = ObjectParser::from_bytes(&data);
        let mut offsets = Vec::with_capacity(n);
        for _ in 0..n {
            // Pairs of obj_num / offset; only the offsets matter here.
            let _ = header.read_object()?;
            let offset = header
                .read_object()?
                .as_ref()
                .and_then(|v| v.as_i64())
                .and_then(|v| usize::try_from(v).ok())
                .ok_or(ReadError::TypeMismatch {
                    expected: "object stream offset",
                    found: "non-integer".to_string(),
                })?;
            offsets.push(offset);
        }

        let offset = *offsets.get(index).ok_or(ReadError::TypeMismatch {
            expected: "object stream index in range",
            found: format!("index {} of {}", index, n),
        })?;

        let mut parser = ObjectParser::at_offset(&data, first + offset);
        // Objects inside a decoded container are never encrypted again.
        parser
            .read_object()?
            .ok_or(ReadError::Parse(ParseError::UnexpectedEnd { pos: first + offset }))
    }

    fn maybe_decrypt(&self, obj: Object, obj_num: u32, gen_num: u16) -> Object {
        if self.encryption.is_none() || self.encrypt_ref == Some((obj_num, gen_num)) {
            return obj;
        }
        self.decrypt_object(obj, obj_num, gen_num)
    }

    /// Builds a decrypted copy of the object tree; metadata-significant keys
    /// and per-string failures keep their original bytes.
    fn decrypt_object(&self, obj: Object, obj_num: u32, gen_num: u16) -> Object {
        let Some(handler) = &self.encryption else {
            return obj;
        };
        match obj {
            Object::String(bytes) => {
                Object::String(match handler.decrypt(&bytes, obj_num, gen_num) {
                    Ok(decrypted) => decrypted,
                    Err(_) => bytes,
                })
            }
            Object::HexString(bytes) => {
                Object::HexString(match handler.decrypt(&bytes, obj_num, gen_num) {
                    Ok(decrypted) => decrypted,
                    Err(_) => bytes,
                })
            }
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|item| self.decrypt_object(item, obj_num, gen_num))
                    .collect(),
            ),
            Object::Dictionary(dict) => Object::Dictionary(
                dict.into_iter()
                    .map(|(key, value)| {
                        if is_metadata_key(&key) {
                            (key, value)
                        } else {
                            let value = self.decrypt_object(value, obj_num, gen_num);
                            (key, value)
                        }
                    })
                    .collect(),
            ),
            // Stream payloads are handled at read time; numbers, names,
            // booleans and null are never encrypted.
            other => other,
        }
    }

    fn collect_pages(&self) -> Vec<HashMap<String, Object>> {
        let mut pages = Vec::new();
        let Some(root) = self.xref.trailer.get("/Root") else {
            return pages;
        };
        let root = self.resolve(root);
        let Some(pages_obj) = root.as_dict().and_then(|d| d.get("/Pages")) else {
            return pages;
        };
        let pages_root = self.resolve(pages_obj);
        self.walk_page_tree(&pages_root, None, None, &mut pages, 0);
        pages
    }

    fn walk_page_tree(
        &self,
        node: &Object,
        inherited_resources: Option<&Object>,
        inherited_media_box: Option<&Object>,
        out: &mut Vec<HashMap<String, Object>>,
        depth: usize,
    ) {
        // Malformed trees can reference themselves.
        if depth > 64 {
            return;
        }
        let Some(dict) = node.as_dict() else {
            return;
        };
        let resources = dict.get("/Resources").or(inherited_resources);
        let media_box = dict.get("/MediaBox").or(inherited_media_box);

        if dict.get("/Type").and_then(|v| v.as_name()) == Some("/Page") {
            let mut page = dict.clone();
            if let Some(resources) = resources {
                page.entry("/Resources".to_string())
                    .or_insert_with(|| resources.clone());
            }
            if let Some(media_box) = media_box {
                page.entry("/MediaBox".to_string())
                    .or_insert_with(|| media_box.clone());
            }
            out.push(page);
            return;
        }

        let Some(kids) = dict.get("/Kids").map(|k| self.resolve(k)) else {
            return;
        };
        let Some(kids) = kids.as_array() else {
            return;
        };
        for kid in kids {
            let kid = self.resolve(kid);
            self.walk_page_tree(&kid, resources, media_box, out, depth + 1);
        }
    }

    pub(crate) fn cached_font(&self, obj_num: u32) -> Option<Arc<Font>> {
        self.font_cache.lock().ok()?.get(&obj_num).cloned()
    }

    pub(crate) fn cache_font(&self, obj_num: u32, font: Arc<Font>) {
        if let Ok(mut cache) = self.font_cache.lock() {
            cache.insert(obj_num, font);
        }
    }
}

fn flate_decode(data: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => out,
        Err(err) => {
            warn!("FlateDecode failed: {}; keeping raw bytes", err);
            data.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assembles `N 0 obj <body> endobj` sections with a classical xref
    /// table whose offsets are computed, not hand-counted.
    fn build_pdf(objects: &[(u32, Vec<u8>)], trailer_extra: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n".to_vec();
        let mut offsets: Vec<(u32, usize)> = Vec::new();
        let max_num = objects.iter().map(|(num, _)| *num).max().unwrap_or(0);
        for (num, body) in objects {
            offsets.push((*num, out.len()));
            out.extend_from_slice(format!("{} 0 obj\n", num).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", max_num + 1).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for num in 1..=max_num {
            match offsets.iter().find(|(n, _)| *n == num) {
                Some((_, offset)) => {
                    out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
                }
                None => out.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                max_num + 1,
                trailer_extra,
                xref_at
            )
            .as_bytes(),
        );
        out
    }

    fn catalog() -> (u32, Vec<u8>) {
        (1, b"<< /Type /Catalog >>".to_vec())
    }

    #[test]
    fn free_entry_resolves_to_null() {
        let pdf = build_pdf(&[catalog(), (3, b"(live)".to_vec())], "");
        let reader = Reader::from_bytes(pdf).expect("reader");
        assert_eq!(reader.get_object(2, 0).expect("free"), Object::Null);
        assert_eq!(
            reader.get_object(3, 0).expect("live"),
            Object::String(b"live".to_vec())
        );
    }

    #[test]
    fn stream_reads_exactly_length_bytes() {
        let pdf = build_pdf(
            &[
                catalog(),
                (2, b"<< /Length 5 >>\nstream\nABCDEFGH\nendstream".to_vec()),
            ],
            "",
        );
        let reader = Reader::from_bytes(pdf).expect("reader");
        let Object::Stream { data, .. } = reader.get_object(2, 0).expect("stream") else {
            panic!("expected stream");
        };
        assert_eq!(data, b"ABCDE");
    }

    #[test]
    fn stream_length_can_be_an_indirect_reference() {
        let pdf = build_pdf(
            &[
                catalog(),
                (2, b"<< /Length 3 0 R >>\nstream\nABCDE\nendstream".to_vec()),
                (3, b"5".to_vec()),
            ],
            "",
        );
        let reader = Reader::from_bytes(pdf).expect("reader");
        let Object::Stream { data, .. } = reader.get_object(2, 0).expect("stream") else {
            panic!("expected stream");
        };
        assert_eq!(data, b"ABCDE");
    }

    #[test]
    fn flate_filter_is_applied() {
        use flate2::Compression;
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"deflated payload").expect("write");
        let compressed = encoder.finish().expect("finish");

        let mut body = format!("<< /Length {} /Filter /FlateDecode >>\nstream\n", compressed.len())
            .into_bytes();
        body.extend_from_slice(&compressed);
        body.extend_from_slice(b"\nendstream");

        let pdf = build_pdf(&[catalog(), (2, body)], "");
        let reader = Reader::from_bytes(pdf).expect("reader");
        let Object::Stream { data, .. } = reader.get_object(2, 0).expect("stream") else {
            panic!("expected stream");
        };
        assert_eq!(data, b"deflated payload");
    }

    #[test]
    fn failed_inflate_degrades_to_raw_bytes() {
        let pdf = build_pdf(
            &[
                catalog(),
                (
                    2,
                    b"<< /Length 9 /Filter /FlateDecode >>\nstream\nnot-zlib!\nendstream".to_vec(),
                ),
            ],
            "",
        );
        let reader = Reader::from_bytes(pdf).expect("reader");
        let Object::Stream { data, .. } = reader.get_object(2, 0).expect("stream") else {
            panic!("expected stream");
        };
        assert_eq!(data, b"not-zlib!");
    }

    #[test]
    fn compressed_objects_unpack_from_object_streams() {
        // Two objects packed in a container; xref entries must use the
        // compressed form, so the table is written by hand here.
        let payload = b"<< /Kind /Packed >>\n(second)";
        let first_offset = 0usize;
        let second_offset = payload.iter().position(|&b| b == b'(').expect("paren");
        let header = format!("4 {} 5 {}\n", first_offset, second_offset);
        let first = header.len();
        let mut container_body =
            format!("<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n", first, first + payload.len())
                .into_bytes();
        container_body.extend_from_slice(header.as_bytes());
        container_body.extend_from_slice(payload);
        container_body.extend_from_slice(b"\nendstream");

        let mut pdf = b"%PDF-1.7\n".to_vec();
        let catalog_at = pdf.len();
        pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
        let container_at = pdf.len();
        pdf.extend_from_slice(b"3 0 obj\n");
        pdf.extend_from_slice(&container_body);
        pdf.extend_from_slice(b"\nendobj\n");
        let xref_at = pdf.len();
        pdf.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
        pdf.extend_from_slice(format!("{:010} 00000 n \n", catalog_at).as_bytes());
        pdf.extend_from_slice(
            format!("trailer\n<< /Size 6 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n", xref_at)
                .as_bytes(),
        );

        let mut reader = Reader::from_bytes(pdf).expect("reader");
        reader
            .xref
            .entries
            .insert(3, XrefEntry::InUse { offset: container_at as u64, gen_num: 0 });
        reader.xref.entries.insert(
            4,
            XrefEntry::Compressed { container: 3, index: 0 },
        );
        reader.xref.entries.insert(
            5,
            XrefEntry::Compressed { container: 3, index: 1 },
        );

        let packed = reader.get_object(4, 0).expect("packed");
        assert_eq!(
            packed.as_dict().and_then(|d| d.get("/Kind")),
            Some(&Object::Name("/Packed".to_string()))
        );
        assert_eq!(
            reader.get_object(5, 0).expect("second"),
            Object::String(b"second".to_vec())
        );
    }

    #[test]
    fn page_tree_inherits_resources_and_media_box() {
        let pdf = build_pdf(
            &[
                (1, b"<< /Type /Catalog /Pages 2 0 R >>".to_vec()),
                (
                    2,
                    b"<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /Resources << /Font << >> >> /MediaBox [0 0 612 792] >>"
                        .to_vec(),
                ),
                (3, b"<< /Type /Page /Parent 2 0 R >>".to_vec()),
                (
                    4,
                    b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 200] >>".to_vec(),
                ),
            ],
            "",
        );
        let reader = Reader::from_bytes(pdf).expect("reader");
        assert_eq!(reader.num_pages(), 2);

        let first = reader.get_page(0).expect("page 0");
        assert!(first.contains_key("/Resources"));
        let inherited_box = first.get("/MediaBox").expect("inherited box");
        assert_eq!(
            inherited_box.as_array().and_then(|a| a.get(2)).and_then(|v| v.as_f64()),
            Some(612.0)
        );

        let second = reader.get_page(1).expect("page 1");
        let own_box = second.get("/MediaBox").expect("own box");
        assert_eq!(
            own_box.as_array().and_then(|a| a.get(2)).and_then(|v| v.as_f64()),
            Some(100.0)
        );
    }
}
