#![allow(dead_code)]

use sickle::reader::Reader;

/// Assembles a classical-xref PDF from `(obj_num, body)` pairs, computing
/// every offset. Object 1 is assumed to be the catalog referenced from the
/// trailer's /Root.
pub fn build_pdf(objects: &[(u32, Vec<u8>)], trailer_extra: &str) -> Vec<u8> {
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

/// Serializes a stream object body with a correct /Length.
pub fn stream_body(dict_extra: &str, data: &[u8]) -> Vec<u8> {
    let mut out = format!("<< /Length {} {} >>\nstream\n", data.len(), dict_extra).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
    out
}

/// One-page document: catalog (1), page tree (2), page (3), contents (4),
/// font /F1 (5), plus any extra objects (e.g. a ToUnicode stream).
pub fn single_page_pdf(
    content: &[u8],
    font_body: &str,
    extra_objects: &[(u32, Vec<u8>)],
) -> Vec<u8> {
    let mut objects = vec![
        (1u32, b"<< /Type /Catalog /Pages 2 0 R >>".to_vec()),
        (2, b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec()),
        (
            3,
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
                .to_vec(),
        ),
        (4, stream_body("", content)),
        (5, font_body.as_bytes().to_vec()),
    ];
    objects.extend_from_slice(extra_objects);
    build_pdf(&objects, "")
}

pub const PLAIN_FONT: &str = "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>";

pub fn reader_for(bytes: Vec<u8>) -> Reader {
    Reader::from_bytes(bytes).expect("failed to build reader")
}

pub fn extract_first_page(reader: &Reader) -> String {
    let page = reader.get_page(0).expect("document should have a page");
    sickle::extract::Extractor::new(reader, page, false).extract_text()
}
