use std::collections::HashMap;
use std::time::Instant;

use log::{debug, warn};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::extract::Extractor;
use crate::model::{Document, Metadata, Object, Page};
use crate::reader::{ReadError, Reader};

/// Loads a document sequentially: one reader, pages in order. Per-page
/// failures are isolated; the page is skipped and extraction continues.
pub fn load_document(path: &str, extract_images: bool) -> Result<Document, ReadError> {
    let reader = Reader::open(path)?;
    let metadata = document_metadata(&reader);

    let num_pages = reader.num_pages();
    debug!("processing {} pages", num_pages);

    let mut pages = Vec::with_capacity(num_pages);
    for index in 0..num_pages {
        match extract_page(&reader, index, extract_images) {
            Some(page) => pages.push(page),
            None => warn!("skipping page {}", index + 1),
        }
    }

    Ok(Document { metadata, pages })
}

/// Concurrent variant: a rayon pool where every worker owns an independent
/// reader over its own copy of the file, pulling page indices until the
/// queue drains. `workers == 0` means one per available core.
pub fn load_document_concurrent(
    path: &str,
    workers: usize,
    extract_images: bool,
) -> Result<Document, ReadError> {
    let reader = Reader::open(path)?;
    let metadata = document_metadata(&reader);
    let num_pages = reader.num_pages();
    drop(reader);

    let thread_count = if workers == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        workers
    };
    let thread_count = thread_count.min(num_pages.max(1));
    debug!(
        "processing {} pages across {} workers",
        num_pages, thread_count
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .map_err(|err| ReadError::Io(std::io::Error::other(err.to_string())))?;

    let mut results: Vec<(usize, Option<Page>)> = pool.install(|| {
        (0..num_pages)
            .into_par_iter()
            .map_init(
                || Reader::open(path).ok(),
                |reader, index| {
                    let page = reader
                        .as_ref()
                        .and_then(|reader| extract_page(reader, index, extract_images));
                    (index, page)
                },
            )
            .collect()
    });

    results.sort_by_key(|(index, _)| *index);
    let pages = results
        .into_iter()
        .filter_map(|(index, page)| {
            if page.is_none() {
                warn!("skipping page {}", index + 1);
            }
            page
        })
        .collect();

    Ok(Document { metadata, pages })
}

fn extract_page(reader: &Reader, index: usize, extract_images: bool) -> Option<Page> {
    let started = Instant::now();
    let page_dict = reader.get_page(index)?;

    let mut extractor = Extractor::new(reader, page_dict, extract_images);
    let content = extractor.extract_text();
    let images = extractor.into_images();

    let (width, height) = page_size(reader, page_dict);
    let char_count = content.chars().count();
    debug!(
        "page {} processed in {:?} ({} chars)",
        index + 1,
        started.elapsed(),
        char_count
    );

    Some(Page {
        page_number: index + 1,
        content,
        char_count,
        width,
        height,
        images,
    })
}

/// Page extent from the /MediaBox upper-right corner.
fn page_size(reader: &Reader, page_dict: &HashMap<String, Object>) -> (f64, f64) {
    let media_box = page_dict.get("/MediaBox").map(|b| reader.resolve(b));
    let Some(arr) = media_box.as_ref().and_then(|b| b.as_array()) else {
        return (0.0, 0.0);
    };
    if arr.len() < 4 {
        return (0.0, 0.0);
    }
    (
        arr[2].as_f64().unwrap_or(0.0),
        arr[3].as_f64().unwrap_or(0.0),
    )
}

/// Document-level metadata. Encrypted documents skip the /Info fields, but
/// still report the encrypted flag.
fn document_metadata(reader: &Reader) -> Metadata {
    let mut metadata = Metadata {
        encrypted: reader.is_encrypted(),
        ..Metadata::default()
    };
    if metadata.encrypted {
        debug!("document is encrypted; attempting empty-password decryption");
        return metadata;
    }
    if let Some(info) = reader.info() {
        metadata.title = info_string(&info, "/Title");
        metadata.author = info_string(&info, "/Author");
        metadata.creator = info_string(&info, "/Creator");
        metadata.producer = info_string(&info, "/Producer");
    }
    metadata
}

fn info_string(info: &HashMap<String, Object>, key: &str) -> Option<String> {
    info.get(key)
        .and_then(|v| v.as_string_bytes())
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}
