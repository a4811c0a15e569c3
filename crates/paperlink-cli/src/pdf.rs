use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lopdf::{Dictionary, Document};
use tracing::debug;

use paperlink_engine::EmbeddedInfo;

/// Page texts from the front of a PDF plus its Info dictionary entries.
#[derive(Debug, Default)]
pub struct PdfText {
    pub pages: Vec<String>,
    pub info: EmbeddedInfo,
}

/// Read up to `max_pages` pages. Pages that fail to decode come back empty.
pub fn read_pdf(path: &Path, max_pages: usize) -> Result<PdfText> {
    let document =
        Document::load(path).with_context(|| format!("lopdf failed to open {}", path.display()))?;

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().take(max_pages).collect();
    let pages = page_numbers
        .iter()
        .map(|&number| match document.extract_text(&[number]) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %path.display(), page = number, error = %err, "page text unavailable");
                String::new()
            }
        })
        .collect();

    Ok(PdfText {
        pages,
        info: read_info(&document),
    })
}

/// `read_pdf` on the blocking pool; lopdf parsing is CPU-bound.
pub async fn read_pdf_blocking(path: PathBuf, max_pages: usize) -> Result<PdfText> {
    tokio::task::spawn_blocking(move || read_pdf(&path, max_pages))
        .await
        .context("PDF reader task panicked")?
}

fn read_info(document: &Document) -> EmbeddedInfo {
    let info = document
        .trailer
        .get(b"Info")
        .and_then(|obj| obj.as_reference())
        .and_then(|id| document.get_object(id))
        .and_then(|obj| obj.as_dict());
    match info {
        Ok(dict) => EmbeddedInfo {
            title: text_entry(dict, b"Title"),
            author: text_entry(dict, b"Author"),
        },
        Err(_) => EmbeddedInfo::default(),
    }
}

fn text_entry(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = dict.get(key).and_then(|obj| obj.as_str()).ok()?;
    let text = decode_pdf_string(bytes);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// PDF text strings are UTF-16BE behind a byte-order mark, otherwise
/// treated as UTF-8 with lossy replacement.
fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes.strip_prefix(&[0xFE, 0xFF]) {
        Some(utf16) => {
            let units = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}
