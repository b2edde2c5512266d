//! Turning an uploaded resume into plain text.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported resume format `{0}`")]
    UnsupportedFormat(String),
    #[error("could not read {file_name}: {reason}")]
    Unreadable { file_name: String, reason: String },
    #[error("no text found in {0}")]
    Empty(String),
}

pub trait TextExtractor: Send + Sync {
    /// Plain text of the document, whitespace collapsed to single spaces.
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Handles `.pdf`, `.docx` and `.txt` uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
        let lower = file_name.to_ascii_lowercase();
        let raw = if lower.ends_with(".txt") {
            std::str::from_utf8(bytes)
                .map_err(|err| ExtractionError::Unreadable {
                    file_name: file_name.to_string(),
                    reason: err.to_string(),
                })?
                .to_string()
        } else if lower.ends_with(".pdf") {
            let unreadable = |reason: String| ExtractionError::Unreadable {
                file_name: file_name.to_string(),
                reason,
            };
            // The PDF parser panics on some malformed inputs.
            std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
                .map_err(|_| unreadable("pdf parser aborted".to_string()))?
                .map_err(|err| unreadable(err.to_string()))?
        } else if lower.ends_with(".docx") {
            docx_text(bytes).map_err(|reason| ExtractionError::Unreadable {
                file_name: file_name.to_string(),
                reason,
            })?
        } else {
            let extension = lower.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
            return Err(ExtractionError::UnsupportedFormat(extension.to_string()));
        };

        let text = collapse_whitespace(&raw);
        if text.is_empty() {
            return Err(ExtractionError::Empty(file_name.to_string()));
        }
        Ok(text)
    }
}

/// Text runs of `word/document.xml`, one line per paragraph.
fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|err| err.to_string())?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| err.to_string())?
        .read_to_string(&mut xml)
        .map_err(|err| err.to_string())?;

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_run_text = false;
    loop {
        match reader.read_event().map_err(|err| err.to_string())? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) if matches!(e.name().as_ref(), b"w:tab" | b"w:br") => text.push(' '),
            Event::Text(t) if in_run_text => {
                text.push_str(&t.unescape().map_err(|err| err.to_string())?);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
