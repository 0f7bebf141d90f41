use std::path::Path;

use fins_core::SourceFormat;
use thiserror::Error;

const PDF_MAGIC: &[u8] = b"%PDF-";
const SNIFF_BYTES: usize = 4096;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SniffError {
    #[error("File is empty")]
    Empty,
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
}

/// Decides the statement format from content first; the extension only breaks
/// ties between delimited text and free text.
pub fn sniff_format(data: &[u8], filename: &str) -> Result<SourceFormat, SniffError> {
    if data.is_empty() {
        return Err(SniffError::Empty);
    }
    if data.starts_with(PDF_MAGIC) {
        return Ok(SourceFormat::Pdf);
    }

    let head = &data[..data.len().min(SNIFF_BYTES)];
    if !looks_like_text(head) {
        return Err(SniffError::Unsupported(describe(filename)));
    }

    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(SourceFormat::from_extension);

    match ext {
        Some(SourceFormat::Csv) => Ok(SourceFormat::Csv),
        Some(SourceFormat::Pdf) => Err(SniffError::Unsupported("pdf extension without PDF content".into())),
        _ if first_line_is_delimited(head) => Ok(SourceFormat::Csv),
        _ => Ok(SourceFormat::Text),
    }
}

fn looks_like_text(head: &[u8]) -> bool {
    // A multi-byte char split at the sniff boundary is still text.
    let valid = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    valid && !head.contains(&0)
}

fn first_line_is_delimited(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}');
    let Some(line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return false;
    };
    line.matches(',').count() >= 2 || line.matches(';').count() >= 2 || line.contains('\t')
}

fn describe(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "binary".to_string())
}
