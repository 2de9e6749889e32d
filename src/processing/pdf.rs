//! Page-numbered text extraction backed by `lopdf`.

use std::path::Path;

use lopdf::Document;

use super::types::{IngestError, Page};

/// Read a PDF and return one [`Page`] per page with extractable text.
///
/// Pages are numbered from 1. NUL characters are stripped and text is trimmed; pages that end up
/// empty are skipped, so the result may be empty for scanned documents.
pub fn read_pdf_with_pages(path: &Path) -> Result<Vec<Page>, IngestError> {
    if !path.is_file() {
        return Err(IngestError::NotFound(path.to_path_buf()));
    }

    let document = Document::load(path).map_err(|error| IngestError::Unreadable {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().into_keys() {
        let raw = match document.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(
                    page = page_number,
                    error = %error,
                    "Skipping page without extractable text"
                );
                continue;
            }
        };
        let cleaned = raw.replace('\0', "");
        let text = cleaned.trim();
        if !text.is_empty() {
            pages.push(Page::new(page_number, text));
        }
    }

    tracing::debug!(path = %path.display(), pages = pages.len(), "Extracted PDF text");
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_reported_as_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.pdf");
        let error = read_pdf_with_pages(&missing).expect_err("missing");
        assert!(matches!(error, IngestError::NotFound(path) if path == missing));
    }

    #[test]
    fn garbage_file_is_unreadable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bogus = dir.path().join("bogus.pdf");
        std::fs::write(&bogus, b"definitely not a pdf").expect("write");
        let error = read_pdf_with_pages(&bogus).expect_err("unreadable");
        assert!(matches!(error, IngestError::Unreadable { .. }));
    }
}
