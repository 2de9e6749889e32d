//! Fixed-size character windows and corpus assembly.
//!
//! Windows are measured in characters, not bytes, so multi-byte text never splits inside a code
//! point. Consecutive windows share exactly `overlap` characters; only the final window may be
//! shorter than `chunk_size`.

use std::ops::Range;

use super::types::{Chunk, ChunkingError, Page};

/// Validate a window configuration.
pub fn validate_window(chunk_size: usize, overlap: usize) -> Result<(), ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::OverlapTooLarge {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

/// Character ranges of each window over `text`.
///
/// Returns an empty vector for empty input.
pub fn chunk_spans(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Range<usize>>, ChunkingError> {
    validate_window(chunk_size, overlap)?;
    let total = text.chars().count();
    let mut spans = Vec::with_capacity(total / (chunk_size - overlap) + 1);
    let mut start = 0usize;

    while start < total {
        let end = (start + chunk_size).min(total);
        spans.push(start..end);
        if end == total {
            break;
        }
        start = end.saturating_sub(overlap);
    }

    Ok(spans)
}

/// Split `text` into overlapping windows of `chunk_size` characters.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    let spans = chunk_spans(text, chunk_size, overlap)?;
    if spans.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every character boundary, including the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();

    Ok(spans
        .into_iter()
        .map(|span| text[boundaries[span.start]..boundaries[span.end]].to_string())
        .collect())
}

/// Turn pages into the ordered chunk sequence backing a corpus.
///
/// Output order is page order then window order; that order becomes the positional index shared
/// with the vector index. Whitespace-only windows are dropped, but window numbering in
/// `chunk_id` still follows the window's position on its page.
pub fn build_corpus(
    pages: &[Page],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkingError> {
    validate_window(chunk_size, overlap)?;
    let mut corpus = Vec::new();

    for page in pages {
        for (window, text) in chunk_text(&page.text, chunk_size, overlap)?
            .into_iter()
            .enumerate()
        {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            corpus.push(Chunk {
                page_number: page.page_number,
                chunk_id: format!("p{}_c{}", page.page_number, window),
                text: trimmed.to_string(),
            });
        }
    }

    tracing::debug!(
        pages = pages.len(),
        chunks = corpus.len(),
        chunk_size,
        overlap,
        "Built corpus"
    );
    Ok(corpus)
}
