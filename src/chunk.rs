//! Boundary-preferring text splitter.
//!
//! Splits document content into chunks of at most `max_chars` characters,
//! with each chunk after the first starting `overlap_chars` before the
//! previous chunk's end. Cut points prefer paragraph boundaries (`\n\n`),
//! then sentence ends, then whitespace, falling back to a hard character
//! cut snapped to a UTF-8 boundary.
//!
//! Each chunk receives a fresh UUID, the parent document's metadata
//! unchanged, and a SHA-256 hash of its text for staleness checks.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, Document};

/// Split every document into chunks. `max_chars` must exceed
/// `overlap_chars`; config validation enforces this before we get here.
pub fn split_documents(docs: &[Document], max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for doc in docs {
        for (i, (start, end)) in split_spans(&doc.content, max_chars, overlap_chars)
            .into_iter()
            .enumerate()
        {
            chunks.push(make_chunk(&doc.content[start..end], i as i64, doc));
        }
    }
    chunks
}

/// Compute byte spans over `text`, each at most `max_chars` characters,
/// consecutive spans overlapping by up to `overlap_chars` characters.
/// Spans cover the text contiguously: span N+1 begins at (span N end −
/// overlap), so concatenating spans minus the overlap reconstructs the
/// input exactly.
fn split_spans(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<(usize, usize)> {
    // Byte offset of every char boundary, with the text length appended so
    // bounds[char_count] is the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = bounds.len() - 1;

    if total_chars <= max_chars {
        return vec![(0, text.len())];
    }

    let mut spans = Vec::new();
    let mut start = 0usize; // char index
    loop {
        let hard_end = (start + max_chars).min(total_chars);
        let end = if hard_end == total_chars {
            total_chars
        } else {
            best_break(text, &bounds, start, hard_end)
        };
        spans.push((bounds[start], bounds[end]));
        if end == total_chars {
            break;
        }
        // The window must always advance even when the overlap would swallow
        // the whole previous chunk.
        start = end.saturating_sub(overlap_chars).max(start + 1);
    }
    spans
}

/// Pick the best cut point at or before `hard_end` (both char indices).
/// Preference order: paragraph break, sentence end, newline, space, hard cut.
/// The cut lands just after the separator so no text is lost.
fn best_break(text: &str, bounds: &[usize], start: usize, hard_end: usize) -> usize {
    let window = &text[bounds[start]..bounds[hard_end]];

    let after_paragraph = window.rfind("\n\n").map(|p| p + 2);
    let after_sentence = [". ", "! ", "? "]
        .iter()
        .filter_map(|sep| window.rfind(sep).map(|p| p + 2))
        .max();
    let after_newline = window.rfind('\n').map(|p| p + 1);
    let after_space = window.rfind(' ').map(|p| p + 1);

    let cut = after_paragraph
        .or(after_sentence)
        .or(after_newline)
        .or(after_space);

    match cut {
        Some(p) if p > 0 && p < window.len() => {
            let abs = bounds[start] + p;
            // Separators are ASCII, so `abs` is always a char boundary.
            match bounds.binary_search(&abs) {
                Ok(idx) => idx,
                Err(_) => hard_end,
            }
        }
        _ => hard_end,
    }
}

fn make_chunk(content: &str, index: i64, parent: &Document) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        content: content.to_string(),
        metadata: parent.metadata.clone(),
        hash,
    }
}
