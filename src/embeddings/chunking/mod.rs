#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::extract::Page;

/// A bounded span of page text, the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequence-assigned identifier, never reused by the same sequence
    pub chunk_id: String,
    /// 1-based number of the page this chunk was cut from
    pub page_no: String,
    /// The chunk text
    pub text: String,
}

/// Configuration for page chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Minimum number of characters shared by consecutive chunks of a page
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Monotonic source of chunk identifiers.
///
/// One sequence is owned by a pipeline context and shared by every document it
/// processes, so identifiers stay unique across documents.
#[derive(Debug)]
pub struct ChunkIdSequence {
    next: AtomicU64,
}

impl ChunkIdSequence {
    #[inline]
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    #[inline]
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Take the next identifier
    #[inline]
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The identifier the next call to [`ChunkIdSequence::next_id`] will return
    #[inline]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Make sure no identifier up to and including `id` is handed out again
    #[inline]
    pub fn advance_past(&self, id: u64) {
        self.next.fetch_max(id.saturating_add(1), Ordering::Relaxed);
    }
}

impl Default for ChunkIdSequence {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk pages into embedding-ready pieces, numbering them from `ids`
#[inline]
pub fn chunk_pages(pages: &[Page], config: &ChunkingConfig, ids: &ChunkIdSequence) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in pages {
        if page.text.trim().is_empty() {
            debug!("Skipping page {} without text", page.page_number);
            continue;
        }

        let page_no = page.page_number.to_string();
        for text in split_text(&page.text, config) {
            chunks.push(Chunk {
                chunk_id: ids.next_id().to_string(),
                page_no: page_no.clone(),
                text,
            });
        }
    }

    debug!(
        "Chunked {} pages into {} chunks (avg {} chars)",
        pages.len(),
        chunks.len(),
        chunks
            .iter()
            .map(|c| c.text.chars().count())
            .sum::<usize>()
            / chunks.len().max(1)
    );

    chunks
}

/// Split one page of text into overlapping windows.
///
/// Text shorter than `chunk_size` characters is returned verbatim as a single
/// window. Longer text is cut into windows of at most `chunk_size` characters,
/// each ending at the latest paragraph, line, sentence or word boundary in its
/// second half (a hard cut otherwise). The next window starts `chunk_overlap`
/// characters before the previous end, pulled back to a word start when one is
/// close.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() < config.chunk_size {
        return vec![text.to_string()];
    }

    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap;
    let mut windows = Vec::new();
    let mut start = 0;

    loop {
        if start + size >= chars.len() {
            push_window(&mut windows, &chars[start..]);
            break;
        }

        let limit = start + size;
        let end = find_window_end(&chars, limit, (start + size / 2).max(start + 1));
        push_window(&mut windows, &chars[start..end]);
        start = next_window_start(&chars, start, end, overlap);
    }

    windows
}

fn push_window(windows: &mut Vec<String>, chars: &[char]) {
    let window: String = chars.iter().collect();
    if !window.trim().is_empty() {
        windows.push(window);
    }
}

type BoundaryRule = fn(&[char], usize) -> bool;

/// Boundary rules in order of preference; `i` is the exclusive end of a window
const BOUNDARY_RULES: [BoundaryRule; 4] = [
    is_paragraph_break,
    is_line_break,
    is_sentence_end,
    is_word_break,
];

fn find_window_end(chars: &[char], limit: usize, min_end: usize) -> usize {
    for rule in BOUNDARY_RULES {
        if let Some(end) = (min_end..=limit).rev().find(|&i| rule(chars, i)) {
            return end;
        }
    }
    limit
}

fn next_window_start(chars: &[char], start: usize, end: usize, overlap: usize) -> usize {
    let base = end.saturating_sub(overlap).max(start + 1);
    let floor = base.saturating_sub(overlap).max(start + 1);

    (floor..=base)
        .rev()
        .find(|&i| chars[i - 1].is_whitespace() && !chars[i].is_whitespace())
        .unwrap_or(base)
}

fn is_paragraph_break(chars: &[char], i: usize) -> bool {
    i >= 2 && chars[i - 1] == '\n' && chars[i - 2] == '\n'
}

fn is_line_break(chars: &[char], i: usize) -> bool {
    i >= 1 && chars[i - 1] == '\n'
}

fn is_sentence_end(chars: &[char], i: usize) -> bool {
    i >= 1
        && matches!(chars[i - 1], '.' | '!' | '?')
        && chars.get(i).is_none_or(|c| c.is_whitespace())
}

fn is_word_break(chars: &[char], i: usize) -> bool {
    i >= 1 && chars[i - 1].is_whitespace()
}
