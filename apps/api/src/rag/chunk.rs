//! Overlapping resume chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters.
//! Each chunk is a contiguous slice of the source text; consecutive chunks
//! share at most `overlap` characters, so the original text can always be
//! rebuilt from the chunks and their `source_offset`s.
//!
//! # Algorithm
//!
//! 1. From the current position, take a window of `chunk_size` characters.
//! 2. If the rest of the text fits in the window, emit it and stop.
//! 3. Otherwise look for a break inside the window, trying [`SEPARATORS`] in
//!    priority order (paragraph, line, sentence). The last occurrence of the
//!    first separator found past the overlap region wins; the separator stays
//!    at the end of the chunk.
//! 4. No separator → hard cut at `chunk_size` characters.
//! 5. The next chunk starts `overlap` characters before the break, snapped
//!    forward past the first whitespace so it does not begin mid-word.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Break candidates, highest priority first.
pub const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", "! ", "? "];

/// A bounded slice of resume text used as a retrieval unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub index: usize,
    pub text: String,
    /// Byte offset of the chunk's first character in the document text.
    pub source_offset: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkConfigError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Chunk size and overlap, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkConfigError> {
        if chunk_size == 0 {
            return Err(ChunkConfigError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkConfigError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

/// Splits `text` into overlapping chunks.
///
/// Chunk ids are `"{document_id}:chunk_{index}"`, so the output is fully
/// determined by the arguments. Empty text yields no chunks.
pub fn split(document_id: &str, text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let rest = &text[start..];
        let window_end = start + byte_len_of_chars(rest, config.chunk_size);

        let end = if window_end >= text.len() {
            text.len()
        } else {
            // A break must leave the chunk longer than the overlap, otherwise
            // the next chunk would not advance.
            let min_end = start + byte_len_of_chars(rest, config.overlap + 1);
            find_break(text, min_end, window_end).unwrap_or(window_end)
        };

        let index = chunks.len();
        chunks.push(Chunk {
            id: format!("{document_id}:chunk_{index}"),
            index,
            text: text[start..end].to_string(),
            source_offset: start,
        });

        if end >= text.len() {
            break;
        }
        start = next_start(text, start, end, config.overlap);
    }

    chunks
}

/// Rebuilds the source text from chunks produced by [`split`].
#[cfg(test)]
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        let chunk_end = chunk.source_offset + chunk.text.len();
        if chunk_end <= covered {
            continue;
        }
        let skip = covered.saturating_sub(chunk.source_offset);
        out.push_str(&chunk.text[skip..]);
        covered = chunk_end;
    }
    out
}

/// Finds the best break in `text[min_end..=window_end]`, returning the byte
/// offset just past the separator.
fn find_break(text: &str, min_end: usize, window_end: usize) -> Option<usize> {
    let window = &text[..window_end];
    SEPARATORS.iter().find_map(|sep| {
        window
            .rfind(sep)
            .map(|pos| pos + sep.len())
            .filter(|&end| end >= min_end)
    })
}

/// Start of the chunk following one that ended at `end`.
fn next_start(text: &str, start: usize, end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return end;
    }
    let candidate = end - byte_len_of_chars_rev(&text[..end], overlap);
    let candidate = match text[candidate..end].find(char::is_whitespace) {
        Some(pos) => {
            let ws_len = text[candidate + pos..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(1);
            candidate + pos + ws_len
        }
        None => candidate,
    };
    // Always advance past the previous start.
    if candidate <= start {
        end
    } else {
        candidate
    }
}

/// Byte length of the first `n` characters of `s` (or all of `s`).
fn byte_len_of_chars(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Byte length of the last `n` characters of `s` (or all of `s`).
fn byte_len_of_chars_rev(s: &str, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    s.char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| s.len() - i)
        .unwrap_or(s.len())
}
