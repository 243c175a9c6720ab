//! Recursive separator-priority text chunker.
//!
//! Splits normalized document text into [`Chunk`]s of at most `max_chars`
//! characters, preferring the coarsest boundary that keeps pieces within
//! budget.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from [`SEPARATORS`] that occurs in the text
//!    (paragraph, line, sentence end, comma, space, then single characters).
//! 2. Split on it. Punctuation stays attached to the end of the preceding
//!    piece; whitespace separators are dropped and re-inserted on merge.
//! 3. Pieces within budget are merged greedily with their neighbours up to
//!    `max_chars`.
//! 4. Pieces over budget are split again with the remaining, finer
//!    separators.
//!
//! Chunks are trimmed, empty chunks are dropped, and there is no overlap.
//! The output is a pure function of the text and the budget.
//!
//! # Example
//!
//! ```rust
//! use docent_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", "notes.txt", 4000);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! assert_eq!(chunks[0].source_name, "notes.txt");
//! ```

use crate::models::Chunk;

/// Default chunk budget in characters.
pub const DEFAULT_MAX_CHARS: usize = 4000;

/// Separators from coarsest to finest. The empty separator splits into
/// single characters.
pub const SEPARATORS: [&str; 8] = ["\n\n", "\n", ".", "!", "?", ",", " ", ""];

/// Split `text` into chunks of at most `max_chars` characters.
///
/// A budget of 0 is treated as 1.
pub fn chunk_text(text: &str, source_name: &str, max_chars: usize) -> Vec<Chunk> {
    let budget = max_chars.max(1);
    split_recursive(text, &SEPARATORS, budget)
        .into_iter()
        .enumerate()
        .map(|(index, content)| Chunk::new(source_name, index, content))
        .collect()
}

fn split_recursive(text: &str, separators: &[&str], budget: usize) -> Vec<String> {
    let Some(level) = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
    else {
        return merge_pieces(&split_on(text, ""), "", budget);
    };

    let separator = separators[level];
    let finer = &separators[level + 1..];
    let joiner = joiner_for(separator);

    let mut out = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();

    for piece in split_on(text, separator) {
        if char_len(piece.trim()) <= budget {
            fitting.push(piece);
            continue;
        }
        out.extend(merge_pieces(&fitting, joiner, budget));
        fitting.clear();
        out.extend(split_recursive(piece, finer, budget));
    }
    out.extend(merge_pieces(&fitting, joiner, budget));
    out
}

fn split_on<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    if is_whitespace_separator(separator) {
        text.split(separator).collect()
    } else {
        text.split_inclusive(separator).collect()
    }
}

fn is_whitespace_separator(separator: &str) -> bool {
    !separator.is_empty() && separator.chars().all(char::is_whitespace)
}

/// Whitespace separators are re-inserted between merged pieces; punctuation
/// is already part of the pieces.
fn joiner_for(separator: &str) -> &str {
    if is_whitespace_separator(separator) {
        separator
    } else {
        ""
    }
}

fn merge_pieces(pieces: &[&str], joiner: &str, budget: usize) -> Vec<String> {
    let joiner_len = char_len(joiner);
    let mut merged = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for &piece in pieces {
        if piece.is_empty() {
            continue;
        }
        let piece_len = char_len(piece);
        if !current.is_empty() {
            if current_len + joiner_len + piece_len <= budget {
                current.push_str(joiner);
                current.push_str(piece);
                current_len += joiner_len + piece_len;
                continue;
            }
            flush(&mut merged, &mut current);
        }
        let start = piece.trim_start();
        if start.is_empty() {
            continue;
        }
        current.push_str(start);
        current_len = char_len(start);
    }
    flush(&mut merged, &mut current);
    merged
}

fn flush(merged: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim_end();
    if !trimmed.is_empty() {
        merged.push(trimmed.to_string());
    }
    current.clear();
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
