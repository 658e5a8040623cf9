//! Chunking and query helpers for the chapter chunk index.

use std::sync::LazyLock;

use regex::Regex;

/// Target size of one retrieval chunk, in characters.
pub const CHUNK_TARGET_CHARS: usize = 1200;

static TERM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

/// Split text into chunks of at most `max_chars` characters at whitespace.
///
/// A single word longer than `max_chars` becomes its own chunk.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for word in text.split_whitespace() {
        let word_chars = word.chars().count();
        if current_chars > 0 && current_chars + 1 + word_chars > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if current_chars > 0 {
            current.push(' ');
            current_chars += 1;
        }
        current.push_str(word);
        current_chars += word_chars;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Build an FTS5 MATCH expression from free text.
///
/// Each word becomes a quoted term and terms are OR-ed together. Returns
/// `None` when the query has no searchable words.
pub fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = TERM_RE
        .find_iter(query)
        .map(|m| format!("\"{}\"", m.as_str()))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
