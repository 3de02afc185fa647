
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embeddings::tokenizer::Tokenizer;

/// Represents a chunk of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Trimmed, non-empty chunk text
    pub content: String,
    /// Position of this chunk within the document
    pub chunk_index: usize,
    /// Token count of `content`
    pub token_count: usize,
}

/// Configuration for document chunking, in tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Sections above this size are split
    pub target_size: usize,
    /// Tokens carried from the end of one split chunk into the next
    pub overlap: usize,
    /// Sections below this size are merged into the following section
    pub min_size: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_size: 900,
            overlap: 175,
            min_size: 100,
        }
    }
}

/// Split one document into ordered, size-bounded chunks.
///
/// Sections are cut at heading lines, undersized sections are folded into the
/// section that follows them, and oversized sections are split on paragraph and
/// then sentence boundaries with a trailing-token overlap between the pieces.
#[inline]
pub fn chunk_document(
    text: &str,
    config: &ChunkingConfig,
    tokenizer: &dyn Tokenizer,
) -> Vec<TextChunk> {
    let sections = merge_small_sections(split_by_headers(text), config, tokenizer);

    let mut chunks: Vec<TextChunk> = Vec::new();
    for section in &sections {
        for piece in split_large_section(section, config, tokenizer) {
            let content = piece.trim();
            if content.is_empty() {
                continue;
            }

            chunks.push(TextChunk {
                content: content.to_string(),
                chunk_index: chunks.len(),
                token_count: tokenizer.count(content),
            });
        }
    }

    debug!(
        "Chunked {} sections into {} chunks (avg {} tokens)",
        sections.len(),
        chunks.len(),
        chunks.iter().map(|c| c.token_count).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Split text into sections, each starting at a line beginning with `#`.
///
/// Text before the first heading forms its own leading section.
fn split_by_headers(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.starts_with('#') && !current.is_empty() {
            sections.push(current.join("\n"));
            current.clear();
        }
        current.push(line);
    }

    if !current.is_empty() {
        sections.push(current.join("\n"));
    }

    sections
}

/// Fold sections below `min_size` into the next section.
///
/// Only applies when there is more than one section, and never to the last one.
fn merge_small_sections(
    sections: Vec<String>,
    config: &ChunkingConfig,
    tokenizer: &dyn Tokenizer,
) -> Vec<String> {
    let total = sections.len();
    let mut merged = Vec::with_capacity(total);
    let mut carry: Option<String> = None;

    for (i, section) in sections.into_iter().enumerate() {
        let section = match carry.take() {
            Some(previous) => format!("{}\n\n{}", previous, section),
            None => section,
        };

        if total > 1 && i + 1 < total && tokenizer.count(&section) < config.min_size {
            carry = Some(section);
        } else {
            merged.push(section);
        }
    }

    merged
}

/// Split a section above `target_size` by paragraphs, then sentences, with overlap
fn split_large_section(
    section: &str,
    config: &ChunkingConfig,
    tokenizer: &dyn Tokenizer,
) -> Vec<String> {
    if tokenizer.count(section) <= config.target_size {
        return vec![section.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();

    for paragraph in section.split("\n\n") {
        let candidate = if current.is_empty() {
            paragraph.to_string()
        } else {
            format!("{}\n\n{}", current, paragraph)
        };

        if tokenizer.count(&candidate) <= config.target_size {
            current = candidate;
            continue;
        }

        if current.is_empty() {
            // Single paragraph above the target on its own
            current = paragraph.to_string();
        } else {
            let overlap = tokenizer.trailing_window(&current, config.overlap);
            pieces.push(std::mem::take(&mut current));
            current = format!("{}\n\n{}", overlap, paragraph);
        }

        current = bisect_by_sentences(current, config.target_size, tokenizer, &mut pieces);
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

/// Halve `buffer` on `". "` boundaries until it fits in `max_tokens`.
///
/// Leading halves are pushed to `pieces`; the remaining tail is returned. A buffer
/// that is a single sentence is returned as-is even when it is over the limit.
fn bisect_by_sentences(
    mut buffer: String,
    max_tokens: usize,
    tokenizer: &dyn Tokenizer,
    pieces: &mut Vec<String>,
) -> String {
    while tokenizer.count(&buffer) > max_tokens {
        let Some((head, tail)) = halve_sentences(&buffer) else {
            break;
        };

        // The leading half of a very long buffer can still be oversized
        let rest = bisect_by_sentences(head, max_tokens, tokenizer, pieces);
        pieces.push(rest);
        buffer = tail;
    }

    buffer
}

fn halve_sentences(text: &str) -> Option<(String, String)> {
    let sentences: Vec<&str> = text.split(". ").collect();
    if sentences.len() <= 1 {
        return None;
    }

    let split_point = sentences.len() / 2;
    let head = format!("{}.", sentences[..split_point].join(". "));
    let tail = sentences[split_point..].join(". ");
    Some((head, tail))
}
