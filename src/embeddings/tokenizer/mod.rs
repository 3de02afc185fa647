
use anyhow::{Context, Result};
use tiktoken_rs::CoreBPE;
use tracing::debug;

/// Token counting and trailing-window slicing used to size chunks
pub trait Tokenizer: Send + Sync {
    /// Number of tokens in `text`
    fn count(&self, text: &str) -> usize;

    /// Suffix of `text` made of its last `n_tokens` tokens.
    ///
    /// Returns `text` unchanged when it has `n_tokens` tokens or fewer. The result
    /// never counts above `n_tokens`.
    fn trailing_window(&self, text: &str, n_tokens: usize) -> String;
}

/// Tokenizer backed by the `cl100k_base` BPE used by OpenAI embedding models
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    #[inline]
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().context("Failed to load cl100k_base encoding")?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for Cl100kTokenizer {
    #[inline]
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    #[inline]
    fn trailing_window(&self, text: &str, n_tokens: usize) -> String {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= n_tokens {
            return text.to_string();
        }

        // A window may start in the middle of a multi-byte character, or re-encode
        // into more tokens than it was cut from. Shrink from the front until neither
        // is true.
        let mut start = tokens.len() - n_tokens;
        while start < tokens.len() {
            if let Ok(window) = self.bpe.decode(tokens[start..].to_vec()) {
                if self.count(&window) <= n_tokens {
                    return window;
                }
            }
            debug!("Shrinking overlap window starting at token {}", start);
            start += 1;
        }

        String::new()
    }
}

/// Whitespace-separated words as tokens.
///
/// Cheap and deterministic; windows are exact suffixes of the input starting at a
/// word boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    #[inline]
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    #[inline]
    fn trailing_window(&self, text: &str, n_tokens: usize) -> String {
        let starts = word_starts(text);
        if starts.len() <= n_tokens {
            return text.to_string();
        }
        if n_tokens == 0 {
            return String::new();
        }

        let offset = starts[starts.len() - n_tokens];
        text.get(offset..).map(str::to_string).unwrap_or_default()
    }
}

/// Byte offsets where each whitespace-separated word begins
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            starts.push(idx);
            in_word = true;
        }
    }
    starts
}
