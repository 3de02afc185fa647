// Metadata extractor
// Derives classification and structure metadata from a document's path and
// content, and assembles embeddable chunks with stable ids

#[cfg(test)]
mod tests;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Component, Path};
use std::sync::LazyLock;
use uuid::Uuid;

use crate::embeddings::chunking::{ChunkingConfig, chunk_document};
use crate::embeddings::tokenizer::Tokenizer;
use crate::{DocsError, Result};

/// Characters of chunk content mixed into the chunk id
const ID_CONTENT_PREFIX_CHARS: usize = 100;

static CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Fenced blocks
        Regex::new(r"```[\s\S]*?```").expect("valid regex"),
        // Inline spans
        Regex::new(r"`[^`\n]+`").expect("valid regex"),
        // Indented lines
        Regex::new(r"(?m)^\s{4,}.*$").expect("valid regex"),
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Reference,
    Tutorial,
    Example,
    Api,
}

impl ContentType {
    /// Classify a relative document path. First match wins.
    #[inline]
    pub fn from_relative_path(relative_path: &str) -> Self {
        let lower = relative_path.to_lowercase();
        if lower.contains("tutorial") {
            Self::Tutorial
        } else if lower.contains("example") {
            Self::Example
        } else if lower.contains("api") || lower.contains("reference") {
            Self::Api
        } else {
            Self::Reference
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Tutorial => "tutorial",
            Self::Example => "example",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for ContentType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata derived from where a document lives in the source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMetadata {
    pub version: String,
    /// Path relative to the source root, `/`-separated
    pub file_path: String,
    /// First directory under the source root, or `"unknown"`
    pub section: String,
    pub content_type: ContentType,
}

/// Metadata stored alongside every chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub version: String,
    pub file_path: String,
    pub section: String,
    pub content_type: ContentType,
    pub title: String,
    /// Every heading of the source document, in order
    pub heading_path: Vec<String>,
    pub has_code: bool,
    pub chunk_index: usize,
    pub doc_url: String,
}

/// A unit of retrievable text with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: Uuid,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Store payload: the metadata fields plus `content`
    #[inline]
    pub fn payload(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        let mut payload = match serde_json::to_value(&self.metadata)? {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(DocsError::Validation(format!(
                    "chunk metadata serialized to {} instead of an object",
                    other
                )));
            }
        };
        payload.insert(
            "content".to_string(),
            serde_json::Value::String(self.content.clone()),
        );
        Ok(payload)
    }
}

/// Derive version, relative path, section and content type for `file_path`.
///
/// Fails when `file_path` is not inside `source_root`.
#[inline]
pub fn extract_path_metadata(
    file_path: &Path,
    source_root: &Path,
    version: &str,
) -> Result<PathMetadata> {
    let relative = file_path.strip_prefix(source_root).map_err(|_| {
        DocsError::Validation(format!(
            "{} is not under source root {}",
            file_path.display(),
            source_root.display()
        ))
    })?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        return Err(DocsError::Validation(format!(
            "{} does not name a file under {}",
            file_path.display(),
            source_root.display()
        )));
    }

    let relative_path = parts.join("/");
    let section = if parts.len() > 1 {
        parts[0].clone()
    } else {
        "unknown".to_string()
    };

    Ok(PathMetadata {
        version: version.to_string(),
        content_type: ContentType::from_relative_path(&relative_path),
        file_path: relative_path,
        section,
    })
}

/// Every heading line's text, in document order
#[inline]
pub fn extract_headings(content: &str) -> Vec<String> {
    content
        .split('\n')
        .map(str::trim)
        .filter(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim())
        .filter(|heading| !heading.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `content` carries a significant amount of code
#[inline]
pub fn detect_code(content: &str) -> bool {
    let total = content.chars().count();
    if total == 0 {
        return false;
    }

    let mut code_chars = 0usize;
    for pattern in CODE_PATTERNS.iter() {
        let lengths: Vec<usize> = pattern
            .find_iter(content)
            .flatten()
            .map(|m| m.as_str().chars().count())
            .collect();
        if !lengths.is_empty() {
            // Matches are joined by single spaces
            code_chars += lengths.iter().sum::<usize>() + lengths.len() - 1;
        }
    }

    code_chars * 5 > total || code_chars > 100
}

/// First heading, else the file stem title-cased with `_` as spaces
#[inline]
pub fn derive_title(headings: &[String], file_path: &Path) -> String {
    if let Some(first) = headings.first() {
        return first.clone();
    }

    let stem = file_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().replace('_', " "))
        .unwrap_or_default();
    title_case(&stem)
}

/// Site URL of a document, `/` + relative path with `.md` swapped for `.html`
#[inline]
pub fn doc_url(relative_path: &str) -> String {
    match relative_path.strip_suffix(".md") {
        Some(base) => format!("/{}.html", base),
        None => format!("/{}", relative_path),
    }
}

/// Deterministic point id for a chunk
#[inline]
pub fn chunk_id(relative_path: &str, chunk_index: usize, content: &str) -> Uuid {
    let prefix: String = content.chars().take(ID_CONTENT_PREFIX_CHARS).collect();
    let digest = Sha256::digest(format!("{}_{}_{}", relative_path, chunk_index, prefix).as_bytes());

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Chunk one document and attach metadata to every chunk
#[inline]
pub fn build_chunks(
    file_path: &Path,
    source_root: &Path,
    version: &str,
    content: &str,
    config: &ChunkingConfig,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<Chunk>> {
    let path_metadata = extract_path_metadata(file_path, source_root, version)?;
    let headings = extract_headings(content);
    let title = derive_title(&headings, file_path);
    let url = doc_url(&path_metadata.file_path);

    let chunks = chunk_document(content, config, tokenizer)
        .into_iter()
        .map(|piece| Chunk {
            id: chunk_id(&path_metadata.file_path, piece.chunk_index, &piece.content),
            metadata: ChunkMetadata {
                version: path_metadata.version.clone(),
                file_path: path_metadata.file_path.clone(),
                section: path_metadata.section.clone(),
                content_type: path_metadata.content_type,
                title: title.clone(),
                heading_path: headings.clone(),
                has_code: detect_code(&piece.content),
                chunk_index: piece.chunk_index,
                doc_url: url.clone(),
            },
            content: piece.content,
        })
        .collect();

    Ok(chunks)
}

/// Uppercase letters that follow a non-letter, lowercase the rest
fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if previous_is_letter {
                result.extend(ch.to_lowercase());
            } else {
                result.extend(ch.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            result.push(ch);
            previous_is_letter = false;
        }
    }
    result
}
