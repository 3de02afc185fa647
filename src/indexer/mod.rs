// Indexer module
// Coordinates discovery, chunking, embedding and storage of documentation files

pub mod state;

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::Result;
use crate::config::Config;
use crate::database::{CollectionParams, VectorStore, store_chunks};
use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::{Embedder, Tokenizer};
use crate::extractor::{build_chunks, extract_path_metadata};

pub use state::{ErrorRecord, ProcessingState};

/// Settings for one indexing run
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    pub source_dir: PathBuf,
    pub version: String,
    pub collection: String,
    pub chunking: ChunkingConfig,
    pub state_file: PathBuf,
    pub error_file: PathBuf,
    /// Save state after this many completed files
    pub save_interval: usize,
    pub dimension: usize,
    /// Draw a progress bar when stderr is a terminal
    pub show_progress: bool,
}

impl IndexerConfig {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_dir: config.pipeline.source_dir.clone(),
            version: config.pipeline.version.clone(),
            collection: config.qdrant.collection.clone(),
            chunking: config.chunking,
            state_file: config.pipeline.state_file.clone(),
            error_file: config.pipeline.error_file.clone(),
            save_interval: config.pipeline.save_interval.max(1),
            dimension: config.embedding.dimension,
            show_progress: true,
        }
    }
}

/// What happened to a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Already recorded as processed
    Skipped,
    /// Blank content
    Empty,
    /// Content produced no chunks
    NoChunks,
    Processed { chunks: usize },
}

/// Summary of an indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub files_found: usize,
    pub files_pending: usize,
    pub successful: usize,
    pub failed: usize,
    /// Chunks stored during this run
    pub chunks_created: usize,
    pub errors: Vec<ErrorRecord>,
}

/// Pipeline coordinator
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    tokenizer: Arc<dyn Tokenizer>,
    config: IndexerConfig,
}

impl Indexer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        tokenizer: Arc<dyn Tokenizer>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            tokenizer,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Create the collection if it does not exist. Returns whether it was created.
    #[inline]
    pub fn ensure_collection(&self) -> Result<bool> {
        let name = &self.config.collection;
        if let Some(info) = self.store.try_get_collection(name)? {
            info!(
                "Using existing collection '{}' ({} points)",
                name,
                info.points_count.unwrap_or_default()
            );
            return Ok(false);
        }

        info!("Creating collection '{}'", name);
        self.store
            .create_collection(name, &CollectionParams::cosine(self.config.dimension))?;
        Ok(true)
    }

    /// All Markdown files under the source directory, sorted
    #[inline]
    pub fn discover_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.config.source_dir).follow_links(true) {
            let entry = entry.map_err(|e| {
                std::io::Error::other(format!(
                    "Failed to walk {}: {}",
                    self.config.source_dir.display(),
                    e
                ))
            })?;
            if entry.file_type().is_file() && is_markdown(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Key a file is recorded under in the processing state
    #[inline]
    pub fn document_key(&self, path: &Path) -> String {
        extract_path_metadata(path, &self.config.source_dir, &self.config.version).map_or_else(
            |_| path.display().to_string(),
            |metadata| metadata.file_path,
        )
    }

    /// Process one file as a unit: read, chunk, embed, store.
    ///
    /// Does not touch `state`; the caller records the outcome.
    #[inline]
    pub fn process_file(&self, path: &Path, state: &ProcessingState) -> Result<FileOutcome> {
        let key = self.document_key(path);
        if state.is_processed(&key) {
            debug!("Skipping already processed: {}", key);
            return Ok(FileOutcome::Skipped);
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            warn!("Empty file: {}", path.display());
            return Ok(FileOutcome::Empty);
        }

        let chunks = build_chunks(
            path,
            &self.config.source_dir,
            &self.config.version,
            &content,
            &self.config.chunking,
            self.tokenizer.as_ref(),
        )?;
        if chunks.is_empty() {
            warn!("No chunks created for: {}", path.display());
            return Ok(FileOutcome::NoChunks);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts)?;
        let stored = store_chunks(
            self.store.as_ref(),
            &self.config.collection,
            &chunks,
            embeddings,
        )?;

        info!("Processed {}: {} chunks", key, stored);
        Ok(FileOutcome::Processed { chunks: stored })
    }

    /// Process every pending file, isolating per-file failures.
    ///
    /// `state` is saved every `save_interval` completed files and at the end.
    /// Errors are written to the error file when there are any.
    #[inline]
    pub fn run(&self, state: &mut ProcessingState) -> Result<RunReport> {
        self.ensure_collection()?;

        let files = self.discover_files()?;
        let mut report = RunReport {
            files_found: files.len(),
            ..RunReport::default()
        };

        if files.is_empty() {
            error!(
                "No markdown files found in {}",
                self.config.source_dir.display()
            );
            return Ok(report);
        }
        info!("Found {} markdown files", files.len());

        let pending: Vec<(PathBuf, String)> = files
            .into_iter()
            .map(|path| {
                let key = self.document_key(&path);
                (path, key)
            })
            .filter(|(_, key)| !state.is_processed(key))
            .collect();
        report.files_pending = pending.len();
        info!("Processing {} remaining files", pending.len());

        let bar = self.progress_bar(pending.len());
        for (path, key) in &pending {
            bar.set_message(format!(
                "{} (ok {}, failed {}, chunks {})",
                key, report.successful, report.failed, state.chunks_created
            ));

            match self.process_file(path, state) {
                Ok(FileOutcome::Processed { chunks }) => {
                    state.record_processed(key.as_str(), chunks as u64);
                    report.chunks_created += chunks;
                    report.successful += 1;
                }
                Ok(_) => report.successful += 1,
                Err(e) => {
                    error!("Error processing {}: {}", path.display(), e);
                    report
                        .errors
                        .push(ErrorRecord::new(path.display().to_string(), e.to_string()));
                    report.failed += 1;
                }
            }
            bar.inc(1);

            if (report.successful + report.failed) % self.config.save_interval.max(1) == 0 {
                state.save(&self.config.state_file)?;
            }
        }
        bar.finish_and_clear();

        state.save(&self.config.state_file)?;
        state::save_errors(&self.config.error_file, &report.errors)?;

        info!("Processing complete!");
        info!("Successfully processed: {} files", report.successful);
        info!("Failed: {} files", report.failed);
        info!("Total chunks created: {}", state.chunks_created);
        if !report.errors.is_empty() {
            warn!("Errors written to {}", self.config.error_file.display());
        }

        Ok(report)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.show_progress || !console::user_attended_stderr() {
            return ProgressBar::hidden();
        }
        ProgressBar::new(len as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Processing {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        )
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("md"))
}
