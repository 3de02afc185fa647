
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::Result;

/// Which files have been fully embedded and stored, persisted between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingState {
    #[serde(default)]
    pub processed_files: BTreeSet<String>,
    #[serde(default)]
    pub chunks_created: u64,
    #[serde(default = "Local::now")]
    pub last_updated: DateTime<Local>,
}

impl Default for ProcessingState {
    #[inline]
    fn default() -> Self {
        Self {
            processed_files: BTreeSet::new(),
            chunks_created: 0,
            last_updated: Local::now(),
        }
    }
}

/// A file that failed to process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub file: String,
    pub error: String,
    pub timestamp: DateTime<Local>,
}

impl ErrorRecord {
    #[inline]
    pub fn new(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            error: error.into(),
            timestamp: Local::now(),
        }
    }
}

impl ProcessingState {
    /// Load the state file.
    ///
    /// A missing file is an empty state. So is a corrupt one, with a warning;
    /// already-processed files will then be embedded again.
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                warn!(
                    "Could not read state file {}: {}; starting from an empty state",
                    path.display(),
                    e
                );
                return Ok(Self::default());
            }
        };

        match serde_json::from_slice::<Self>(&content) {
            Ok(state) => {
                info!(
                    "Loaded state: {} files processed",
                    state.processed_files.len()
                );
                Ok(state)
            }
            Err(e) => {
                warn!(
                    "Could not load state file {}: {}; starting from an empty state",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Write the state as pretty JSON, replacing the previous file atomically
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomically(path, &content)
    }

    #[inline]
    pub fn is_processed(&self, file: &str) -> bool {
        self.processed_files.contains(file)
    }

    /// Mark `file` as done and add its chunks to the running total
    #[inline]
    pub fn record_processed(&mut self, file: impl Into<String>, chunks: u64) {
        self.processed_files.insert(file.into());
        self.chunks_created += chunks;
        self.last_updated = Local::now();
    }
}

/// Write the error report. Nothing is written for an empty list.
///
/// Returns whether a file was written.
#[inline]
pub fn save_errors(path: &Path, errors: &[ErrorRecord]) -> Result<bool> {
    if errors.is_empty() {
        return Ok(false);
    }
    let content = serde_json::to_string_pretty(errors)?;
    write_atomically(path, &content)?;
    Ok(true)
}

/// Read an error report; a missing file is an empty report
#[inline]
pub fn load_errors(path: &Path) -> Result<Vec<ErrorRecord>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Delete the state and error files if they exist
#[inline]
pub fn reset(state_path: &Path, error_path: &Path) -> Result<()> {
    for path in [state_path, error_path] {
        match fs::remove_file(path) {
            Ok(()) => info!("Removed {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn write_atomically(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
