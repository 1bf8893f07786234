//! Markdown dictation log.
//!
//! Each transcript becomes one entry:
//!
//! ```text
//! ## 2026-10-18 14:03:22 · de · 2.5 s
//!
//! Hallo Welt.
//!
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::{OutputError, ResultConsumer};
use crate::stt::SttResult;

/// Appends every transcript to a markdown file, creating it (and its parent
/// directory) on first use.
#[derive(Debug, Clone)]
pub struct HistoryFile {
    path: PathBuf,
}

impl HistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &str) -> Result<(), OutputError> {
        let io_err = |source| OutputError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(entry.as_bytes()).map_err(io_err)
    }
}

impl ResultConsumer for HistoryFile {
    fn consume(&self, result: &SttResult) -> Result<(), OutputError> {
        self.append(&format_entry(result, Local::now()))
    }
}

/// Render one history entry.
pub fn format_entry(result: &SttResult, at: DateTime<Local>) -> String {
    format!(
        "## {} · {} · {:.1} s\n\n{}\n\n",
        at.format("%Y-%m-%d %H:%M:%S"),
        result.language,
        result.duration_secs,
        result.text.trim()
    )
}
