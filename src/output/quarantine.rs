//! Moves recordings that failed the WAV check out of the scratch directory.
//!
//! Each quarantined file gets a `<name>.reason.txt` sidecar stating why it
//! was rejected, so the file can be inspected later.

use std::io;
use std::path::{Path, PathBuf};

use super::OutputError;
use crate::audio::WavFormatViolation;

pub trait Quarantine: Send + Sync {
    /// Set `wav` aside; returns its new location.
    fn quarantine(&self, wav: &Path, violation: &WavFormatViolation) -> Result<PathBuf, OutputError>;
}

/// Quarantine into a fixed directory.
#[derive(Debug, Clone)]
pub struct QuarantineDir {
    dir: PathBuf,
}

impl QuarantineDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First free `name`, `name-1`, `name-2`, … inside the directory.
    fn free_target(&self, wav: &Path) -> PathBuf {
        let stem = wav
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".into());
        let ext = wav
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut candidate = self.dir.join(format!("{stem}{ext}"));
        let mut n = 1;
        while candidate.exists() {
            candidate = self.dir.join(format!("{stem}-{n}{ext}"));
            n += 1;
        }
        candidate
    }
}

impl Quarantine for QuarantineDir {
    fn quarantine(&self, wav: &Path, violation: &WavFormatViolation) -> Result<PathBuf, OutputError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| OutputError::Io { path, source }
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let target = self.free_target(wav);
        move_file(wav, &target).map_err(io_err(wav))?;

        let mut sidecar = target.clone().into_os_string();
        sidecar.push(".reason.txt");
        let sidecar = PathBuf::from(sidecar);
        std::fs::write(&sidecar, format!("{violation}\n")).map_err(io_err(&sidecar))?;

        log::info!("output: quarantined {} → {}", wav.display(), target.display());
        Ok(target)
    }
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}
