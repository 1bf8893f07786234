//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\holdtalk\
//!   macOS:   ~/Library/Application Support/holdtalk/
//!   Linux:   ~/.config/holdtalk/
//!
//! Data dir (recordings, quarantine, history):
//!   Windows: %LOCALAPPDATA%\holdtalk\
//!   macOS:   ~/Library/Application Support/holdtalk/
//!   Linux:   ~/.local/share/holdtalk/

use std::path::{Path, PathBuf};

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    pub data_dir: PathBuf,
    /// Where finished takes are written before transcription.
    pub scratch_dir: PathBuf,
    /// Where recordings that failed the WAV check are moved.
    pub quarantine_dir: PathBuf,
    /// Markdown log of every transcript.
    pub history_file: PathBuf,
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "holdtalk";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_root = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_root = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::under(&config_root, &data_root)
    }

    /// Lay out the application directories below explicit roots.
    pub fn under(config_root: &Path, data_root: &Path) -> Self {
        let config_dir = config_root.join(Self::APP_NAME);
        let data_dir = data_root.join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            scratch_dir: data_dir.join("recordings"),
            quarantine_dir: data_dir.join("quarantine"),
            history_file: data_dir.join("history.md"),
            models_dir: data_dir.join("models"),
            data_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
