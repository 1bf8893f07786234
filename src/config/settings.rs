//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every section is
//! `#[serde(default)]`, so a settings file only needs the keys it changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::stt::{SttConfigError, SttInvocationConfig};

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the external STT engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Engine executable, absolute or looked up on `PATH`.
    pub binary: PathBuf,
    /// Model file handed to the engine with `--model`.
    pub model: PathBuf,
    /// Speech language as an ISO-639-1 code, or whatever the engine accepts
    /// (e.g. `"auto"`).
    pub language: String,
    /// Seconds before a running engine is killed.
    pub timeout_secs: u64,
    /// Arguments placed before the fixed flags.
    pub leading_args: Vec<String>,
    /// Engine-specific flags placed before the input path.
    pub extra_args: Vec<String>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("stt-cli"),
            model: AppPaths::new().models_dir.join("model.bin"),
            language: "en".into(),
            timeout_secs: 60,
            leading_args: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

impl SttConfig {
    /// Validated invocation settings for [`crate::stt::SubprocessEngine`].
    pub fn invocation(&self) -> Result<SttInvocationConfig, SttConfigError> {
        Ok(SttInvocationConfig::new(
            &self.binary,
            &self.model,
            &self.language,
            Duration::from_secs(self.timeout_secs),
        )?
        .with_leading_args(self.leading_args.iter().cloned())
        .with_extra_args(self.extra_args.iter().cloned()))
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for capture and recording storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
    /// Override for the recordings directory.
    pub scratch_dir: Option<PathBuf>,
    /// Override for the quarantine directory.
    pub quarantine_dir: Option<PathBuf>,
    /// Recording stops automatically after this many seconds; `0` disables
    /// the limit, as does a value too large to be a duration.
    pub max_recording_secs: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            scratch_dir: None,
            quarantine_dir: None,
            max_recording_secs: 120.0,
        }
    }
}

impl AudioConfig {
    pub fn max_recording(&self) -> Option<Duration> {
        if self.max_recording_secs.is_nan() || self.max_recording_secs <= 0.0 {
            return None;
        }
        match Duration::try_from_secs_f32(self.max_recording_secs) {
            Ok(limit) => Some(limit),
            Err(e) => {
                log::warn!(
                    "config: max_recording_secs = {} ignored ({e}); no limit",
                    self.max_recording_secs
                );
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Global hotkey binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Push-to-talk key name (e.g. `"F9"`, `"RightAlt"`).
    pub push_to_talk_key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            push_to_talk_key: "F9".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

/// Where transcripts are delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub copy_to_clipboard: bool,
    /// Append transcripts to a markdown history file.
    pub write_history: bool,
    /// Override for the history file location.
    pub history_file: Option<PathBuf>,
    /// Collapse whitespace runs before delivery.
    pub tidy_whitespace: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            copy_to_clipboard: true,
            write_history: true,
            history_file: None,
            tidy_whitespace: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use holdtalk::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stt: SttConfig,
    pub audio: AudioConfig,
    pub hotkey: HotkeyConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn scratch_dir(&self, paths: &AppPaths) -> PathBuf {
        self.audio
            .scratch_dir
            .clone()
            .unwrap_or_else(|| paths.scratch_dir.clone())
    }

    pub fn quarantine_dir(&self, paths: &AppPaths) -> PathBuf {
        self.audio
            .quarantine_dir
            .clone()
            .unwrap_or_else(|| paths.quarantine_dir.clone())
    }

    pub fn history_file(&self, paths: &AppPaths) -> PathBuf {
        self.output
            .history_file
            .clone()
            .unwrap_or_else(|| paths.history_file.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(original, loaded);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.stt.language, "en");
        assert_eq!(cfg.stt.timeout_secs, 60);
        assert!(cfg.stt.leading_args.is_empty());
        assert_eq!(cfg.hotkey.push_to_talk_key, "F9");
        assert!(cfg.output.copy_to_clipboard);
        assert_eq!(cfg.audio.max_recording(), Some(Duration::from_secs(120)));
        assert!(cfg.stt.invocation().is_ok());
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.stt.binary = "/opt/stt/bin/stt".into();
        cfg.stt.language = "de".into();
        cfg.stt.extra_args = vec!["--threads".into(), "4".into()];
        cfg.audio.input_device = Some("USB Mic".into());
        cfg.audio.scratch_dir = Some("/tmp/holdtalk".into());
        cfg.hotkey.push_to_talk_key = "RightAlt".into();
        cfg.output.write_history = false;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[stt]\nlanguage = \"th\"\ntimeout_secs = 15\n").unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.stt.language, "th");
        assert_eq!(cfg.stt.timeout_secs, 15);
        assert_eq!(cfg.stt.binary, SttConfig::default().binary);
        assert_eq!(cfg.hotkey, HotkeyConfig::default());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[stt\nlanguage = ").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }

    #[test]
    fn invocation_rejects_zero_timeout() {
        let mut cfg = SttConfig::default();
        cfg.timeout_secs = 0;
        assert_eq!(cfg.invocation(), Err(SttConfigError::ZeroTimeout));
    }

    #[test]
    fn invocation_carries_extra_arguments() {
        let mut cfg = SttConfig::default();
        cfg.leading_args = vec!["engine.py".into()];
        cfg.extra_args = vec!["--beam".into(), "5".into()];

        let inv = cfg.invocation().unwrap();
        assert_eq!(inv.leading_args(), ["engine.py"]);
        assert_eq!(inv.extra_args(), ["--beam", "5"]);
        assert_eq!(inv.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn zero_limit_disables_auto_stop() {
        let audio = AudioConfig {
            max_recording_secs: 0.0,
            ..AudioConfig::default()
        };
        assert_eq!(audio.max_recording(), None);
    }

    #[test]
    fn out_of_range_limit_disables_auto_stop() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("huge.toml");
        std::fs::write(&path, "[audio]\nmax_recording_secs = inf\n").unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert!(cfg.audio.max_recording_secs.is_infinite());
        assert_eq!(cfg.audio.max_recording(), None);

        for secs in [1e30, f32::NAN, -5.0] {
            let audio = AudioConfig {
                max_recording_secs: secs,
                ..AudioConfig::default()
            };
            assert_eq!(audio.max_recording(), None, "{secs}");
        }
    }

    #[test]
    fn overrides_win_over_platform_paths() {
        let paths = AppPaths::under(Path::new("/cfg"), Path::new("/data"));
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.scratch_dir(&paths), paths.scratch_dir);

        cfg.audio.scratch_dir = Some("/fast/disk".into());
        cfg.output.history_file = Some("/notes/dictation.md".into());
        assert_eq!(cfg.scratch_dir(&paths), Path::new("/fast/disk"));
        assert_eq!(cfg.history_file(&paths), Path::new("/notes/dictation.md"));
        assert_eq!(cfg.quarantine_dir(&paths), paths.quarantine_dir);
    }
}
