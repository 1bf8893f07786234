//! Invocation parameter types and result types.
//!
//! [`SttInvocationConfig`] carries everything that controls one run of the
//! external engine.  [`SttResult`] is the parsed JSON document the engine
//! writes to its output file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// SttInvocationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SttConfigError {
    #[error("STT binary path is empty")]
    EmptyBinary,

    #[error("STT model path is empty")]
    EmptyModel,

    #[error("STT language is empty")]
    EmptyLanguage,

    #[error("STT timeout must be greater than zero")]
    ZeroTimeout,
}

/// Immutable settings for invoking the external STT engine.
///
/// The command line is assembled as separate arguments, never through a
/// shell:
///
/// ```text
/// <binary> [leading_args…] --model <model> --language <language>
///          --output-format json --output-file <out.json> [extra_args…] <input.wav>
/// ```
///
/// ```
/// use std::time::Duration;
/// use holdtalk::stt::SttInvocationConfig;
///
/// let cfg = SttInvocationConfig::new("stt-cli", "models/base.bin", "de", Duration::from_secs(30))
///     .unwrap()
///     .with_extra_args(["--threads", "4"]);
/// assert_eq!(cfg.language(), "de");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SttInvocationConfig {
    binary: PathBuf,
    model: PathBuf,
    language: String,
    timeout: Duration,
    leading_args: Vec<String>,
    extra_args: Vec<String>,
}

impl SttInvocationConfig {
    pub fn new(
        binary: impl Into<PathBuf>,
        model: impl Into<PathBuf>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SttConfigError> {
        let binary = binary.into();
        let model = model.into();
        let language = language.into();

        if binary.as_os_str().is_empty() {
            return Err(SttConfigError::EmptyBinary);
        }
        if model.as_os_str().is_empty() {
            return Err(SttConfigError::EmptyModel);
        }
        if language.trim().is_empty() {
            return Err(SttConfigError::EmptyLanguage);
        }
        if timeout.is_zero() {
            return Err(SttConfigError::ZeroTimeout);
        }

        Ok(Self {
            binary,
            model,
            language,
            timeout,
            leading_args: Vec::new(),
            extra_args: Vec::new(),
        })
    }

    /// Arguments placed right after the binary, before `--model`.  Useful
    /// when the engine is launched through an interpreter.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Arguments placed after the fixed flags, before the input path.
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn model(&self) -> &Path {
        &self.model
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn leading_args(&self) -> &[String] {
        &self.leading_args
    }

    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    /// Argument vector (without the binary) for transcribing `input` into
    /// `output`.
    pub fn command_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.leading_args.iter().map(OsString::from).collect();
        let fixed: [OsString; 8] = [
            "--model".into(),
            self.model.clone().into_os_string(),
            "--language".into(),
            self.language.clone().into(),
            "--output-format".into(),
            "json".into(),
            "--output-file".into(),
            output.as_os_str().to_owned(),
        ];
        args.extend(fixed);
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(input.as_os_str().to_owned());
        args
    }
}

static OUTPUT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique JSON output path next to `input`:
/// `<stem>.<yyyymmdd-HHMMSS-mmm>-<seq>.json`.
///
/// The per-process sequence number keeps two calls within the same
/// millisecond apart.
pub fn output_path_for(input: &Path) -> PathBuf {
    let dir = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcript".into());
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S-%3f");
    let seq = OUTPUT_SEQ.fetch_add(1, Ordering::Relaxed);

    dir.join(format!("{stem}.{stamp}-{seq}.json"))
}

// ---------------------------------------------------------------------------
// SttResult
// ---------------------------------------------------------------------------

/// A single timed segment produced by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Parsed engine output.
///
/// ```json
/// { "text": "…", "language": "de", "duration_sec": 2.4,
///   "segments": [ { "start": 0.0, "end": 1.1, "text": "…" } ],
///   "meta": { "model": "base" } }
/// ```
///
/// `segments` and `meta` may be absent or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttResult {
    pub text: String,
    pub language: String,
    #[serde(rename = "duration_sec")]
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
}

impl SttResult {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// True when the engine heard nothing worth delivering.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        self.segments.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SttInvocationConfig {
        SttInvocationConfig::new("/usr/bin/stt", "/models/base.bin", "de", Duration::from_secs(30))
            .unwrap()
    }

    #[test]
    fn new_rejects_empty_fields_and_zero_timeout() {
        let t = Duration::from_secs(1);
        assert_eq!(
            SttInvocationConfig::new("", "m", "de", t),
            Err(SttConfigError::EmptyBinary)
        );
        assert_eq!(
            SttInvocationConfig::new("b", "", "de", t),
            Err(SttConfigError::EmptyModel)
        );
        assert_eq!(
            SttInvocationConfig::new("b", "m", "  ", t),
            Err(SttConfigError::EmptyLanguage)
        );
        assert_eq!(
            SttInvocationConfig::new("b", "m", "de", Duration::ZERO),
            Err(SttConfigError::ZeroTimeout)
        );
    }

    #[test]
    fn command_args_follow_fixed_layout() {
        let cfg = cfg()
            .with_leading_args(["run"])
            .with_extra_args(["--threads", "4"]);
        let args = cfg.command_args(Path::new("/tmp/a b.wav"), Path::new("/tmp/a b.json"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(
            args,
            [
                "run",
                "--model",
                "/models/base.bin",
                "--language",
                "de",
                "--output-format",
                "json",
                "--output-file",
                "/tmp/a b.json",
                "--threads",
                "4",
                "/tmp/a b.wav",
            ]
        );
    }

    #[test]
    fn output_paths_are_unique_and_sit_next_to_input() {
        let input = Path::new("/data/scratch/recording-1.wav");
        let a = output_path_for(input);
        let b = output_path_for(input);

        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/data/scratch")));
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("recording-1."));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn bare_file_name_goes_to_current_dir() {
        let out = output_path_for(Path::new("take.wav"));
        assert_eq!(out.parent(), Some(Path::new(".")));
    }

    #[test]
    fn result_parses_full_document() {
        let raw = r#"{
            "text": "Hallo Welt.",
            "language": "de",
            "duration_sec": 2.5,
            "segments": [{ "start": 0.0, "end": 2.4, "text": "Hallo Welt." }],
            "meta": { "model": "base", "rtf": 0.3 }
        }"#;
        let r = SttResult::from_json(raw).unwrap();

        assert_eq!(r.text, "Hallo Welt.");
        assert_eq!(r.language, "de");
        assert!((r.duration_secs - 2.5).abs() < f64::EPSILON);
        assert_eq!(r.segments().len(), 1);
        assert_eq!(r.meta.as_ref().unwrap()["model"], "base");
        assert!(!r.is_empty());
    }

    #[test]
    fn optional_fields_may_be_null_or_absent() {
        let r = SttResult::from_json(
            r#"{"text":"","language":"en","duration_sec":0.5,"segments":null}"#,
        )
        .unwrap();
        assert!(r.segments.is_none());
        assert!(r.meta.is_none());
        assert!(r.segments().is_empty());
        assert!(r.is_empty());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        assert!(SttResult::from_json(r#"{"text":"hi","language":"en"}"#).is_err());
        assert!(SttResult::from_json("{ invalid json }").is_err());
    }

    #[test]
    fn serialises_with_wire_field_names() {
        let r = SttResult {
            text: "hi".into(),
            language: "en".into(),
            duration_secs: 0.75,
            segments: None,
            meta: None,
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"duration_sec\":0.75"));
        assert!(!json.contains("segments"));
    }
}
