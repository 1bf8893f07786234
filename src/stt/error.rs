//! Error taxonomy of the STT subprocess boundary.
//!
//! Every way an invocation can fail is a [`SttInvocationError`] variant.  The
//! engine's exit code is mapped through a fixed table ([`check_exit_code`]):
//!
//! | Exit code | Variant                                   |
//! |-----------|-------------------------------------------|
//! | 0         | success                                   |
//! | 1         | `GeneralFailure`                          |
//! | 2         | `ModelNotFound`                           |
//! | 3         | `AudioDeviceUnavailable`                  |
//! | 4         | `TimedOut` (engine-reported)              |
//! | 5         | `InvalidAudioFormat`                      |
//! | other     | `GeneralFailure` with code and stderr     |

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Exit codes of the STT engine contract.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_FAILURE: i32 = 1;
    pub const MODEL_NOT_FOUND: i32 = 2;
    pub const AUDIO_DEVICE: i32 = 3;
    pub const ENGINE_TIMEOUT: i32 = 4;
    pub const INVALID_AUDIO: i32 = 5;
}

/// What ended a run that did not finish on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured timeout elapsed; the process tree was killed.
    Deadline,
    /// The caller's cancellation token fired; the process tree was killed.
    Cancelled,
    /// The engine itself gave up and exited with code 4.
    Engine,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Deadline => write!(f, "deadline exceeded"),
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::Engine => write!(f, "reported by engine"),
        }
    }
}

/// A failed transcription.  Never retried by the pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SttInvocationError {
    /// Anything not covered below, including unknown exit codes, termination
    /// by signal and a missing input file (`exit_code == None`).
    #[error("transcription failed: {message}")]
    GeneralFailure {
        message: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("speech model not found or unreadable: {message}")]
    ModelNotFound {
        message: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("audio input error: {message}")]
    AudioDeviceUnavailable {
        message: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("transcription timed out after {timeout:?} ({reason})")]
    TimedOut {
        timeout: Duration,
        reason: StopReason,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("audio format rejected by the engine: {message}")]
    InvalidAudioFormat {
        message: String,
        exit_code: i32,
        stderr: String,
    },

    /// Exit code 0 but the JSON result was missing or unusable.
    #[error("unusable engine output {path}: {message}")]
    MalformedOutput { message: String, path: PathBuf },

    /// The binary could not be started at all (missing, not executable, …).
    #[error("cannot launch {binary}: {message}")]
    ProcessLaunchFailure { message: String, binary: PathBuf },
}

impl SttInvocationError {
    /// Raw exit code, when the process exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::GeneralFailure { exit_code, .. } | Self::TimedOut { exit_code, .. } => *exit_code,
            Self::ModelNotFound { exit_code, .. }
            | Self::AudioDeviceUnavailable { exit_code, .. }
            | Self::InvalidAudioFormat { exit_code, .. } => Some(*exit_code),
            Self::MalformedOutput { .. } | Self::ProcessLaunchFailure { .. } => None,
        }
    }

    /// The exit-code table entry for this failure, whatever ended the run.
    /// A locally enforced timeout or cancellation maps to
    /// [`exit_code::ENGINE_TIMEOUT`] like an engine-reported one.
    pub fn contract_code(&self) -> i32 {
        match self {
            Self::ModelNotFound { .. } => exit_code::MODEL_NOT_FOUND,
            Self::AudioDeviceUnavailable { .. } => exit_code::AUDIO_DEVICE,
            Self::TimedOut { .. } => exit_code::ENGINE_TIMEOUT,
            Self::InvalidAudioFormat { .. } => exit_code::INVALID_AUDIO,
            Self::GeneralFailure { .. }
            | Self::MalformedOutput { .. }
            | Self::ProcessLaunchFailure { .. } => exit_code::GENERAL_FAILURE,
        }
    }

    /// Captured standard error, when there was a process to capture it from.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::GeneralFailure { stderr, .. }
            | Self::ModelNotFound { stderr, .. }
            | Self::AudioDeviceUnavailable { stderr, .. }
            | Self::TimedOut { stderr, .. }
            | Self::InvalidAudioFormat { stderr, .. } => Some(stderr),
            Self::MalformedOutput { .. } | Self::ProcessLaunchFailure { .. } => None,
        }
    }

    /// Short stable name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GeneralFailure { .. } => "general-failure",
            Self::ModelNotFound { .. } => "model-not-found",
            Self::AudioDeviceUnavailable { .. } => "audio-device-unavailable",
            Self::TimedOut { .. } => "timed-out",
            Self::InvalidAudioFormat { .. } => "invalid-audio-format",
            Self::MalformedOutput { .. } => "malformed-output",
            Self::ProcessLaunchFailure { .. } => "process-launch-failure",
        }
    }
}

/// Map a finished process's exit code to success or a typed error.
///
/// `code` is `None` when the process was terminated by a signal.  `timeout`
/// is only used to fill in an engine-reported [`SttInvocationError::TimedOut`].
pub fn check_exit_code(
    code: Option<i32>,
    stderr: &str,
    timeout: Duration,
) -> Result<(), SttInvocationError> {
    let detail = |fallback: &str| {
        last_line(stderr)
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string())
    };
    let stderr = stderr.to_string();

    let Some(code) = code else {
        return Err(SttInvocationError::GeneralFailure {
            message: "engine was terminated by a signal".into(),
            exit_code: None,
            stderr,
        });
    };

    match code {
        exit_code::SUCCESS => Ok(()),
        exit_code::GENERAL_FAILURE => Err(SttInvocationError::GeneralFailure {
            message: detail("engine reported a processing failure"),
            exit_code: Some(code),
            stderr,
        }),
        exit_code::MODEL_NOT_FOUND => Err(SttInvocationError::ModelNotFound {
            message: detail("model file missing or unreadable"),
            exit_code: code,
            stderr,
        }),
        exit_code::AUDIO_DEVICE => Err(SttInvocationError::AudioDeviceUnavailable {
            message: detail("engine could not read its audio input"),
            exit_code: code,
            stderr,
        }),
        exit_code::ENGINE_TIMEOUT => Err(SttInvocationError::TimedOut {
            timeout,
            reason: StopReason::Engine,
            exit_code: Some(code),
            stderr,
        }),
        exit_code::INVALID_AUDIO => Err(SttInvocationError::InvalidAudioFormat {
            message: detail("unsupported audio format"),
            exit_code: code,
            stderr,
        }),
        other => Err(SttInvocationError::GeneralFailure {
            message: format!("engine exited with unrecognised code {other}"),
            exit_code: Some(other),
            stderr,
        }),
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}
