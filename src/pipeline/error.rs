//! Failure kinds a dictation session can end with.

use thiserror::Error;

use crate::audio::{RecorderError, WavFormatViolation};
use crate::output::OutputError;
use crate::pipeline::post::PostProcessError;
use crate::pipeline::state::InvalidTransition;
use crate::stt::SttInvocationError;

/// Everything the session controller can report to an
/// [`crate::output::ErrorPresenter`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("recording failed: {0}")]
    Capture(#[from] RecorderError),

    #[error("recording rejected: {0}")]
    Format(#[from] WavFormatViolation),

    #[error(transparent)]
    Stt(#[from] SttInvocationError),

    #[error("post-processing failed: {0}")]
    PostProcess(#[from] PostProcessError),

    #[error("delivering the transcript failed: {0}")]
    Consumer(#[from] OutputError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl SessionError {
    /// Short message meant for the person dictating, one per failure kind.
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::Capture(_) => "Could not record audio. Check the microphone.",
            SessionError::Format(_) => {
                "The recording is not a 16 kHz mono 16-bit WAV and was not transcribed."
            }
            SessionError::Stt(e) => match e {
                SttInvocationError::GeneralFailure { .. } => "Transcription failed.",
                SttInvocationError::ModelNotFound { .. } => {
                    "Speech model not found. Check the configured model path."
                }
                SttInvocationError::AudioDeviceUnavailable { .. } => {
                    "The speech engine could not read the audio."
                }
                SttInvocationError::TimedOut { .. } => {
                    "Transcription took too long and was stopped."
                }
                SttInvocationError::InvalidAudioFormat { .. } => {
                    "The speech engine rejected the audio format."
                }
                SttInvocationError::MalformedOutput { .. } => {
                    "The speech engine returned an unreadable result."
                }
                SttInvocationError::ProcessLaunchFailure { .. } => {
                    "The speech engine could not be started. Check the configured binary."
                }
            },
            SessionError::PostProcess(_) => "Post-processing failed; the raw transcript was kept.",
            SessionError::Consumer(_) => "The transcript could not be delivered.",
            SessionError::Transition(_) => "Internal error; the session was reset.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::pipeline::state::SessionState;
    use crate::stt::StopReason;

    #[test]
    fn every_kind_has_its_own_user_message() {
        let stt = |e: SttInvocationError| SessionError::Stt(e);
        let errors = vec![
            SessionError::Capture(RecorderError::NotRecording),
            SessionError::Format(WavFormatViolation::EmptyAudio),
            stt(SttInvocationError::GeneralFailure {
                message: "x".into(),
                exit_code: Some(1),
                stderr: String::new(),
            }),
            stt(SttInvocationError::ModelNotFound {
                message: "x".into(),
                exit_code: 2,
                stderr: String::new(),
            }),
            stt(SttInvocationError::AudioDeviceUnavailable {
                message: "x".into(),
                exit_code: 3,
                stderr: String::new(),
            }),
            stt(SttInvocationError::TimedOut {
                timeout: Duration::from_secs(1),
                reason: StopReason::Deadline,
                exit_code: None,
                stderr: String::new(),
            }),
            stt(SttInvocationError::InvalidAudioFormat {
                message: "x".into(),
                exit_code: 5,
                stderr: String::new(),
            }),
            stt(SttInvocationError::MalformedOutput {
                message: "x".into(),
                path: PathBuf::from("out.json"),
            }),
            stt(SttInvocationError::ProcessLaunchFailure {
                message: "x".into(),
                binary: PathBuf::from("stt"),
            }),
            SessionError::PostProcess(PostProcessError::new("x")),
            SessionError::Consumer(OutputError::Clipboard("x".into())),
            SessionError::Transition(InvalidTransition {
                from: SessionState::Idle,
                to: SessionState::Processing,
            }),
        ];

        let messages: HashSet<_> = errors.iter().map(SessionError::user_message).collect();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn stt_errors_display_transparently() {
        let inner = SttInvocationError::ProcessLaunchFailure {
            message: "No such file or directory".into(),
            binary: PathBuf::from("/opt/stt"),
        };
        let outer = SessionError::from(inner.clone());
        assert_eq!(outer.to_string(), inner.to_string());
    }
}
