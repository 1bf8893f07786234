//! Core STT engine trait and implementations.
//!
//! # Overview
//!
//! [`SttEngine`] is the interface used by the pipeline.  It is object-safe and
//! `Send + Sync` so it can be held behind an `Arc<dyn SttEngine>`.
//!
//! [`SubprocessEngine`] is the production implementation: it runs an external
//! command-line engine on a WAV file and reads back a JSON result.  One call
//! is one process; nothing is kept warm between calls.
//!
//! [`MockSttEngine`] (available under `#[cfg(test)]`) returns scripted
//! responses and counts its calls, for unit-testing the pipeline without an
//! engine binary.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::stt::error::{check_exit_code, SttInvocationError};
use crate::stt::process::{self, RunError, RunOutcome};
use crate::stt::transcribe::{output_path_for, SttInvocationConfig, SttResult};

// ---------------------------------------------------------------------------
// SttEngine trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for speech-to-text engines.
#[async_trait]
pub trait SttEngine: Send + Sync {
    /// Transcribe the WAV file at `wav`.
    ///
    /// Implementations must give up promptly once `cancel` fires.
    async fn transcribe(
        &self,
        wav: &Path,
        cancel: &CancellationToken,
    ) -> Result<SttResult, SttInvocationError>;
}

// Compile-time check: SttEngine must be object-safe.
#[allow(dead_code)]
fn _assert_object_safe(_: Box<dyn SttEngine>) {}

// ---------------------------------------------------------------------------
// SubprocessEngine
// ---------------------------------------------------------------------------

/// Runs the configured engine binary once per transcription.
#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    config: SttInvocationConfig,
}

impl SubprocessEngine {
    pub fn new(config: SttInvocationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SttInvocationConfig {
        &self.config
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(self.config.binary());
        cmd.args(self.config.command_args(input, output));
        cmd
    }
}

#[async_trait]
impl SttEngine for SubprocessEngine {
    async fn transcribe(
        &self,
        wav: &Path,
        cancel: &CancellationToken,
    ) -> Result<SttResult, SttInvocationError> {
        if !wav.is_file() {
            return Err(SttInvocationError::GeneralFailure {
                message: format!("input audio {} does not exist", wav.display()),
                exit_code: None,
                stderr: String::new(),
            });
        }

        let output = output_path_for(wav);
        let timeout = self.config.timeout();
        log::info!(
            "stt: transcribing {} with {} (timeout {timeout:?})",
            wav.display(),
            self.config.binary().display()
        );

        let started = Instant::now();
        let outcome = process::run(self.command(wav, &output), timeout, cancel)
            .await
            .map_err(|e| match e {
                RunError::Spawn(source) => SttInvocationError::ProcessLaunchFailure {
                    message: source.to_string(),
                    binary: self.config.binary().to_path_buf(),
                },
                RunError::Wait(source) => SttInvocationError::GeneralFailure {
                    message: source.to_string(),
                    exit_code: None,
                    stderr: String::new(),
                },
            })?;

        match outcome {
            RunOutcome::Stopped { reason, stderr, .. } => Err(SttInvocationError::TimedOut {
                timeout,
                reason,
                exit_code: None,
                stderr,
            }),
            RunOutcome::Exited { code, stderr, .. } => {
                log::debug!(
                    "stt: engine exited with {code:?} after {:.2} s",
                    started.elapsed().as_secs_f32()
                );
                check_exit_code(code, &stderr, timeout)?;
                read_result(&output)
            }
        }
    }
}

fn read_result(path: &Path) -> Result<SttResult, SttInvocationError> {
    let malformed = |message: String| SttInvocationError::MalformedOutput {
        message,
        path: PathBuf::from(path),
    };

    let raw = std::fs::read_to_string(path)
        .map_err(|e| malformed(format!("cannot read result file: {e}")))?;
    SttResult::from_json(&raw).map_err(|e| malformed(format!("invalid result JSON: {e}")))
}

// ---------------------------------------------------------------------------
// MockSttEngine  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockSttEngine;


#[cfg(test)]
pub use mock::result as mock_result;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
