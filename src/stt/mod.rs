//! STT (Speech-to-Text) adapter.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   SttEngine (trait)                      │
//! │                                                          │
//! │  ┌─────────────────────┐    ┌─────────────────────────┐  │
//! │  │ SttInvocationConfig │───▶│ SubprocessEngine        │  │
//! │  │ - binary, model     │    │ - spawn (no shell)      │  │
//! │  │ - language, timeout │    │ - timeout / cancel      │  │
//! │  └─────────────────────┘    │ - kill process tree     │  │
//! │                             └───────────┬─────────────┘  │
//! │                                         ▼                │
//! │                  exit code ─▶ SttInvocationError          │
//! │                  JSON file ─▶ SttResult                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use holdtalk::stt::{SttEngine, SttInvocationConfig, SubprocessEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let cfg = SttInvocationConfig::new("stt-cli", "models/base.bin", "en", Duration::from_secs(30))?;
//! let engine = SubprocessEngine::new(cfg);
//! let result = engine
//!     .transcribe(Path::new("take.wav"), &CancellationToken::new())
//!     .await?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod process;
pub mod transcribe;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{SttEngine, SubprocessEngine};
pub use error::{check_exit_code, exit_code, StopReason, SttInvocationError};
pub use process::kill_process_tree;
pub use transcribe::{output_path_for, Segment, SttConfigError, SttInvocationConfig, SttResult};

// test-only re-export so the pipeline tests can use the mock without reaching
// into `stt::engine`.
#[cfg(test)]
pub use engine::{mock_result, MockSttEngine};
