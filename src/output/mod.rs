//! Where finished sessions go.
//!
//! # Overview
//!
//! The session controller hands every non-empty transcript to a
//! [`ResultConsumer`] and every failure to an [`ErrorPresenter`].  Rejected
//! recordings are moved aside by a [`Quarantine`].
//!
//! Consumers provided here:
//!
//! 1. [`ClipboardSink`] puts the text on the system clipboard.
//! 2. [`HistoryFile`] appends the text to a markdown log.
//! 3. [`FanOut`] delivers to several consumers in order.
//!
//! [`LogErrorPresenter`] reports failures through the `log` facade.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use holdtalk::output::{ClipboardSink, FanOut, HistoryFile, ResultConsumer};
//!
//! let consumer = FanOut::new(vec![
//!     Arc::new(ClipboardSink) as Arc<dyn ResultConsumer>,
//!     Arc::new(HistoryFile::new("history.md")),
//! ]);
//! ```

pub mod clipboard;
pub mod history;
pub mod quarantine;

pub use clipboard::ClipboardSink;
pub use history::HistoryFile;
pub use quarantine::{Quarantine, QuarantineDir};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::pipeline::SessionError;
use crate::stt::SttResult;

// ---------------------------------------------------------------------------
// OutputError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum OutputError {
    /// Could not open or write the system clipboard.
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Receives each successful, non-empty transcript.
///
/// Called on the session task; implementations should be quick.
pub trait ResultConsumer: Send + Sync {
    fn consume(&self, result: &SttResult) -> Result<(), OutputError>;
}

/// Shows a failed session to the user.
pub trait ErrorPresenter: Send + Sync {
    fn present(&self, error: &SessionError);
}

// ---------------------------------------------------------------------------
// FanOut
// ---------------------------------------------------------------------------

/// Delivers to every inner consumer, even after one fails.  The first error
/// is returned.
pub struct FanOut {
    consumers: Vec<Arc<dyn ResultConsumer>>,
}

impl FanOut {
    pub fn new(consumers: Vec<Arc<dyn ResultConsumer>>) -> Self {
        Self { consumers }
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

impl ResultConsumer for FanOut {
    fn consume(&self, result: &SttResult) -> Result<(), OutputError> {
        let mut first_err = None;
        for consumer in &self.consumers {
            if let Err(e) = consumer.consume(result) {
                log::warn!("output: consumer failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

// ---------------------------------------------------------------------------
// LogErrorPresenter
// ---------------------------------------------------------------------------

/// Logs the full diagnostic at debug level, then the user message at error
/// level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorPresenter;

impl ErrorPresenter for LogErrorPresenter {
    fn present(&self, error: &SessionError) {
        log::debug!("output: session failed: {error:?}");
        log::error!("{} ({error})", error.user_message());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
