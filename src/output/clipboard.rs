//! Clipboard delivery backed by the `arboard` crate.
//!
//! The [`arboard::Clipboard`] handle is not `Send` on every platform, so a
//! fresh one is opened per call.

use arboard::Clipboard;

use super::{OutputError, ResultConsumer};
use crate::stt::SttResult;

/// Replaces the clipboard contents with the transcript text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipboardSink;

impl ResultConsumer for ClipboardSink {
    fn consume(&self, result: &SttResult) -> Result<(), OutputError> {
        set_clipboard(&result.text)?;
        log::debug!("output: {} chars copied to clipboard", result.text.chars().count());
        Ok(())
    }
}

/// Write `text` into the system clipboard, replacing whatever was there.
pub fn set_clipboard(text: &str) -> Result<(), OutputError> {
    let mut clipboard = Clipboard::new().map_err(|e| OutputError::Clipboard(e.to_string()))?;
    clipboard
        .set_text(text)
        .map_err(|e| OutputError::Clipboard(e.to_string()))
}
