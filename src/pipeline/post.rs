//! Post-processing hook run between transcription and delivery.
//!
//! The controller moves to `PostProcessing` only when a [`PostProcessor`] is
//! installed.  A failing post-processor never loses the transcript: the raw
//! result is delivered instead.

use async_trait::async_trait;
use thiserror::Error;

use crate::stt::SttResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PostProcessError(String);

impl PostProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Rewrites a transcript before it reaches the consumers.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn process(&self, raw: &SttResult) -> Result<SttResult, PostProcessError>;
}

/// Collapses whitespace runs in the transcript and its segments and trims
/// the ends.  Engines tend to emit a leading space per segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTidy;

#[async_trait]
impl PostProcessor for WhitespaceTidy {
    async fn process(&self, raw: &SttResult) -> Result<SttResult, PostProcessError> {
        let mut out = raw.clone();
        out.text = tidy(&raw.text);
        if let Some(segments) = out.segments.as_mut() {
            for seg in segments {
                seg.text = tidy(&seg.text);
            }
        }
        Ok(out)
    }
}

fn tidy(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
