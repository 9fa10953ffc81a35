//! Streaming speech recognition interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::AudioChunk;
use crate::Result;

/// A partial or final transcript from the recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    /// Recognized text
    pub text: String,
    /// Whether this closes the current utterance
    pub is_final: bool,
    /// When the recognizer produced the event
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    /// In-progress hypothesis for the current utterance
    #[must_use]
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            timestamp: Utc::now(),
        }
    }

    /// Final result for the current utterance
    #[must_use]
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            timestamp: Utc::now(),
        }
    }
}

/// Speech-to-text engine consumed through a feed/poll interface
///
/// Each utterance yields zero or more partial events followed by exactly one
/// final event.
#[async_trait]
pub trait StreamingRecognizer: Send {
    /// Feed a chunk of audio
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Recognizer`] if the engine is unavailable
    async fn feed(&mut self, chunk: &AudioChunk) -> Result<()>;

    /// Drain the events produced since the last poll
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Recognizer`] if the engine is unavailable
    async fn poll(&mut self) -> Result<Vec<TranscriptEvent>>;

    /// Discard any partially recognised utterance
    fn reset(&mut self) {}
}
