//! Biometric speaker verification
//!
//! Candidate segments are checked against a minimum duration, normalised and
//! scored against the enrolled [`Voiceprint`] on a bounded worker pool.

mod http;
mod pool;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use uuid::Uuid;

use crate::command::CommandCandidate;
use crate::voice::{AudioNormalizer, AudioSegment, NormalizedAudio, read_wav};
use crate::{Error, Result};

pub use http::HttpSpeakerVerifier;
pub use pool::{VerificationPool, VerificationTicket};

/// Normalised reference recording of the enrolled speaker
#[derive(Debug, Clone)]
pub struct Voiceprint {
    audio: NormalizedAudio,
}

impl Voiceprint {
    /// Wrap already-normalised reference audio
    #[must_use]
    pub const fn new(audio: NormalizedAudio) -> Self {
        Self { audio }
    }

    /// Load and normalise the reference WAV
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is missing, unreadable or
    /// normalises to silence; verification cannot run without it.
    pub fn from_wav(path: &Path, normalizer: &dyn AudioNormalizer) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "reference voice not found: {}",
                path.display()
            )));
        }

        let segment = read_wav(path).map_err(|e| Error::Config(e.to_string()))?;
        let audio = normalizer
            .normalize(&segment)
            .map_err(|e| Error::Config(format!("reference voice: {e}")))?;

        if audio.samples.is_empty() {
            return Err(Error::Config(format!(
                "reference voice is silent: {}",
                path.display()
            )));
        }

        tracing::info!(
            path = %path.display(),
            duration_ms = audio.duration().as_millis(),
            "loaded reference voiceprint"
        );

        Ok(Self { audio })
    }

    /// Normalised reference samples
    #[must_use]
    pub const fn audio(&self) -> &NormalizedAudio {
        &self.audio
    }
}

/// Scores how likely a candidate utterance came from the enrolled speaker
///
/// Implementations may block; the pool always calls them on a blocking
/// thread.
pub trait SpeakerVerifier: Send + Sync {
    /// Similarity score, higher is more similar
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] if the model cannot be reached
    fn score(&self, candidate: &NormalizedAudio, reference: &Voiceprint) -> Result<f32>;
}

/// One candidate segment and the commands detected in it
#[derive(Debug, Clone)]
pub struct VerificationJob {
    /// Session that produced the segment
    pub session_id: Uuid,
    /// Submission order within the session
    pub sequence: u64,
    /// Captured audio, pre-roll included
    pub segment: AudioSegment,
    /// Commands in detection order
    pub commands: Vec<CommandCandidate>,
}

/// How verification of one job ended
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    /// Score met the threshold
    Accepted(f32),
    /// Score below the threshold
    Rejected(f32),
    /// Capture shorter than the minimum, or silence only; verifier not called
    TooShort(Duration),
    /// Verifier error, panic or non-finite score
    Failed(String),
}

impl VerificationOutcome {
    /// Score, when the verifier produced one
    #[must_use]
    pub const fn score(&self) -> Option<f32> {
        match self {
            Self::Accepted(s) | Self::Rejected(s) => Some(*s),
            Self::TooShort(_) | Self::Failed(_) => None,
        }
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted(s) => write!(f, "accepted ({s:.3})"),
            Self::Rejected(s) => write!(f, "rejected ({s:.3})"),
            Self::TooShort(d) => write!(f, "too short ({}ms)", d.as_millis()),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Result of one [`VerificationJob`]
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Session that submitted the job
    pub session_id: Uuid,
    /// Submission order within the session
    pub sequence: u64,
    /// Verdict
    pub outcome: VerificationOutcome,
    /// The job's commands, untouched
    pub commands: Vec<CommandCandidate>,
}

impl VerificationResult {
    /// Whether the speaker was authenticated
    #[must_use]
    pub const fn accepted(&self) -> bool {
        matches!(self.outcome, VerificationOutcome::Accepted(_))
    }
}
