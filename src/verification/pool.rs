//! Bounded pool of concurrent verification jobs

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;

use super::{
    SpeakerVerifier, VerificationJob, VerificationOutcome, VerificationResult, Voiceprint,
};
use crate::voice::{AudioNormalizer, AudioSegment};

/// Handle to a submitted job; resolves once the job has been scored
///
/// The job runs whether or not the ticket is polled.
pub type VerificationTicket = BoxFuture<'static, VerificationResult>;

/// Runs verification jobs with at most `workers` scoring at once
///
/// Excess jobs wait for a permit in submission order.
#[derive(Clone)]
pub struct VerificationPool {
    scorer: Arc<Scorer>,
    permits: Arc<Semaphore>,
    workers: usize,
}

struct Scorer {
    verifier: Arc<dyn SpeakerVerifier>,
    normalizer: Arc<dyn AudioNormalizer>,
    reference: Arc<Voiceprint>,
    threshold: f32,
    min_duration: Duration,
}

impl VerificationPool {
    /// Create a pool
    ///
    /// * `threshold` - scores at or above this accept
    /// * `min_duration` - captured segments shorter than this are `TooShort`
    ///   without being normalised or scored
    #[must_use]
    pub fn new(
        verifier: Arc<dyn SpeakerVerifier>,
        normalizer: Arc<dyn AudioNormalizer>,
        reference: Arc<Voiceprint>,
        workers: usize,
        threshold: f32,
        min_duration: Duration,
    ) -> Self {
        let workers = workers.max(1);
        Self {
            scorer: Arc::new(Scorer {
                verifier,
                normalizer,
                reference,
                threshold,
                min_duration,
            }),
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Queue a job and return its ticket
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, job: VerificationJob) -> VerificationTicket {
        let VerificationJob {
            session_id,
            sequence,
            segment,
            commands,
        } = job;

        tracing::debug!(
            %session_id,
            sequence,
            duration_ms = segment.duration().as_millis(),
            commands = commands.len(),
            "verification job submitted"
        );

        let scorer = Arc::clone(&self.scorer);
        let permits = Arc::clone(&self.permits);

        let handle = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return VerificationOutcome::Failed("verification pool closed".to_string());
            };

            tokio::task::spawn_blocking(move || scorer.evaluate(&segment))
                .await
                .unwrap_or_else(|e| VerificationOutcome::Failed(format!("verifier panicked: {e}")))
        });

        async move {
            let outcome = handle.await.unwrap_or_else(|e| {
                VerificationOutcome::Failed(format!("verification task failed: {e}"))
            });

            tracing::debug!(%session_id, sequence, %outcome, "verification finished");

            VerificationResult {
                session_id,
                sequence,
                outcome,
                commands,
            }
        }
        .boxed()
    }

    /// Stop handing out permits; queued jobs resolve as `Failed`
    pub fn close(&self) {
        self.permits.close();
    }

    /// Maximum concurrent jobs
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs that could start right now without waiting
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Scorer {
    fn evaluate(&self, segment: &AudioSegment) -> VerificationOutcome {
        // Compare in frames so the boundary is exact
        if segment.frames() < segment.format().frames_in(self.min_duration) {
            return VerificationOutcome::TooShort(segment.duration());
        }

        let audio = match self.normalizer.normalize(segment) {
            Ok(audio) => audio,
            Err(e) => return VerificationOutcome::Failed(e.to_string()),
        };

        // Nothing left once silence is trimmed
        if audio.samples.is_empty() {
            return VerificationOutcome::TooShort(audio.duration());
        }

        match self.verifier.score(&audio, &self.reference) {
            Ok(score) if !score.is_finite() => {
                VerificationOutcome::Failed(format!("non-finite score {score}"))
            }
            Ok(score) if score >= self.threshold => VerificationOutcome::Accepted(score),
            Ok(score) => VerificationOutcome::Rejected(score),
            Err(e) => VerificationOutcome::Failed(e.to_string()),
        }
    }
}
