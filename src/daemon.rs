//! Daemon - the main voice gate service
//!
//! Wires configuration into the capture, recognition, verification and
//! actuator components and runs the session controller until Ctrl-C.

use std::sync::Arc;

use crate::actuator;
use crate::command::CommandExtractor;
use crate::session::{AuditLog, SessionController};
use crate::verification::{HttpSpeakerVerifier, SpeakerVerifier, VerificationPool, Voiceprint};
use crate::voice::{
    AudioCapture, AudioSource, CloudRecognizer, EnergySegmenter, LoudnessNormalizer,
    SharedRollingBuffer, chunk_channel,
};
use crate::{Config, Error, Result};

/// The voice gate daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C or a fatal capture error
    ///
    /// # Errors
    ///
    /// Returns error if a component can't be initialised or audio capture
    /// fails
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self) -> Result<()> {
        let config = &mut self.config;
        let format = config.audio.format;

        let normalizer = Arc::new(
            LoudnessNormalizer::new(
                config.verification.target_sample_rate,
                config.verification.trim_top_db,
                config.verification.target_rms,
            )
            .with_min_duration(config.verification.min_verify),
        );

        let reference = Arc::new(Voiceprint::from_wav(
            &config.verification.reference_voice,
            normalizer.as_ref(),
        )?);

        let verifier_url = config.verification.verifier_url.clone().ok_or_else(|| {
            Error::Config("verification.verifier_url required to authenticate speakers".to_string())
        })?;
        let verifier: Arc<dyn SpeakerVerifier> = Arc::new(HttpSpeakerVerifier::new(verifier_url)?);

        let pool = VerificationPool::new(
            verifier,
            normalizer,
            reference,
            config.verification.workers,
            config.verification.threshold,
            config.session.min_accept,
        );

        let provider = config.recognizer.provider;
        let recognizer = CloudRecognizer::new(
            provider,
            config.api_keys.take_for(provider),
            config.recognizer.model.clone(),
            EnergySegmenter::new(
                format.sample_rate,
                config.recognizer.energy_threshold,
                config.recognizer.min_speech_secs,
                config.recognizer.silence_secs,
            ),
        )?;

        let extractor =
            CommandExtractor::new(&config.wake_phrase, &config.end_phrase, &config.vocabulary);
        let actuator_config = config.actuator.clone();
        let actuator = tokio::task::spawn_blocking(move || actuator::connect(&actuator_config))
            .await
            .map_err(|e| Error::Actuator(format!("actuator setup failed: {e}")))?;

        let audit = match &config.audit_log {
            Some(path) => AuditLog::with_file(path)?,
            None => AuditLog::new(),
        };

        let rolling = SharedRollingBuffer::new(config.session.pre_roll, format);
        let (sink, chunks, capture_errors) =
            chunk_channel(config.audio.queue_capacity, rolling.clone());

        let controller = SessionController::new(
            Box::new(recognizer),
            extractor,
            pool,
            actuator,
            rolling,
            config.session,
        )
        .with_audit(audit);

        let mut capture = AudioCapture::new(format, config.audio.chunk_frames)?;
        capture.start(sink)?;

        tracing::info!(
            wake_phrase = %config.wake_phrase,
            end_phrase = %config.end_phrase,
            ?provider,
            "listening for wake phrase"
        );

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        let result = controller.run(chunks, capture_errors, shutdown).await;
        capture.stop();

        let audit = result?;
        tracing::info!(
            records = audit.total(),
            sent = audit.total_sent(),
            "daemon stopped"
        );
        Ok(())
    }
}
