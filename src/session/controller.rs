//! Session state machine
//!
//! Runs as a single task that owns the session. Chunks feed the recognizer,
//! transcripts drive the state machine, and verification results come back
//! through [`FuturesUnordered`] to be applied in submission order.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use uuid::Uuid;

use super::{AuditLog, DispatchOutcome, DispatchRecord, Phase, Session, SessionEnd, SessionSettings};
use crate::Result;
use crate::actuator::ActuatorGateway;
use crate::command::{Command, CommandCandidate, CommandExtractor};
use crate::gate::CooldownRegistry;
use crate::verification::{
    VerificationJob, VerificationOutcome, VerificationPool, VerificationResult, VerificationTicket,
};
use crate::voice::{
    AudioChunk, CaptureErrors, ChunkReceiver, SharedRollingBuffer, StreamingRecognizer,
    TranscriptEvent,
};

/// How often the idle timeout is checked
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Drives sessions from audio to actuator
pub struct SessionController {
    recognizer: Box<dyn StreamingRecognizer>,
    extractor: CommandExtractor,
    pool: VerificationPool,
    actuator: Box<dyn ActuatorGateway>,
    rolling: SharedRollingBuffer,
    cooldowns: Arc<CooldownRegistry>,
    audit: AuditLog,
    settings: SessionSettings,
    session: Option<Session>,
    tickets: FuturesUnordered<VerificationTicket>,
    next_wake_allowed_at: Option<Instant>,
    jobs_submitted: u64,
}

impl SessionController {
    /// Create an idle controller
    ///
    /// `rolling` must be the buffer the audio source appends to.
    #[must_use]
    pub fn new(
        recognizer: Box<dyn StreamingRecognizer>,
        extractor: CommandExtractor,
        pool: VerificationPool,
        actuator: Box<dyn ActuatorGateway>,
        rolling: SharedRollingBuffer,
        settings: SessionSettings,
    ) -> Self {
        Self {
            recognizer,
            extractor,
            pool,
            actuator,
            rolling,
            cooldowns: Arc::new(CooldownRegistry::new(settings.cooldown)),
            audit: AuditLog::new(),
            settings,
            session: None,
            tickets: FuturesUnordered::new(),
            next_wake_allowed_at: None,
            jobs_submitted: 0,
        }
    }

    /// Share a cooldown registry instead of owning a fresh one
    #[must_use]
    pub fn with_cooldowns(mut self, cooldowns: Arc<CooldownRegistry>) -> Self {
        self.cooldowns = cooldowns;
        self
    }

    /// Record dispatches into `audit`
    #[must_use]
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Run until shutdown, the audio source closing, or a capture error
    ///
    /// Returns the audit log on a clean stop.
    ///
    /// # Errors
    ///
    /// Returns the capture error that stopped the loop
    pub async fn run(
        mut self,
        mut chunks: ChunkReceiver,
        mut capture_errors: CaptureErrors,
        shutdown: impl Future<Output = ()>,
    ) -> Result<AuditLog> {
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            actuator = %self.actuator.describe(),
            workers = self.pool.workers(),
            "session controller running"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                error = capture_errors.recv() => {
                    tracing::error!(error = %error, "audio capture failed");
                    self.shutdown().await;
                    return Err(error);
                }
                chunk = chunks.recv() => {
                    if let Some(chunk) = chunk {
                        self.handle_chunk(&chunk).await;
                    } else {
                        tracing::info!("audio source closed");
                        break;
                    }
                }
                Some(result) = self.tickets.next(), if !self.tickets.is_empty() => {
                    self.handle_result(result, Instant::now());
                }
                _ = tick.tick() => self.on_tick(Instant::now()),
            }
        }

        if chunks.dropped() > 0 {
            tracing::warn!(dropped = chunks.dropped(), "audio chunks dropped during run");
        }

        self.shutdown().await;
        Ok(self.audit)
    }

    /// Process one captured chunk
    ///
    /// The chunk must already be in the rolling buffer.
    pub async fn handle_chunk(&mut self, chunk: &AudioChunk) {
        if let Some(session) = &mut self.session {
            session.segment.push(chunk);
            session.frames_since_command += chunk.frames();
        }

        let events = match self.recognize(chunk).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error = %e, "speech recognizer failed");
                self.end_session(SessionEnd::RecognizerFailure, Instant::now());
                self.recognizer.reset();
                return;
            }
        };

        let now = Instant::now();
        for event in &events {
            self.handle_transcript(event, chunk, now);
        }

        self.check_boundary(now);
    }

    async fn recognize(&mut self, chunk: &AudioChunk) -> Result<Vec<TranscriptEvent>> {
        self.recognizer.feed(chunk).await?;
        self.recognizer.poll().await
    }

    fn handle_transcript(&mut self, event: &TranscriptEvent, chunk: &AudioChunk, now: Instant) {
        let classification = self.extractor.classify(&event.text);
        tracing::debug!(
            text = %event.text,
            is_final = event.is_final,
            is_wake = classification.is_wake,
            is_end = classification.is_end,
            commands = classification.commands.len(),
            "transcript"
        );

        if classification.is_end {
            if self.session.is_some() {
                self.end_session(SessionEnd::EndPhrase, now);
            }
        } else if classification.is_wake {
            if self.session.is_none() {
                self.start_session(chunk, now);
            }
        } else if self.session.is_some() {
            for command in classification.commands {
                self.detect(command, &event.text, now);
            }
        }

        if let Some(session) = self.session.as_mut().filter(|_| event.is_final) {
            session.utterance_seen.clear();
        }
    }

    fn start_session(&mut self, wake_chunk: &AudioChunk, now: Instant) {
        if let Some(allowed_at) = self.next_wake_allowed_at.filter(|&t| now < t) {
            tracing::debug!(
                wait_ms = allowed_at.saturating_duration_since(now).as_millis(),
                "wake phrase ignored, too soon after last session"
            );
            return;
        }

        // Capture may already have buffered chunks this loop hasn't handled
        let pre_roll = self.rolling.snapshot_through(wake_chunk);
        let session = Session::new(pre_roll, now);
        tracing::info!(
            session_id = %session.id,
            pre_roll_ms = session.segment.duration().as_millis(),
            "wake phrase detected, session started"
        );
        self.session = Some(session);
    }

    fn end_session(&mut self, reason: SessionEnd, now: Instant) {
        let Some(session) = self.session.take() else {
            return;
        };

        tracing::info!(
            session_id = %session.id,
            %reason,
            duration_ms = session.age(now).as_millis(),
            dispatched = session.dedup.len(),
            discarded_commands = session.pending.len(),
            in_flight = session.in_flight.len(),
            "session ended"
        );

        self.next_wake_allowed_at = Some(now + self.settings.inter_session_gap);
        self.rolling.clear();
    }

    /// Count a command seen in a transcript
    fn detect(&mut self, command: Command, text: &str, now: Instant) {
        let Some(session) = &mut self.session else {
            return;
        };

        // Partials repeat the same words until the final arrives
        if !session.utterance_seen.insert(command) {
            return;
        }

        let session_id = session.id;
        if self.cooldowns.is_cooling_down(command, now) {
            record(&mut self.audit, session_id, command, None, DispatchOutcome::CooldownSuppressed);
            return;
        }
        if session.dedup.contains(command) {
            record(&mut self.audit, session_id, command, None, DispatchOutcome::Duplicate);
            return;
        }
        if session.pending.iter().any(|c| c.command == command) {
            return;
        }

        tracing::info!(%session_id, %command, text, "command detected");
        session.pending.push(CommandCandidate {
            command,
            source_text: text.to_string(),
            detected_at: now,
        });
        session.frames_since_command = 0;
        session.last_activity = now;
    }

    fn check_boundary(&mut self, now: Instant) {
        let Some(session) = &mut self.session else {
            return;
        };

        let format = session.segment.format();
        if session.pending.is_empty() {
            session
                .segment
                .keep_latest(format.frames_in(self.settings.max_segment));
            return;
        }

        if session.segment.frames() < format.frames_in(self.settings.min_accept)
            || session.frames_since_command < format.frames_in(self.settings.post_roll)
        {
            return;
        }

        let sequence = session.next_sequence;
        session.next_sequence += 1;
        session.in_flight.insert(sequence, None);
        session.frames_since_command = 0;
        session.last_activity = now;

        let job = VerificationJob {
            session_id: session.id,
            sequence,
            segment: session.segment.take(),
            commands: std::mem::take(&mut session.pending),
        };

        tracing::info!(
            session_id = %job.session_id,
            sequence,
            duration_ms = job.segment.duration().as_millis(),
            commands = ?job.commands.iter().map(|c| c.command).collect::<Vec<_>>(),
            "utterance submitted for verification"
        );

        self.tickets.push(self.pool.submit(job));
        self.jobs_submitted += 1;
    }

    /// Apply a finished verification
    ///
    /// Results for a session that has ended, or already applied, are
    /// discarded. Others wait until every earlier submission has been
    /// applied.
    pub fn handle_result(&mut self, result: VerificationResult, now: Instant) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.id == result.session_id)
        else {
            tracing::debug!(
                session_id = %result.session_id,
                sequence = result.sequence,
                outcome = %result.outcome,
                "discarding verification result for ended session"
            );
            return;
        };

        let Some(slot) = session
            .in_flight
            .get_mut(&result.sequence)
            .filter(|slot| slot.is_none())
        else {
            tracing::debug!(
                sequence = result.sequence,
                "discarding verification result already applied"
            );
            return;
        };

        *slot = Some(result);
        session.last_activity = now;

        for ready in session.take_ready() {
            self.apply(ready, now);
        }
    }

    fn apply(&mut self, result: VerificationResult, now: Instant) {
        let Some(session) = &mut self.session else {
            return;
        };
        let session_id = session.id;
        let score = result.outcome.score();

        match &result.outcome {
            VerificationOutcome::Accepted(_) => {
                for candidate in &result.commands {
                    let command = candidate.command;
                    let outcome = if self.cooldowns.is_cooling_down(command, now) {
                        DispatchOutcome::CooldownSuppressed
                    } else if session.dedup.contains(command) {
                        DispatchOutcome::Duplicate
                    } else if !self.cooldowns.should_fire(command, now) {
                        DispatchOutcome::CooldownSuppressed
                    } else {
                        session.dedup.admit(command);
                        match self.actuator.send(command) {
                            Ok(()) => DispatchOutcome::Sent,
                            Err(e) => DispatchOutcome::SendFailed(e.to_string()),
                        }
                    };
                    record(&mut self.audit, session_id, command, score, outcome);
                }
            }
            VerificationOutcome::Rejected(_) | VerificationOutcome::Failed(_) => {
                tracing::warn!(
                    %session_id,
                    sequence = result.sequence,
                    outcome = %result.outcome,
                    "speaker not verified"
                );
                for candidate in &result.commands {
                    record(
                        &mut self.audit,
                        session_id,
                        candidate.command,
                        score,
                        DispatchOutcome::Unauthenticated,
                    );
                }
            }
            VerificationOutcome::TooShort(duration) => {
                tracing::debug!(
                    %session_id,
                    sequence = result.sequence,
                    duration_ms = duration.as_millis(),
                    "utterance too short to verify, discarded"
                );
            }
        }
    }

    /// Wait for the next verification to finish and apply it
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn process_next_result(&mut self) -> Option<VerificationResult> {
        let result = self.tickets.next().await?;
        self.handle_result(result.clone(), Instant::now());
        Some(result)
    }

    /// Close the session if it has been idle too long
    pub fn on_tick(&mut self, now: Instant) {
        let timed_out = self.session.as_ref().is_some_and(|s| {
            now.saturating_duration_since(s.last_activity) >= self.settings.session_timeout
        });
        if timed_out {
            self.end_session(SessionEnd::Timeout, now);
        }
    }

    async fn shutdown(&mut self) {
        self.end_session(SessionEnd::Shutdown, Instant::now());
        self.pool.close();

        let outstanding = self.tickets.len();
        while self.tickets.next().await.is_some() {}
        tracing::info!(discarded_results = outstanding, "session controller stopped");
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.session.as_ref().map_or(Phase::Idle, Session::phase)
    }

    /// Open session, if any
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Dispatch records so far
    #[must_use]
    pub const fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Cooldown registry used for dispatch
    #[must_use]
    pub fn cooldowns(&self) -> Arc<CooldownRegistry> {
        Arc::clone(&self.cooldowns)
    }

    /// Total verification jobs submitted
    #[must_use]
    pub const fn jobs_submitted(&self) -> u64 {
        self.jobs_submitted
    }

    /// Verification tickets not yet resolved
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.tickets.len()
    }
}

fn record(
    audit: &mut AuditLog,
    session_id: Uuid,
    command: Command,
    score: Option<f32>,
    outcome: DispatchOutcome,
) {
    audit.record(DispatchRecord {
        session_id,
        command,
        sent_at: Utc::now(),
        score,
        outcome,
    });
}
