//! Shared test utilities
//!
//! Doubles for the external collaborators plus a harness that drives a
//! [`SessionController`] chunk by chunk.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use voice_gate::voice::{
    AudioChunk, AudioFormat, AudioNormalizer, AudioSegment, NormalizedAudio, SharedRollingBuffer,
    StreamingRecognizer, TranscriptEvent, f32_to_i16,
};
use voice_gate::{
    ActuatorGateway, Command, CommandExtractor, Error, Result, SessionController,
    SessionSettings, SpeakerVerifier, VerificationPool, Vocabulary, Voiceprint,
};

/// Test sample rate
pub const RATE: u32 = 16000;

/// Frames per harness chunk (100ms)
pub const CHUNK: usize = 1600;

/// Acceptance threshold used by the harness
pub const THRESHOLD: f32 = 0.25;

/// Mono 16 kHz
#[must_use]
pub const fn format() -> AudioFormat {
    AudioFormat::mono(RATE)
}

/// Chunk of `frames` identical samples
#[must_use]
pub fn dc_chunk(frames: usize, value: i16) -> AudioChunk {
    AudioChunk::new(vec![value; frames], format())
}

/// Generate sine wave audio samples
#[must_use]
pub fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[must_use]
pub fn generate_silence(duration_secs: f32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Settings with no inter-session gap so tests can reopen sessions at once
#[must_use]
pub fn test_settings() -> SessionSettings {
    SessionSettings {
        inter_session_gap: Duration::ZERO,
        ..SessionSettings::default()
    }
}

// -- Recognizer ------------------------------------------------------------

enum Step {
    Events(Vec<TranscriptEvent>),
    Fail,
}

/// What the scripted recognizer emits on each feed
#[derive(Clone, Default)]
pub struct Script {
    steps: Arc<Mutex<VecDeque<Step>>>,
    resets: Arc<AtomicUsize>,
}

impl Script {
    /// Next feed yields a final transcript
    pub fn final_text(&self, text: &str) {
        self.push(Step::Events(vec![TranscriptEvent::final_text(text)]));
    }

    /// Next feed yields a partial transcript
    pub fn partial(&self, text: &str) {
        self.push(Step::Events(vec![TranscriptEvent::partial(text)]));
    }

    /// Next feed fails
    pub fn fail(&self) {
        self.push(Step::Fail);
    }

    /// Times the controller reset the recognizer
    #[must_use]
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    fn next(&self) -> Option<Step> {
        self.steps.lock().unwrap().pop_front()
    }
}

/// Emits scripted transcripts, one script step per fed chunk
pub struct ScriptedRecognizer {
    script: Script,
    ready: Vec<TranscriptEvent>,
}

impl ScriptedRecognizer {
    #[must_use]
    pub fn new(script: Script) -> Self {
        Self {
            script,
            ready: Vec::new(),
        }
    }
}

#[async_trait]
impl StreamingRecognizer for ScriptedRecognizer {
    async fn feed(&mut self, _chunk: &AudioChunk) -> Result<()> {
        match self.script.next() {
            Some(Step::Events(events)) => {
                self.ready.extend(events);
                Ok(())
            }
            Some(Step::Fail) => Err(Error::Recognizer("engine crashed".to_string())),
            None => Ok(()),
        }
    }

    async fn poll(&mut self) -> Result<Vec<TranscriptEvent>> {
        Ok(std::mem::take(&mut self.ready))
    }

    fn reset(&mut self) {
        self.ready.clear();
        self.script.resets.fetch_add(1, Ordering::SeqCst);
    }
}

// -- Normalizer / verifiers ------------------------------------------------

/// Converts to mono f32 without resampling or trimming
pub struct IdentityNormalizer;

impl AudioNormalizer for IdentityNormalizer {
    fn normalize(&self, segment: &AudioSegment) -> Result<NormalizedAudio> {
        Ok(NormalizedAudio {
            samples: segment.to_mono_f32(),
            sample_rate: segment.format().sample_rate,
        })
    }
}

/// Returns a settable score and counts calls
#[derive(Default)]
pub struct FixedVerifier {
    score_bits: AtomicU32,
    calls: AtomicUsize,
    last_len: AtomicUsize,
}

impl FixedVerifier {
    #[must_use]
    pub fn new(score: f32) -> Arc<Self> {
        let verifier = Self::default();
        verifier.set_score(score);
        Arc::new(verifier)
    }

    pub fn set_score(&self, score: f32) {
        self.score_bits.store(score.to_bits(), Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Samples in the most recently scored audio
    #[must_use]
    pub fn last_len(&self) -> usize {
        self.last_len.load(Ordering::SeqCst)
    }
}

impl SpeakerVerifier for FixedVerifier {
    fn score(&self, candidate: &NormalizedAudio, _: &Voiceprint) -> Result<f32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_len.store(candidate.samples.len(), Ordering::SeqCst);
        Ok(f32::from_bits(self.score_bits.load(Ordering::SeqCst)))
    }
}

/// Blocks each call until the segment's marker value is released
///
/// The marker is the value of the segment's last sample.
pub struct GatedVerifier {
    released: Mutex<HashMap<i16, bool>>,
    wake: Condvar,
    score: f32,
}

impl GatedVerifier {
    #[must_use]
    pub fn new(score: f32) -> Arc<Self> {
        Arc::new(Self {
            released: Mutex::new(HashMap::new()),
            wake: Condvar::new(),
            score,
        })
    }

    /// Let the call scoring the segment ending in `marker` finish
    pub fn release(&self, marker: i16) {
        self.released.lock().unwrap().insert(marker, true);
        self.wake.notify_all();
    }
}

impl SpeakerVerifier for GatedVerifier {
    fn score(&self, candidate: &NormalizedAudio, _: &Voiceprint) -> Result<f32> {
        #[allow(clippy::cast_possible_truncation)]
        let marker = candidate
            .samples
            .last()
            .map_or(0, |&s| (s * 32768.0).round() as i16);

        let mut released = self.released.lock().unwrap();
        while !released.get(&marker).copied().unwrap_or(false) {
            released = self.wake.wait(released).unwrap();
        }
        Ok(self.score)
    }
}

// -- Actuator --------------------------------------------------------------

/// Records every command; can be told to fail
#[derive(Clone, Default)]
pub struct RecordingActuator {
    sent: Arc<Mutex<Vec<Command>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingActuator {
    #[must_use]
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ActuatorGateway for RecordingActuator {
    fn send(&mut self, command: Command) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Actuator("port closed".to_string()));
        }
        self.sent.lock().unwrap().push(command);
        Ok(())
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

// -- Harness ---------------------------------------------------------------

/// Pool over the given verifier with identity normalisation
#[must_use]
pub fn pool(verifier: Arc<dyn SpeakerVerifier>, min_capture: Duration) -> VerificationPool {
    pool_with(verifier, Arc::new(IdentityNormalizer), min_capture)
}

/// Pool over the given verifier and normaliser
#[must_use]
pub fn pool_with(
    verifier: Arc<dyn SpeakerVerifier>,
    normalizer: Arc<dyn AudioNormalizer>,
    min_capture: Duration,
) -> VerificationPool {
    VerificationPool::new(
        verifier,
        normalizer,
        Arc::new(Voiceprint::new(NormalizedAudio {
            samples: vec![0.1; CHUNK],
            sample_rate: RATE,
        })),
        2,
        THRESHOLD,
        min_capture,
    )
}

/// A controller wired to test doubles
pub struct Harness {
    pub controller: SessionController,
    pub script: Script,
    pub actuator: RecordingActuator,
    pub rolling: SharedRollingBuffer,
}

impl Harness {
    /// Harness with default vocabulary, wake "alexa", end "go"
    #[must_use]
    pub fn new(verifier: Arc<dyn SpeakerVerifier>, settings: SessionSettings) -> Self {
        Self::with_pool(pool(verifier, Duration::from_secs(1)), settings)
    }

    /// Harness scoring through `pool`
    #[must_use]
    pub fn with_pool(pool: VerificationPool, settings: SessionSettings) -> Self {
        let script = Script::default();
        let actuator = RecordingActuator::default();
        let rolling = SharedRollingBuffer::new(settings.pre_roll, format());

        let controller = SessionController::new(
            Box::new(ScriptedRecognizer::new(script.clone())),
            CommandExtractor::new("alexa", "go", &Vocabulary::default()),
            pool,
            Box::new(actuator.clone()),
            rolling.clone(),
            settings,
        );

        Self {
            controller,
            script,
            actuator,
            rolling,
        }
    }

    /// Capture one chunk the way the audio source would
    pub async fn push(&mut self, frames: usize, value: i16) {
        self.push_chunk(dc_chunk(frames, value)).await;
    }

    pub async fn push_chunk(&mut self, chunk: AudioChunk) {
        self.rolling.append(chunk.clone());
        self.controller.handle_chunk(&chunk).await;
    }

    /// A 440 Hz tone of `duration`, in whole chunks
    pub async fn tone(&mut self, duration: Duration) {
        let samples: Vec<i16> = generate_sine_samples(440.0, duration.as_secs_f32(), 0.5)
            .into_iter()
            .map(f32_to_i16)
            .collect();
        for block in samples.chunks(CHUNK) {
            self.push_chunk(AudioChunk::new(block.to_vec(), format()))
                .await;
        }
    }

    /// A chunk during which the recognizer finalises `text`
    pub async fn say(&mut self, text: &str) {
        self.script.final_text(text);
        self.push(CHUNK, 1000).await;
    }

    /// A chunk during which the recognizer reports partial `text`
    pub async fn say_partial(&mut self, text: &str) {
        self.script.partial(text);
        self.push(CHUNK, 1000).await;
    }

    /// Untranscribed audio of roughly `duration`, in whole chunks
    pub async fn audio(&mut self, duration: Duration, value: i16) {
        let chunks = format().frames_in(duration).div_ceil(CHUNK);
        for _ in 0..chunks {
            self.push(CHUNK, value).await;
        }
    }

    /// Wait for one verification result and apply it
    pub async fn settle_one(&mut self) {
        self.controller
            .process_next_result()
            .await
            .expect("a verification job in flight");
    }

    /// Apply every outstanding verification result
    pub async fn settle(&mut self) {
        while self.controller.process_next_result().await.is_some() {}
    }
}
