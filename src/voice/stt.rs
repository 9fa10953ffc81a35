//! Speech-to-text (STT) over HTTP
//!
//! [`CloudRecognizer`] cuts the live stream into utterances with a local
//! energy detector and transcribes each utterance in the background, so
//! `feed` never waits on the network.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::normalize::calculate_rms;
use super::{AudioChunk, AudioSegment, StreamingRecognizer, TranscriptEvent, samples_to_wav};
use crate::{Error, Result};

/// Longest utterance sent in one request (in seconds)
const MAX_UTTERANCE_SECS: usize = 15;

/// Response from OpenAI Whisper transcription API
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT provider backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    /// `OpenAI` Whisper
    #[default]
    Whisper,
    /// Deepgram
    Deepgram,
}

/// Transcribes WAV audio to text
struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio).await,
            SttProvider::Deepgram => self.transcribe_deepgram(audio).await,
        }
    }

    /// Transcribe using `OpenAI` Whisper
    async fn transcribe_whisper(&self, audio: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Recognizer(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Recognizer(format!("Whisper request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognizer(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, audio: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(audio)
            .send()
            .await
            .map_err(|e| Error::Recognizer(format!("Deepgram request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognizer(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let result: DeepgramResponse = response.json().await?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }
}

/// State of the energy segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Idle,
    /// Speech detected, accumulating until trailing silence
    Listening,
}

/// Splits a sample stream into speech utterances by RMS energy
#[derive(Debug)]
pub struct EnergySegmenter {
    energy_threshold: f32,
    min_speech_samples: usize,
    silence_samples: usize,
    max_samples: usize,
    state: SegmenterState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
}

impl EnergySegmenter {
    /// Create a segmenter for mono audio at `sample_rate`
    ///
    /// * `min_speech_secs` - shorter bursts are discarded as noise
    /// * `silence_secs` - trailing silence that closes an utterance
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(
        sample_rate: u32,
        energy_threshold: f32,
        min_speech_secs: f32,
        silence_secs: f32,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let rate = sample_rate as f32;
        Self {
            energy_threshold,
            min_speech_samples: (rate * min_speech_secs) as usize,
            silence_samples: (rate * silence_secs) as usize,
            max_samples: sample_rate as usize * MAX_UTTERANCE_SECS,
            state: SegmenterState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Process samples; returns a completed utterance when one closes
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        let energy = calculate_rms(samples);
        let is_speech = energy > self.energy_threshold;

        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.state = SegmenterState::Listening;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
                None
            }
            SegmenterState::Listening => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                let voiced = self.speech_buffer.len() - self.silence_counter;
                let closed = self.silence_counter >= self.silence_samples
                    || self.speech_buffer.len() >= self.max_samples;

                if !closed {
                    return None;
                }

                if voiced >= self.min_speech_samples {
                    tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                    let utterance = std::mem::take(&mut self.speech_buffer);
                    self.reset();
                    Some(utterance)
                } else {
                    tracing::trace!("speech too short, resetting");
                    self.reset();
                    None
                }
            }
        }
    }

    /// Reset to idle
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }
}

/// Streaming recognizer backed by a cloud transcription API
pub struct CloudRecognizer {
    stt: Arc<SpeechToText>,
    segmenter: EnergySegmenter,
    results_tx: mpsc::UnboundedSender<Result<String>>,
    results_rx: mpsc::UnboundedReceiver<Result<String>>,
    /// Failure held back so transcripts received before it are delivered first
    deferred_error: Option<Error>,
}

impl CloudRecognizer {
    /// Create a recognizer
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(
        provider: SttProvider,
        api_key: Option<SecretString>,
        model: String,
        segmenter: EnergySegmenter,
    ) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config(format!("{provider:?} API key required")))?;

        let (results_tx, results_rx) = mpsc::unbounded_channel();

        tracing::debug!(?provider, model, "cloud recognizer initialized");

        Ok(Self {
            stt: Arc::new(SpeechToText {
                client: reqwest::Client::new(),
                api_key,
                model,
                provider,
            }),
            segmenter,
            results_tx,
            results_rx,
            deferred_error: None,
        })
    }
}

#[async_trait]
impl StreamingRecognizer for CloudRecognizer {
    async fn feed(&mut self, chunk: &AudioChunk) -> Result<()> {
        let segment = AudioSegment::from_chunks(std::slice::from_ref(chunk), chunk.format());
        let Some(utterance) = self.segmenter.process(&segment.to_mono_f32()) else {
            return Ok(());
        };

        let wav = samples_to_wav(&utterance, chunk.format().sample_rate)?;
        let stt = Arc::clone(&self.stt);
        let tx = self.results_tx.clone();

        tokio::spawn(async move {
            let _ = tx.send(stt.transcribe(wav).await);
        });

        Ok(())
    }

    async fn poll(&mut self) -> Result<Vec<TranscriptEvent>> {
        if let Some(e) = self.deferred_error.take() {
            return Err(e);
        }

        let mut events = Vec::new();

        while let Ok(result) = self.results_rx.try_recv() {
            let error = match result {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        tracing::debug!(transcript = %text, "transcription complete");
                        events.push(TranscriptEvent::final_text(text));
                    }
                    continue;
                }
                Err(e @ Error::Recognizer(_)) => e,
                Err(e) => Error::Recognizer(e.to_string()),
            };

            if events.is_empty() {
                return Err(error);
            }
            tracing::debug!(
                delivered = events.len(),
                "transcription failed, reporting after earlier transcripts"
            );
            self.deferred_error = Some(error);
            break;
        }

        Ok(events)
    }

    fn reset(&mut self) {
        self.segmenter.reset();
        self.deferred_error = None;
    }
}
