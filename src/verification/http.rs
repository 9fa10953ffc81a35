//! Speaker verifier backed by an HTTP scoring service

use std::time::Duration;

use serde::Deserialize;
use tokio::runtime::Handle;

use super::{SpeakerVerifier, Voiceprint};
use crate::voice::{NormalizedAudio, samples_to_wav};
use crate::{Error, Result};

/// Request timeout for one scoring call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct ScoreResponse {
    score: f32,
}

/// Posts the reference and candidate recordings as WAV parts of a multipart
/// form and reads back `{"score": <f32>}`
///
/// `score` blocks on the runtime the verifier was created in, so it must be
/// called from a blocking thread (the verification pool always does).
pub struct HttpSpeakerVerifier {
    client: reqwest::Client,
    url: String,
    runtime: Handle,
}

impl HttpSpeakerVerifier {
    /// Create a verifier for the given endpoint
    ///
    /// # Errors
    ///
    /// Returns error if called outside a tokio runtime or the HTTP client
    /// cannot be built
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("speaker verifier needs a runtime: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Verification(format!("http client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            runtime,
        })
    }

    /// Scoring endpoint
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request_score(&self, candidate: &NormalizedAudio, reference: &Voiceprint) -> Result<f32> {
        let form = reqwest::multipart::Form::new()
            .part("reference", wav_part(reference.audio(), "reference")?)
            .part("candidate", wav_part(candidate, "candidate")?);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Verification(format!("scoring request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Verification(format!(
                "scoring service error {status}: {body}"
            )));
        }

        let result: ScoreResponse = response
            .json()
            .await
            .map_err(|e| Error::Verification(format!("bad scoring response: {e}")))?;

        tracing::debug!(score = result.score, "speaker scored");
        Ok(result.score)
    }
}

fn wav_part(audio: &NormalizedAudio, name: &str) -> Result<reqwest::multipart::Part> {
    let wav = samples_to_wav(&audio.samples, audio.sample_rate)?;
    reqwest::multipart::Part::bytes(wav)
        .file_name(format!("{name}.wav"))
        .mime_str("audio/wav")
        .map_err(|e| Error::Verification(e.to_string()))
}

impl SpeakerVerifier for HttpSpeakerVerifier {
    fn score(&self, candidate: &NormalizedAudio, reference: &Voiceprint) -> Result<f32> {
        self.runtime
            .block_on(self.request_score(candidate, reference))
    }
}
