//! Audio normalisation ahead of speaker verification
//!
//! Resamples to the verifier's rate, trims leading/trailing silence, pads
//! short utterances with silence and scales to a target RMS level so scores
//! don't depend on microphone gain.

use std::time::Duration;

use rubato::{FftFixedIn, Resampler};

use super::{AudioFormat, AudioSegment};
use crate::{Error, Result};

/// Frame length used for silence trimming
const TRIM_FRAME: usize = 2048;

/// Hop between trimming frames
const TRIM_HOP: usize = 512;

/// Input block size fed to the resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Floor added under the RMS square root
const RMS_EPSILON: f32 = 1e-12;

/// Mono f32 audio ready for scoring
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedAudio {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate of `samples`
    pub sample_rate: u32,
}

impl NormalizedAudio {
    /// Playback duration
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Prepares a captured segment for the speaker verifier
pub trait AudioNormalizer: Send + Sync {
    /// Normalise a segment
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be processed
    fn normalize(&self, segment: &AudioSegment) -> Result<NormalizedAudio>;
}

/// Resample, trim, pad and loudness-normalise
#[derive(Debug, Clone)]
pub struct LoudnessNormalizer {
    target_sample_rate: u32,
    trim_top_db: f32,
    target_rms: f32,
    min_duration: Duration,
}

impl LoudnessNormalizer {
    /// Create a normaliser
    ///
    /// * `trim_top_db` - frames quieter than the loudest frame by more than
    ///   this many decibels count as silence
    /// * `target_rms` - output RMS level
    #[must_use]
    pub const fn new(target_sample_rate: u32, trim_top_db: f32, target_rms: f32) -> Self {
        Self {
            target_sample_rate,
            trim_top_db,
            target_rms,
            min_duration: Duration::ZERO,
        }
    }

    /// Pad trimmed audio with silence, split evenly on both sides, up to
    /// `min_duration`
    #[must_use]
    pub const fn with_min_duration(mut self, min_duration: Duration) -> Self {
        self.min_duration = min_duration;
        self
    }

    fn resample(&self, input: Vec<f32>, from_rate: u32) -> Result<Vec<f32>> {
        if from_rate == self.target_sample_rate || input.is_empty() {
            return Ok(input);
        }

        let mut resampler = FftFixedIn::<f32>::new(
            from_rate as usize,
            self.target_sample_rate as usize,
            RESAMPLE_CHUNK,
            2,
            1,
        )
        .map_err(|e| Error::Audio(format!("resampler setup failed: {e}")))?;

        #[allow(clippy::cast_possible_truncation)]
        let expected = (input.len() as u64 * u64::from(self.target_sample_rate)
            / u64::from(from_rate.max(1))) as usize;
        let mut output = Vec::with_capacity(expected + RESAMPLE_CHUNK);
        let mut pos = 0;

        while pos < input.len() {
            let needed = resampler.input_frames_next();
            let end = (pos + needed).min(input.len());
            let mut block = input[pos..end].to_vec();
            block.resize(needed, 0.0);

            let mut processed = resampler
                .process(&[block], None)
                .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
            output.extend(processed.pop().unwrap_or_default());
            pos += needed;
        }

        output.truncate(expected);
        Ok(output)
    }
}

impl AudioNormalizer for LoudnessNormalizer {
    fn normalize(&self, segment: &AudioSegment) -> Result<NormalizedAudio> {
        let mono = segment.to_mono_f32();
        let resampled = self.resample(mono, segment.format().sample_rate)?;
        let trimmed = trim_silence(&resampled, self.trim_top_db);
        let min_frames = AudioFormat::mono(self.target_sample_rate).frames_in(self.min_duration);
        let padded = pad_centered(trimmed, min_frames);
        let samples = scale_to_rms(&padded, self.target_rms);

        tracing::trace!(
            input_frames = segment.frames(),
            output_frames = samples.len(),
            "segment normalized"
        );

        Ok(NormalizedAudio {
            samples,
            sample_rate: self.target_sample_rate,
        })
    }
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Drop leading and trailing frames more than `top_db` below the loudest frame
#[must_use]
pub fn trim_silence(samples: &[f32], top_db: f32) -> &[f32] {
    if samples.is_empty() {
        return samples;
    }

    let frame_starts: Vec<usize> = (0..samples.len()).step_by(TRIM_HOP).collect();
    let levels: Vec<f32> = frame_starts
        .iter()
        .map(|&start| calculate_rms(&samples[start..(start + TRIM_FRAME).min(samples.len())]))
        .collect();

    let peak = levels.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return &samples[..0];
    }

    let floor = peak * 10f32.powf(-top_db / 20.0);
    let loud = |level: &f32| *level >= floor;

    let (Some(first), Some(last)) = (levels.iter().position(loud), levels.iter().rposition(loud))
    else {
        return &samples[..0];
    };

    let start = frame_starts[first];
    let end = (frame_starts[last] + TRIM_FRAME).min(samples.len());
    &samples[start..end]
}

/// Surround `samples` with zeros up to `min_len`, the extra half-sample going
/// to the right
///
/// Empty input stays empty.
#[must_use]
pub fn pad_centered(samples: &[f32], min_len: usize) -> Vec<f32> {
    if samples.is_empty() || samples.len() >= min_len {
        return samples.to_vec();
    }

    let need = min_len - samples.len();
    let left = need / 2;
    let mut padded = vec![0.0f32; min_len];
    padded[left..left + samples.len()].copy_from_slice(samples);
    padded
}

/// Scale to `target_rms`, clipping to [-1.0, 1.0]
#[must_use]
pub fn scale_to_rms(samples: &[f32], target_rms: f32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let rms = (calculate_rms(samples).powi(2) + RMS_EPSILON).sqrt();
    let gain = target_rms / rms;
    samples.iter().map(|s| (s * gain).clamp(-1.0, 1.0)).collect()
}
