//! PCM audio chunks and segments

use std::sync::Arc;
use std::time::Duration;

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Shape of interleaved signed 16-bit PCM audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl AudioFormat {
    /// Create a format
    #[must_use]
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Single channel at the given rate
    #[must_use]
    pub const fn mono(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1)
    }

    /// Number of whole frames covering `duration`
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn frames_in(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * f64::from(self.sample_rate)).round() as usize
    }

    /// Duration of `frames` frames
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }

    fn channel_count(self) -> usize {
        usize::from(self.channels.max(1))
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono(SAMPLE_RATE)
    }
}

/// One immutable block of captured audio
///
/// Cloning is cheap: the samples are shared.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    samples: Arc<[i16]>,
    format: AudioFormat,
}

impl AudioChunk {
    /// Wrap interleaved samples
    #[must_use]
    pub fn new(samples: Vec<i16>, format: AudioFormat) -> Self {
        Self {
            samples: samples.into(),
            format,
        }
    }

    /// Convert f32 samples in [-1.0, 1.0] to a chunk
    #[must_use]
    pub fn from_f32(samples: &[f32], format: AudioFormat) -> Self {
        Self::new(samples.iter().copied().map(f32_to_i16).collect(), format)
    }

    /// Interleaved samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Audio format
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    /// Number of frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channel_count()
    }

    /// Playback duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.frames())
    }

    /// Whether `other` is a clone of this same captured chunk
    #[must_use]
    pub fn is_same_capture(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

/// Growable run of audio accumulated during a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioSegment {
    samples: Vec<i16>,
    format: AudioFormat,
}

impl AudioSegment {
    /// Empty segment in the given format
    #[must_use]
    pub const fn new(format: AudioFormat) -> Self {
        Self {
            samples: Vec::new(),
            format,
        }
    }

    /// Segment holding already-interleaved samples
    #[must_use]
    pub const fn from_samples(samples: Vec<i16>, format: AudioFormat) -> Self {
        Self { samples, format }
    }

    /// Concatenate chunks into one segment
    #[must_use]
    pub fn from_chunks(chunks: &[AudioChunk], format: AudioFormat) -> Self {
        let mut segment = Self::new(format);
        for chunk in chunks {
            segment.push(chunk);
        }
        segment
    }

    /// Append a chunk
    pub fn push(&mut self, chunk: &AudioChunk) {
        self.samples.extend_from_slice(chunk.samples());
    }

    /// Drop the oldest audio so at most `max_frames` frames remain
    pub fn keep_latest(&mut self, max_frames: usize) {
        let max_samples = max_frames * self.format.channel_count();
        if self.samples.len() > max_samples {
            let excess = self.samples.len() - max_samples;
            self.samples.drain(..excess);
        }
    }

    /// Move the contents out, leaving an empty segment of the same format
    pub fn take(&mut self) -> Self {
        Self {
            samples: std::mem::take(&mut self.samples),
            format: self.format,
        }
    }

    /// Interleaved samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Audio format
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    /// Number of frames
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channel_count()
    }

    /// Playback duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.frames())
    }

    /// Whether the segment holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Average channels into mono f32 samples in [-1.0, 1.0]
    #[must_use]
    pub fn to_mono_f32(&self) -> Vec<f32> {
        let channels = self.format.channel_count();
        #[allow(clippy::cast_precision_loss)]
        let divisor = channels as f32;
        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().map(|&s| i16_to_f32(s)).sum::<f32>() / divisor)
            .collect()
    }
}

/// Convert f32 [-1.0, 1.0] to i16
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Convert i16 to f32 [-1.0, 1.0]
#[must_use]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}
