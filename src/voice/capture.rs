//! Audio capture from microphone

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig};

use super::{AudioChunk, AudioFormat, ChunkSink};
use crate::{Error, Result};

/// Source of fixed-size PCM chunks delivered in near real time
pub trait AudioSource {
    /// Start delivering chunks into `sink`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if the device cannot be started
    fn start(&mut self, sink: ChunkSink) -> Result<()>;

    /// Stop delivering chunks
    fn stop(&mut self);
}

/// Captures audio from the default input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    format: AudioFormat,
    chunk_frames: usize,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if no device supports `format` as f32 samples
    pub fn new(format: AudioFormat, chunk_frames: usize) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Capture("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Capture(e.to_string()))?
            .find(|c| {
                c.channels() == format.channels
                    && c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(format.sample_rate)
                    && c.max_sample_rate() >= SampleRate(format.sample_rate)
            })
            .ok_or_else(|| Error::Capture("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(format.sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            channels = config.channels,
            chunk_frames,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            format,
            chunk_frames: chunk_frames.max(1),
            stream: None,
        })
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Captured audio format
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }
}

impl AudioSource for AudioCapture {
    fn start(&mut self, sink: ChunkSink) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let format = self.format;
        let chunk_samples = self.chunk_frames * usize::from(format.channels.max(1));
        let mut pending: Vec<f32> = Vec::with_capacity(chunk_samples);
        let data_sink = sink.clone();

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut rest = data;
                    while !rest.is_empty() {
                        let take = (chunk_samples - pending.len()).min(rest.len());
                        pending.extend_from_slice(&rest[..take]);
                        rest = &rest[take..];

                        if pending.len() == chunk_samples {
                            data_sink.push(AudioChunk::from_f32(&pending, format));
                            pending.clear();
                        }
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    sink.fail(Error::Capture(err.to_string()));
                },
                None,
            )
            .map_err(|e| Error::Capture(e.to_string()))?;

        stream.play().map_err(|e| Error::Capture(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
