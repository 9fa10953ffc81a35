//! Voice processing module
//!
//! Handles audio capture, the pre-roll buffer, the capture → controller
//! queue, speech recognition and normalisation ahead of verification.

mod buffer;
mod capture;
mod chunk;
pub mod normalize;
mod queue;
mod recognizer;
mod stt;
mod wav;

pub use buffer::{RollingBuffer, SharedRollingBuffer};
pub use capture::{AudioCapture, AudioSource};
pub use chunk::{AudioChunk, AudioFormat, AudioSegment, SAMPLE_RATE, f32_to_i16, i16_to_f32};
pub use normalize::{AudioNormalizer, LoudnessNormalizer, NormalizedAudio};
pub use queue::{CaptureErrors, ChunkReceiver, ChunkSink, chunk_channel};
pub use recognizer::{StreamingRecognizer, TranscriptEvent};
pub use stt::{CloudRecognizer, EnergySegmenter, SegmenterState, SttProvider};
pub use wav::{read_wav, samples_to_wav};
