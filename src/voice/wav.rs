//! WAV encoding and decoding

use std::path::Path;

use super::{AudioFormat, AudioSegment, f32_to_i16};
use crate::{Error, Result};

/// Convert mono f32 samples to WAV bytes for HTTP APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(f32_to_i16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Read a 16-bit integer or 32-bit float WAV file into a segment
///
/// # Errors
///
/// Returns error if the file is missing or in an unsupported format
pub fn read_wav(path: &Path) -> Result<AudioSegment> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| Error::Audio(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();
    let format = AudioFormat::new(spec.sample_rate, spec.channels);

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(f32_to_i16))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        (sample_format, bits) => {
            return Err(Error::Audio(format!(
                "{}: unsupported WAV format {sample_format:?} {bits}-bit",
                path.display()
            )));
        }
    };

    tracing::debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        samples = samples.len(),
        "loaded wav"
    );

    Ok(AudioSegment::from_samples(samples, format))
}
