//! Voice pipeline integration tests
//!
//! Tests audio components without requiring audio hardware

use std::io::Cursor;
use std::time::Duration;

use voice_gate::voice::normalize::calculate_rms;
use voice_gate::voice::{
    AudioChunk, AudioFormat, AudioNormalizer, AudioSegment, EnergySegmenter, LoudnessNormalizer,
    RollingBuffer, SegmenterState, SharedRollingBuffer, chunk_channel, read_wav, samples_to_wav,
};
use voice_gate::{Command, CommandExtractor, Vocabulary};

mod common;

use common::{CHUNK, RATE, dc_chunk, format, generate_silence, generate_sine_samples};

fn segmenter() -> EnergySegmenter {
    EnergySegmenter::new(RATE, 0.01, 0.3, 0.5)
}

/// Feed in 100ms blocks, returning the first completed utterance
fn feed(segmenter: &mut EnergySegmenter, samples: &[f32]) -> Option<Vec<f32>> {
    samples
        .chunks(CHUNK)
        .find_map(|block| segmenter.process(block))
}

#[test]
fn test_segmenter_starts_idle() {
    let segmenter = segmenter();
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_segmenter_ignores_silence() {
    let mut segmenter = segmenter();

    assert!(feed(&mut segmenter, &generate_silence(2.0)).is_none());
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_segmenter_speech_then_silence() {
    let mut segmenter = segmenter();

    assert!(feed(&mut segmenter, &generate_sine_samples(440.0, 1.0, 0.5)).is_none());
    assert_eq!(segmenter.state(), SegmenterState::Listening);

    let utterance = feed(&mut segmenter, &generate_silence(0.5)).unwrap();
    // Speech plus the trailing silence that closed it
    assert_eq!(utterance.len(), 24000);
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_segmenter_discards_short_burst() {
    let mut segmenter = segmenter();

    let mut audio = generate_sine_samples(440.0, 0.2, 0.5);
    audio.extend(generate_silence(0.6));

    assert!(feed(&mut segmenter, &audio).is_none());
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_segmenter_reset() {
    let mut segmenter = segmenter();

    feed(&mut segmenter, &generate_sine_samples(440.0, 0.5, 0.5));
    assert_eq!(segmenter.state(), SegmenterState::Listening);

    segmenter.reset();
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_samples_to_wav_header() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, RATE).unwrap();

    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    let reader = hound::WavReader::new(Cursor::new(wav_data)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, samples.len());
}

#[test]
fn test_reference_wav_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reference.wav");

    let samples = generate_sine_samples(220.0, 0.5, 0.25);
    std::fs::write(&path, samples_to_wav(&samples, RATE).unwrap()).unwrap();

    let segment = read_wav(&path).unwrap();
    assert_eq!(segment.format(), format());
    assert_eq!(segment.frames(), samples.len());
    assert_eq!(segment.duration(), Duration::from_millis(500));
}

#[test]
fn test_read_wav_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(read_wav(&dir.path().join("nope.wav")).is_err());
}

#[test]
fn test_rolling_buffer_keeps_latest_window() {
    let mut buffer = RollingBuffer::new(Duration::from_millis(300), format());

    for value in 1..=5 {
        buffer.append(dc_chunk(CHUNK, value));
    }

    assert_eq!(buffer.frames(), 3 * CHUNK);
    assert_eq!(buffer.duration(), Duration::from_millis(300));
    let firsts: Vec<i16> = buffer.snapshot().iter().map(|c| c.samples()[0]).collect();
    assert_eq!(firsts, vec![3, 4, 5]);
}

#[test]
fn test_rolling_buffer_zero_window_stays_empty() {
    let mut buffer = RollingBuffer::new(Duration::ZERO, format());
    buffer.append(dc_chunk(CHUNK, 1));

    assert!(buffer.is_empty());
    assert!(buffer.snapshot_segment().is_empty());
}

#[test]
fn test_chunk_queue_drops_oldest_when_full() {
    let rolling = SharedRollingBuffer::new(Duration::from_millis(200), format());
    let (sink, mut chunks, _errors) = chunk_channel(2, rolling.clone());

    for value in 1..=5 {
        sink.push(dc_chunk(CHUNK, value));
    }

    let received: Vec<i16> = std::iter::from_fn(|| chunks.try_recv())
        .map(|c| c.samples()[0])
        .collect();
    assert_eq!(received, vec![4, 5]);
    assert_eq!(chunks.dropped(), 3);

    // The rolling buffer sees every chunk regardless
    let pre_roll = rolling.snapshot_segment();
    assert_eq!(pre_roll.frames(), 2 * CHUNK);
    assert_eq!(pre_roll.samples()[0], 4);
}

#[tokio::test]
async fn test_chunk_queue_closes_with_sink() {
    let rolling = SharedRollingBuffer::new(Duration::ZERO, format());
    let (sink, mut chunks, _errors) = chunk_channel(4, rolling);

    sink.push(dc_chunk(CHUNK, 7));
    drop(sink);

    assert_eq!(chunks.recv().await.unwrap().samples()[0], 7);
    assert!(chunks.recv().await.is_none());
}

#[test]
fn test_stereo_chunk_downmix() {
    let stereo = AudioFormat::new(RATE, 2);
    let chunk = AudioChunk::new(vec![16384, 0, -16384, 0], stereo);
    let segment = AudioSegment::from_chunks(&[chunk], stereo);

    assert_eq!(segment.frames(), 2);
    let mono = segment.to_mono_f32();
    assert!((mono[0] - 0.25).abs() < 1e-4);
    assert!((mono[1] + 0.25).abs() < 1e-4);
}

#[test]
fn test_extractor_with_default_vocabulary() {
    let extractor = CommandExtractor::new("hey robot", "over and out", &Vocabulary::default());

    assert!(extractor.classify("Hey, robot!").is_wake);
    assert!(extractor.classify("ok over and out").is_end);
    assert_eq!(
        extractor.classify("go forward, then LEFT").commands,
        vec![Command::Forward, Command::Left]
    );
    assert!(extractor.classify("hey robot go left").commands.is_empty());
    assert!(extractor.classify("").commands.is_empty());
}

#[test]
fn test_normalizer_resamples_and_levels() {
    let capture = AudioFormat::mono(48000);
    let samples: Vec<i16> = generate_sine_samples(300.0, 3.0, 0.8)
        .into_iter()
        .map(voice_gate::voice::f32_to_i16)
        .collect();
    // generate_sine_samples is 16 kHz; reinterpreted at 48 kHz it is a 1s tone
    let segment = AudioSegment::from_samples(samples, capture);

    let normalizer = LoudnessNormalizer::new(RATE, 60.0, 0.1);
    let normalized = normalizer.normalize(&segment).unwrap();

    assert_eq!(normalized.sample_rate, RATE);
    assert!(normalized.samples.len() <= 16000);
    assert!(normalized.samples.len() > 14000);
    assert!((calculate_rms(&normalized.samples) - 0.1).abs() < 1e-3);
}

#[test]
fn test_normalizer_trims_surrounding_silence() {
    let mut audio = generate_silence(1.0);
    audio.extend(generate_sine_samples(440.0, 1.0, 0.5));
    audio.extend(generate_silence(1.0));
    let samples = audio.into_iter().map(voice_gate::voice::f32_to_i16).collect();
    let segment = AudioSegment::from_samples(samples, format());

    let normalizer = LoudnessNormalizer::new(RATE, 40.0, 0.1);
    let normalized = normalizer.normalize(&segment).unwrap();

    // Within a trimming frame of the tone on either side
    assert!(normalized.samples.len() >= 16000);
    assert!(normalized.samples.len() <= 16000 + 2 * 2048);
    assert!((normalized.duration().as_secs_f32() - 1.0).abs() < 0.3);
}

#[test]
fn test_normalizer_all_silence_is_empty() {
    let segment = AudioSegment::from_samples(vec![0; 16000], format());
    let normalizer = LoudnessNormalizer::new(RATE, 60.0, 0.1);

    assert!(normalizer.normalize(&segment).unwrap().samples.is_empty());
}
