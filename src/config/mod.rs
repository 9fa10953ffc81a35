//! Configuration management for the voice gate
//!
//! Values come from, in priority order: environment variables, the TOML file
//! (see [`file`]), then built-in defaults.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::command::{Command, Vocabulary};
use crate::session::SessionSettings;
use crate::voice::{AudioFormat, SAMPLE_RATE, SttProvider};
use crate::{Error, Result};

use file::GateConfigFile;

/// Resolved voice gate configuration
#[derive(Debug)]
pub struct Config {
    /// Capture settings
    pub audio: AudioConfig,

    /// Phrase that opens a session
    /// Set via `VOICE_GATE_WAKE_PHRASE` env var
    pub wake_phrase: String,

    /// Phrase that closes a session
    /// Set via `VOICE_GATE_END_PHRASE` env var
    pub end_phrase: String,

    /// Session timing and cooldown
    pub session: SessionSettings,

    /// Spoken phrase → command table
    pub vocabulary: Vocabulary,

    /// Speaker verification
    pub verification: VerificationConfig,

    /// Speech recognition
    pub recognizer: RecognizerConfig,

    /// Actuator link
    pub actuator: ActuatorConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// JSON lines audit file
    pub audit_log: Option<PathBuf>,
}

/// Capture configuration
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    /// Captured sample format
    pub format: AudioFormat,
    /// Frames per chunk
    pub chunk_frames: usize,
    /// Chunk queue capacity
    pub queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::mono(SAMPLE_RATE),
            chunk_frames: 4000,
            queue_capacity: 32,
        }
    }
}

/// Speaker verification configuration
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Enrolled speaker WAV
    pub reference_voice: PathBuf,
    /// Acceptance threshold
    pub threshold: f32,
    /// Normalised audio is padded with silence to at least this
    pub min_verify: Duration,
    /// Concurrent jobs
    pub workers: usize,
    /// Silence trimming level below peak
    pub trim_top_db: f32,
    /// Loudness target
    pub target_rms: f32,
    /// Rate the verifier expects
    pub target_sample_rate: u32,
    /// Scoring service endpoint
    /// Set via `VOICE_GATE_VERIFIER_URL` env var
    pub verifier_url: Option<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            reference_voice: PathBuf::from("refVoice.wav"),
            threshold: 0.25,
            min_verify: Duration::from_millis(1800),
            workers: 2,
            trim_top_db: 25.0,
            target_rms: 0.1,
            target_sample_rate: 16000,
            verifier_url: None,
        }
    }
}

/// Speech recognition configuration
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// Transcription backend
    pub provider: SttProvider,
    /// Transcription model
    pub model: String,
    /// RMS level that counts as speech
    pub energy_threshold: f32,
    /// Trailing silence that ends an utterance, in seconds
    pub silence_secs: f32,
    /// Shortest utterance sent for transcription, in seconds
    pub min_speech_secs: f32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            provider: SttProvider::Whisper,
            model: default_model(SttProvider::Whisper).to_string(),
            energy_threshold: 0.03,
            silence_secs: 0.5,
            min_speech_secs: 0.3,
        }
    }
}

const fn default_model(provider: SttProvider) -> &'static str {
    match provider {
        SttProvider::Whisper => "whisper-1",
        SttProvider::Deepgram => "nova-2",
    }
}

/// Actuator configuration
#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    /// Serial device node
    /// Set via `VOICE_GATE_ACTUATOR_PORT` env var
    pub port: Option<PathBuf>,
    /// Serial line speed
    pub baud: u32,
    /// Wait after opening the port while the board resets
    pub boot_delay: Duration,
    /// Log commands instead of sending them
    pub simulate: bool,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 9600,
            boot_delay: Duration::from_secs(2),
            simulate: false,
        }
    }
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    pub openai: Option<SecretString>,
    pub deepgram: Option<SecretString>,
}

impl ApiKeys {
    /// Take the key the given STT provider needs
    pub fn take_for(&mut self, provider: SttProvider) -> Option<SecretString> {
        match provider {
            SttProvider::Whisper => self.openai.take(),
            SttProvider::Deepgram => self.deepgram.take(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            wake_phrase: "alexa".to_string(),
            end_phrase: "go".to_string(),
            session: SessionSettings::default(),
            vocabulary: Vocabulary::default(),
            verification: VerificationConfig::default(),
            recognizer: RecognizerConfig::default(),
            actuator: ActuatorConfig::default(),
            api_keys: ApiKeys::default(),
            audit_log: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// `path` overrides the default file location.
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable or the result fails validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => file::load_config_file(path, true)?,
            None => match file::config_file_path() {
                Some(path) => file::load_config_file(&path, false)?,
                None => GateConfigFile::default(),
            },
        };

        let config = Self::resolve(file, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Merge a parsed file and environment lookups over the defaults
    ///
    /// # Errors
    ///
    /// Returns error for unknown commands, empty phrases or invalid durations
    pub fn resolve(fc: GateConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let default = Self::default();

        let audio = AudioConfig {
            format: AudioFormat::new(
                fc.audio.sample_rate.unwrap_or(default.audio.format.sample_rate),
                fc.audio.channels.unwrap_or(default.audio.format.channels),
            ),
            chunk_frames: fc.audio.chunk_frames.unwrap_or(default.audio.chunk_frames),
            queue_capacity: fc
                .audio
                .queue_capacity
                .unwrap_or(default.audio.queue_capacity),
        };

        let wake_phrase = env("VOICE_GATE_WAKE_PHRASE")
            .or(fc.session.wake_phrase)
            .unwrap_or(default.wake_phrase);
        let end_phrase = env("VOICE_GATE_END_PHRASE")
            .or(fc.session.end_phrase)
            .unwrap_or(default.end_phrase);

        let ds = default.session;
        let session = SessionSettings {
            pre_roll: secs("session.pre_roll_secs", fc.session.pre_roll_secs, ds.pre_roll)?,
            post_roll: secs("session.post_roll_secs", fc.session.post_roll_secs, ds.post_roll)?,
            min_accept: secs(
                "session.min_accept_secs",
                fc.session.min_accept_secs,
                ds.min_accept,
            )?,
            max_segment: secs(
                "session.max_segment_secs",
                fc.session.max_segment_secs,
                ds.max_segment,
            )?,
            cooldown: secs("session.cooldown_secs", fc.session.cooldown_secs, ds.cooldown)?,
            inter_session_gap: secs(
                "session.inter_session_gap_secs",
                fc.session.inter_session_gap_secs,
                ds.inter_session_gap,
            )?,
            session_timeout: secs(
                "session.session_timeout_secs",
                fc.session.session_timeout_secs,
                ds.session_timeout,
            )?,
        };

        let vocabulary = match fc.vocabulary {
            Some(table) => {
                let entries = table
                    .into_iter()
                    .map(|(phrase, name)| name.parse::<Command>().map(|c| (phrase, c)))
                    .collect::<Result<Vec<_>>>()?;
                Vocabulary::new(entries)?
            }
            None => default.vocabulary,
        };

        let dv = default.verification;
        let fv = fc.verification;
        let verification = VerificationConfig {
            reference_voice: fv
                .reference_voice
                .map_or(dv.reference_voice, PathBuf::from),
            threshold: fv.threshold.unwrap_or(dv.threshold),
            min_verify: secs("verification.min_verify_secs", fv.min_verify_secs, dv.min_verify)?,
            workers: fv.workers.unwrap_or(dv.workers),
            trim_top_db: fv.trim_top_db.unwrap_or(dv.trim_top_db),
            target_rms: fv.target_rms.unwrap_or(dv.target_rms),
            target_sample_rate: fv.target_sample_rate.unwrap_or(dv.target_sample_rate),
            verifier_url: env("VOICE_GATE_VERIFIER_URL").or(fv.verifier_url),
        };

        let dr = default.recognizer;
        let fr = fc.recognizer;
        let provider = fr.provider.unwrap_or(dr.provider);
        let recognizer = RecognizerConfig {
            provider,
            model: fr
                .model
                .unwrap_or_else(|| default_model(provider).to_string()),
            energy_threshold: fr.energy_threshold.unwrap_or(dr.energy_threshold),
            silence_secs: fr.silence_secs.unwrap_or(dr.silence_secs),
            min_speech_secs: fr.min_speech_secs.unwrap_or(dr.min_speech_secs),
        };

        let da = ActuatorConfig::default();
        let actuator = ActuatorConfig {
            port: env("VOICE_GATE_ACTUATOR_PORT")
                .or(fc.actuator.port)
                .map(PathBuf::from),
            baud: fc.actuator.baud.unwrap_or(da.baud),
            boot_delay: secs(
                "actuator.boot_delay_secs",
                fc.actuator.boot_delay_secs,
                da.boot_delay,
            )?,
            simulate: fc.actuator.simulate.unwrap_or(da.simulate),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            deepgram: env("DEEPGRAM_API_KEY")
                .or(fc.api_keys.deepgram)
                .map(SecretString::from),
        };

        Ok(Self {
            audio,
            wake_phrase,
            end_phrase,
            session,
            vocabulary,
            verification,
            recognizer,
            actuator,
            api_keys,
            audit_log: fc.audit_log.map(PathBuf::from),
        })
    }

    /// Check values that would make the pipeline misbehave
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::Config(msg.to_string()));

        if self.audio.format.sample_rate == 0 {
            return invalid("audio.sample_rate must be positive");
        }
        if self.audio.format.channels == 0 {
            return invalid("audio.channels must be positive");
        }
        if self.audio.chunk_frames == 0 {
            return invalid("audio.chunk_frames must be positive");
        }
        if self.audio.queue_capacity == 0 {
            return invalid("audio.queue_capacity must be positive");
        }
        if crate::command::normalize_tokens(&self.wake_phrase).is_empty() {
            return invalid("session.wake_phrase must not be empty");
        }
        if crate::command::normalize_tokens(&self.end_phrase).is_empty() {
            return invalid("session.end_phrase must not be empty");
        }
        if self.vocabulary.is_empty() {
            return invalid("vocabulary must name at least one phrase");
        }
        if !(-1.0..=1.0).contains(&self.verification.threshold) {
            return invalid("verification.threshold must be within [-1, 1]");
        }
        if self.verification.workers == 0 {
            return invalid("verification.workers must be positive");
        }
        if self.verification.target_sample_rate == 0 {
            return invalid("verification.target_sample_rate must be positive");
        }
        if self.verification.target_rms.is_nan() || self.verification.target_rms <= 0.0 {
            return invalid("verification.target_rms must be positive");
        }
        if self.actuator.baud == 0 {
            return invalid("actuator.baud must be positive");
        }
        Ok(())
    }
}

fn secs(key: &str, value: Option<f64>, default: Duration) -> Result<Duration> {
    value.map_or(Ok(default), |v| {
        Duration::try_from_secs_f64(v)
            .map_err(|_| Error::Config(format!("{key} must be a non-negative number, got {v}")))
    })
}
