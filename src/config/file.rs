//! TOML configuration file loading
//!
//! Supports `~/.config/voice-gate/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::voice::SttProvider;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GateConfigFile {
    /// Capture settings
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Wake/end phrases and session timing
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Spoken phrase → canonical command name; replaces the default table
    #[serde(default)]
    pub vocabulary: Option<BTreeMap<String, String>>,

    /// Speaker verification
    #[serde(default)]
    pub verification: VerificationFileConfig,

    /// Speech recognition
    #[serde(default)]
    pub recognizer: RecognizerFileConfig,

    /// Actuator link
    #[serde(default)]
    pub actuator: ActuatorFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// JSON lines file receiving every dispatch record
    pub audit_log: Option<String>,
}

/// Capture settings
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Frames per captured chunk
    pub chunk_frames: Option<usize>,
    /// Chunks held between capture and the controller before the oldest drop
    pub queue_capacity: Option<usize>,
}

/// Session configuration, durations in seconds
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub wake_phrase: Option<String>,
    pub end_phrase: Option<String>,
    pub pre_roll_secs: Option<f64>,
    pub post_roll_secs: Option<f64>,
    pub min_accept_secs: Option<f64>,
    pub max_segment_secs: Option<f64>,
    pub cooldown_secs: Option<f64>,
    pub inter_session_gap_secs: Option<f64>,
    pub session_timeout_secs: Option<f64>,
}

/// Speaker verification configuration
#[derive(Debug, Default, Deserialize)]
pub struct VerificationFileConfig {
    /// Enrolled speaker recording
    pub reference_voice: Option<String>,
    /// Scores at or above this accept
    pub threshold: Option<f32>,
    /// Normalised audio is padded with silence to at least this, in seconds
    pub min_verify_secs: Option<f64>,
    /// Concurrent verification jobs
    pub workers: Option<usize>,
    pub trim_top_db: Option<f32>,
    pub target_rms: Option<f32>,
    pub target_sample_rate: Option<u32>,
    /// Scoring service endpoint
    pub verifier_url: Option<String>,
}

/// Speech recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct RecognizerFileConfig {
    pub provider: Option<SttProvider>,
    /// Transcription model (e.g. "whisper-1", "nova-2")
    pub model: Option<String>,
    /// RMS level that counts as speech
    pub energy_threshold: Option<f32>,
    pub silence_secs: Option<f32>,
    pub min_speech_secs: Option<f32>,
}

/// Actuator configuration
#[derive(Debug, Default, Deserialize)]
pub struct ActuatorFileConfig {
    /// Serial device node (e.g. "/dev/ttyACM0")
    pub port: Option<String>,
    /// Serial line speed (default 9600)
    pub baud: Option<u32>,
    /// Wait after opening the port, in seconds (default 2)
    pub boot_delay_secs: Option<f64>,
    /// Log commands instead of sending them
    pub simulate: Option<bool>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
}

/// Load a TOML config file
///
/// A missing file at the default location yields defaults; a missing file
/// that was asked for explicitly is an error.
///
/// # Errors
///
/// Returns error if the file can't be read or doesn't parse
pub fn load_config_file(path: &Path, explicit: bool) -> Result<GateConfigFile> {
    if !path.exists() {
        if explicit {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(GateConfigFile::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "failed to parse config file");
        Error::Toml(e)
    })?;

    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/voice-gate/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-gate").join("config.toml"))
}
