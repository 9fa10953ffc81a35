//! Voice Gate - wake-word command gate with speaker verification
//!
//! This library provides the pieces of a voice-controlled actuator:
//! - Audio capture with a rolling pre-roll buffer
//! - Streaming speech recognition and command extraction
//! - Per-command cooldowns and session deduplication
//! - Speaker verification on a bounded worker pool
//! - Ordered dispatch to a serial actuator, with an audit trail
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   chunks   ┌──────────────────────────────────────┐
//! │ AudioCapture ├───────────►│          SessionController           │
//! │  (cpal cb)   │  (queue)   │  recognizer → extractor → session    │
//! └──────┬───────┘            └───────┬───────────────────┬──────────┘
//!        │ append                     │ jobs              │ accepted
//! ┌──────▼───────┐            ┌───────▼──────────┐  ┌─────▼──────────┐
//! │RollingBuffer │  snapshot  │ VerificationPool │  │ Cooldown/Dedup │
//! │  (pre-roll)  ├───────────►│ normalise, score │  │ → Actuator     │
//! └──────────────┘            └──────────────────┘  │ → AuditLog     │
//!                                                   └────────────────┘
//! ```

pub mod actuator;
pub mod command;
pub mod config;
pub mod daemon;
pub mod error;
pub mod gate;
pub mod session;
pub mod verification;
pub mod voice;

pub use actuator::{ActuatorGateway, SerialActuator, SimulatedActuator};
pub use command::{Command, CommandCandidate, CommandExtractor, Vocabulary};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use gate::{CooldownRegistry, SessionDeduplicator};
pub use session::{
    AuditLog, DispatchOutcome, DispatchRecord, Phase, SessionController, SessionEnd,
    SessionSettings,
};
pub use verification::{
    HttpSpeakerVerifier, SpeakerVerifier, VerificationJob, VerificationOutcome, VerificationPool,
    VerificationResult, Voiceprint,
};
