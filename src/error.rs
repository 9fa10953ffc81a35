//! Error types for the voice gate

use thiserror::Error;

/// Result type alias for voice gate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice gate
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device unavailable or stream failed (fatal to the process)
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech recognizer crashed or unreachable (ends the current session)
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// Speaker verification model call failed (rejects one job)
    #[error("verification error: {0}")]
    Verification(String),

    /// Actuator transmission failed (contained per command)
    #[error("actuator error: {0}")]
    Actuator(String),

    /// Audio processing error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error must tear down the whole process rather than a
    /// single session, job or command
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Capture(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(Error::Capture("unplugged".to_string()).is_fatal());
        assert!(Error::Config("bad".to_string()).is_fatal());
        assert!(!Error::Recognizer("timeout".to_string()).is_fatal());
        assert!(!Error::Actuator("busy".to_string()).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Verification("model offline".to_string());
        assert_eq!(err.to_string(), "verification error: model offline");
    }
}
