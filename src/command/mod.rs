//! Canonical command vocabulary
//!
//! Spoken phrases map onto a closed set of [`Command`] variants. Anything the
//! vocabulary does not name is dropped rather than forwarded as raw text.

mod extractor;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use extractor::{Classification, CommandExtractor, normalize_tokens};

use crate::{Error, Result};

/// A command the actuator understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Move forward / power on
    Forward,
    /// Move backward
    Backward,
    /// Turn left
    Left,
    /// Turn right
    Right,
    /// Stop / power off
    Stop,
}

impl Command {
    /// Every command variant
    pub const ALL: [Self; 5] = [
        Self::Forward,
        Self::Backward,
        Self::Left,
        Self::Right,
        Self::Stop,
    ];

    /// Wire representation sent to the actuator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| Error::Config(format!("unknown command: {s}")))
    }
}

/// A command detected in a transcript, waiting for verification
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCandidate {
    /// Canonical command
    pub command: Command,
    /// Transcript text the command was found in
    pub source_text: String,
    /// When the transcript was classified
    pub detected_at: Instant,
}

/// Phrase → command lookup table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    entries: BTreeMap<String, Command>,
}

impl Vocabulary {
    /// Build a vocabulary from phrase/command pairs
    ///
    /// Phrases are normalised the same way transcripts are, so `"Turn  Left!"`
    /// and `"turn left"` are the same key.
    ///
    /// # Errors
    ///
    /// Returns error if a phrase normalises to nothing
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Command)>,
        S: AsRef<str>,
    {
        let mut map = BTreeMap::new();
        for (phrase, command) in entries {
            let tokens = normalize_tokens(phrase.as_ref());
            if tokens.is_empty() {
                return Err(Error::Config(format!(
                    "vocabulary phrase {:?} is empty",
                    phrase.as_ref()
                )));
            }
            map.insert(tokens.join(" "), command);
        }
        Ok(Self { entries: map })
    }

    /// Look up the command for an already-normalised phrase
    #[must_use]
    pub fn get(&self, phrase: &str) -> Option<Command> {
        self.entries.get(phrase).copied()
    }

    /// Iterate over `(phrase, command)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, Command)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), *c))
    }

    /// Number of phrases
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the vocabulary has no phrases
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        let entries = [
            ("on", Command::Forward),
            ("off", Command::Stop),
            ("of", Command::Stop),
            ("turn", Command::Forward),
            ("stop", Command::Stop),
            ("left", Command::Left),
            ("right", Command::Right),
            ("forward", Command::Forward),
            ("backward", Command::Backward),
        ];
        Self {
            entries: entries
                .into_iter()
                .map(|(p, c)| (p.to_string(), c))
                .collect(),
        }
    }
}
