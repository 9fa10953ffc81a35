//! Transcript classification
//!
//! Turns recognizer text into wake/end signals and canonical commands.

use super::{Command, Vocabulary};

/// Result of classifying one transcript
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Transcript contains the wake phrase
    pub is_wake: bool,
    /// Transcript contains the end phrase
    pub is_end: bool,
    /// Commands in order of first appearance, each at most once
    pub commands: Vec<Command>,
}

/// Maps transcripts onto the command vocabulary
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    wake_phrase: Vec<String>,
    end_phrase: Vec<String>,
    /// Tokenised vocabulary, longest phrase first
    phrases: Vec<(Vec<String>, Command)>,
}

impl CommandExtractor {
    /// Create an extractor for the given wake/end phrases and vocabulary
    #[must_use]
    pub fn new(wake_phrase: &str, end_phrase: &str, vocabulary: &Vocabulary) -> Self {
        let mut phrases: Vec<(Vec<String>, Command)> = vocabulary
            .iter()
            .map(|(phrase, command)| (normalize_tokens(phrase), command))
            .collect();
        phrases.sort_by_key(|(phrase, _)| std::cmp::Reverse(phrase.len()));

        let extractor = Self {
            wake_phrase: normalize_tokens(wake_phrase),
            end_phrase: normalize_tokens(end_phrase),
            phrases,
        };

        tracing::debug!(
            wake = ?extractor.wake_phrase,
            end = ?extractor.end_phrase,
            phrases = extractor.phrases.len(),
            "command extractor initialized"
        );

        extractor
    }

    /// Classify a transcript
    ///
    /// Wake and end detection win over commands: a transcript carrying either
    /// phrase never yields command candidates.
    #[must_use]
    pub fn classify(&self, text: &str) -> Classification {
        let tokens = normalize_tokens(text);
        if tokens.is_empty() {
            return Classification::default();
        }

        let is_wake = contains_run(&tokens, &self.wake_phrase);
        let is_end = contains_run(&tokens, &self.end_phrase);
        if is_wake || is_end {
            return Classification {
                is_wake,
                is_end,
                commands: Vec::new(),
            };
        }

        Classification {
            is_wake,
            is_end,
            commands: self.extract_commands(&tokens),
        }
    }

    fn extract_commands(&self, tokens: &[String]) -> Vec<Command> {
        let mut commands = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            let matched = self
                .phrases
                .iter()
                .find(|(phrase, _)| tokens[i..].starts_with(phrase));

            if let Some((phrase, command)) = matched {
                if !commands.contains(command) {
                    commands.push(*command);
                }
                i += phrase.len();
            } else {
                i += 1;
            }
        }

        commands
    }
}

/// Lowercase, split on whitespace and strip surrounding punctuation
#[must_use]
pub fn normalize_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whether `needle` appears as a contiguous run in `haystack`
fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}
