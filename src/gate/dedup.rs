//! Session-scoped command deduplication

use indexmap::IndexSet;

use crate::command::Command;

/// Admits each distinct command once per session
///
/// A new session gets a new deduplicator; there is no other reset.
#[derive(Debug, Default)]
pub struct SessionDeduplicator {
    admitted: IndexSet<Command>,
}

impl SessionDeduplicator {
    /// Empty deduplicator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time `command` is seen, false afterwards
    pub fn admit(&mut self, command: Command) -> bool {
        self.admitted.insert(command)
    }

    /// Whether `command` has already been admitted
    #[must_use]
    pub fn contains(&self, command: Command) -> bool {
        self.admitted.contains(&command)
    }

    /// Admitted commands in first-admission order
    pub fn admitted(&self) -> impl Iterator<Item = Command> + '_ {
        self.admitted.iter().copied()
    }

    /// Number of admitted commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    /// Whether nothing has been admitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }
}
