//! Dispatch audit trail

use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::Result;
use crate::command::Command;

/// Records kept in memory by default
pub const DEFAULT_HISTORY: usize = 1024;

/// What happened to one detected command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Written to the actuator
    Sent,
    /// Authenticated, but the actuator write failed
    SendFailed(String),
    /// The command fired too recently
    CooldownSuppressed,
    /// Already dispatched in this session
    Duplicate,
    /// Speaker verification rejected or failed
    Unauthenticated,
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => f.write_str("sent"),
            Self::SendFailed(reason) => write!(f, "send failed: {reason}"),
            Self::CooldownSuppressed => f.write_str("cooldown suppressed"),
            Self::Duplicate => f.write_str("duplicate"),
            Self::Unauthenticated => f.write_str("unauthenticated"),
        }
    }
}

/// One audit entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRecord {
    pub session_id: Uuid,
    pub command: Command,
    pub sent_at: DateTime<Utc>,
    /// Verification score, absent when the command never reached the verifier
    pub score: Option<f32>,
    pub outcome: DispatchOutcome,
}

/// Recent [`DispatchRecord`]s, optionally mirrored to a JSON lines file
///
/// Memory holds at most `history` records, oldest evicted first; the file
/// keeps everything.
#[derive(Debug)]
pub struct AuditLog {
    records: VecDeque<DispatchRecord>,
    history: usize,
    total: u64,
    total_sent: u64,
    file: Option<(PathBuf, File)>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self {
            records: VecDeque::new(),
            history: DEFAULT_HISTORY,
            total: 0,
            total_sent: 0,
            file: None,
        }
    }
}

impl AuditLog {
    /// In-memory log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `history` records in memory
    #[must_use]
    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history.max(1);
        while self.records.len() > self.history {
            self.records.pop_front();
        }
        self
    }

    /// Log that also appends each record to `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened for appending
    pub fn with_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!(path = %path.display(), "audit log opened");

        Ok(Self {
            file: Some((path.to_path_buf(), file)),
            ..Self::default()
        })
    }

    /// Append a record
    ///
    /// A failed file write is logged; the in-memory record is kept.
    pub fn record(&mut self, record: DispatchRecord) {
        match &record.outcome {
            DispatchOutcome::Sent => tracing::info!(
                session_id = %record.session_id,
                command = %record.command,
                score = ?record.score,
                "command dispatched"
            ),
            outcome => tracing::warn!(
                session_id = %record.session_id,
                command = %record.command,
                score = ?record.score,
                %outcome,
                "command not dispatched"
            ),
        }

        if let Some((path, file)) = &mut self.file {
            let written = serde_json::to_string(&record)
                .map_err(crate::Error::from)
                .and_then(|line| writeln!(file, "{line}").map_err(crate::Error::from));
            if let Err(e) = written {
                tracing::warn!(path = %path.display(), error = %e, "failed to write audit record");
            }
        }

        self.total += 1;
        if record.outcome == DispatchOutcome::Sent {
            self.total_sent += 1;
        }

        if self.records.len() == self.history {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Retained records, oldest first
    #[must_use]
    pub const fn records(&self) -> &VecDeque<DispatchRecord> {
        &self.records
    }

    /// Records ever appended, including evicted ones
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Commands ever sent, including evicted records
    #[must_use]
    pub const fn total_sent(&self) -> u64 {
        self.total_sent
    }

    /// Retained commands that reached the actuator, in send order
    #[must_use]
    pub fn sent(&self) -> Vec<Command> {
        self.records
            .iter()
            .filter(|r| r.outcome == DispatchOutcome::Sent)
            .map(|r| r.command)
            .collect()
    }

    /// Number of retained records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
