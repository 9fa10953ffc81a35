//! Listening sessions
//!
//! A session opens on the wake phrase and closes on the end phrase, an idle
//! timeout, a recognizer failure or shutdown. While open, detected commands
//! collect into candidate segments that are verified and dispatched in
//! detection order by the [`SessionController`].

mod audit;
mod controller;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::command::{Command, CommandCandidate};
use crate::gate::SessionDeduplicator;
use crate::verification::VerificationResult;
use crate::voice::AudioSegment;

pub use audit::{AuditLog, DispatchOutcome, DispatchRecord};
pub use controller::SessionController;

/// Session timing, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Audio retained from before the wake phrase
    pub pre_roll: Duration,
    /// Audio required after the last new command before the segment closes
    pub post_roll: Duration,
    /// Shortest segment submitted for verification
    pub min_accept: Duration,
    /// Longest segment kept while no command is pending
    pub max_segment: Duration,
    /// Minimum interval between two fires of the same command
    pub cooldown: Duration,
    /// Wait after a session ends before a wake phrase is honoured again
    pub inter_session_gap: Duration,
    /// Idle time after which an open session closes
    pub session_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            pre_roll: Duration::from_millis(500),
            post_roll: Duration::ZERO,
            min_accept: Duration::from_millis(1500),
            max_segment: Duration::from_secs(10),
            cooldown: Duration::from_secs(1),
            inter_session_gap: Duration::from_millis(500),
            session_timeout: Duration::from_secs(30),
        }
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the wake phrase
    Idle,
    /// Session open, nothing being verified
    Armed,
    /// Session open with at least one verification job in flight
    AwaitingVerification,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::AwaitingVerification => "awaiting_verification",
        })
    }
}

/// Why a session closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    EndPhrase,
    Timeout,
    RecognizerFailure,
    Shutdown,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EndPhrase => "end_phrase",
            Self::Timeout => "timeout",
            Self::RecognizerFailure => "recognizer_failure",
            Self::Shutdown => "shutdown",
        })
    }
}

/// State of one open session, owned by the controller task
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    started_at: Instant,
    segment: AudioSegment,
    dedup: SessionDeduplicator,
    pending: Vec<CommandCandidate>,
    frames_since_command: usize,
    /// Commands already counted in the current recognizer utterance
    utterance_seen: HashSet<Command>,
    next_sequence: u64,
    /// Submitted jobs by sequence; `Some` once the result has arrived
    in_flight: BTreeMap<u64, Option<VerificationResult>>,
    last_activity: Instant,
}

impl Session {
    fn new(pre_roll: AudioSegment, now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: now,
            segment: pre_roll,
            dedup: SessionDeduplicator::new(),
            pending: Vec::new(),
            frames_since_command: 0,
            utterance_seen: HashSet::new(),
            next_sequence: 0,
            in_flight: BTreeMap::new(),
            last_activity: now,
        }
    }

    /// Session id
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Time the session has been open
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Audio accumulated since the last submitted job
    #[must_use]
    pub const fn segment(&self) -> &AudioSegment {
        &self.segment
    }

    /// Commands waiting for the utterance boundary
    #[must_use]
    pub fn pending(&self) -> &[CommandCandidate] {
        &self.pending
    }

    /// Commands dispatched so far, in order
    pub fn dispatched(&self) -> impl Iterator<Item = Command> + '_ {
        self.dedup.admitted()
    }

    /// Jobs submitted and not yet applied
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn phase(&self) -> Phase {
        if self.in_flight.is_empty() {
            Phase::Armed
        } else {
            Phase::AwaitingVerification
        }
    }

    /// Pop results that are next in submission order
    fn take_ready(&mut self) -> Vec<VerificationResult> {
        let mut ready = Vec::new();
        while let Some(entry) = self.in_flight.first_entry() {
            if entry.get().is_none() {
                break;
            }
            if let Some(result) = entry.remove() {
                ready.push(result);
            }
        }
        ready
    }
}
