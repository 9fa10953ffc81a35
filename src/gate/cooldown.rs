//! Per-command re-trigger cooldown

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::command::Command;

/// Tracks when each command last fired
///
/// The check-and-set in [`CooldownRegistry::should_fire`] happens under one
/// lock, so two racing acceptances of the same command cannot both fire.
#[derive(Debug)]
pub struct CooldownRegistry {
    interval: Duration,
    last_fired: Mutex<HashMap<Command, Instant>>,
}

impl CooldownRegistry {
    /// Create a registry with the same minimum interval for every command
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Fire `command` at `now` if its cooldown has elapsed
    ///
    /// Returns true and records `now` when allowed, false (and records
    /// nothing) while the command is still cooling down.
    pub fn should_fire(&self, command: Command, now: Instant) -> bool {
        let Ok(mut last_fired) = self.last_fired.lock() else {
            tracing::error!(%command, "cooldown registry poisoned, refusing to fire");
            return false;
        };

        if last_fired
            .get(&command)
            .is_some_and(|&last| now.saturating_duration_since(last) < self.interval)
        {
            return false;
        }

        last_fired.insert(command, now);
        true
    }

    /// Whether `command` would be refused at `now`, without recording anything
    #[must_use]
    pub fn is_cooling_down(&self, command: Command, now: Instant) -> bool {
        !self.remaining(command, now).is_zero()
    }

    /// Time left before `command` may fire again
    #[must_use]
    pub fn remaining(&self, command: Command, now: Instant) -> Duration {
        self.last_fired
            .lock()
            .ok()
            .and_then(|m| m.get(&command).copied())
            .map_or(Duration::ZERO, |last| {
                self.interval
                    .saturating_sub(now.saturating_duration_since(last))
            })
    }

    /// Remaining cooldown for every command that has fired, sorted by command
    #[must_use]
    pub fn status(&self, now: Instant) -> Vec<(Command, Duration)> {
        let commands: Vec<Command> = self
            .last_fired
            .lock()
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();

        let mut status: Vec<(Command, Duration)> = commands
            .into_iter()
            .map(|c| (c, self.remaining(c, now)))
            .collect();
        status.sort_by_key(|(c, _)| *c);
        status
    }

    /// Forget every recorded fire time
    pub fn reset(&self) {
        if let Ok(mut last_fired) = self.last_fired.lock() {
            last_fired.clear();
        }
        tracing::info!("command cooldowns reset");
    }

    /// Configured minimum interval
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fire_allowed() {
        let registry = CooldownRegistry::new(Duration::from_secs(1));
        assert!(registry.should_fire(Command::Left, Instant::now()));
    }

    #[test]
    fn test_second_fire_within_interval_refused() {
        let registry = CooldownRegistry::new(Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(registry.should_fire(Command::Left, t0));
        assert!(!registry.should_fire(Command::Left, t0 + Duration::from_millis(999)));
        assert!(registry.should_fire(Command::Left, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_refusal_does_not_extend_cooldown() {
        let registry = CooldownRegistry::new(Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(registry.should_fire(Command::Stop, t0));
        assert!(!registry.should_fire(Command::Stop, t0 + Duration::from_millis(900)));
        assert!(registry.should_fire(Command::Stop, t0 + Duration::from_millis(1000)));
    }

    #[test]
    fn test_commands_are_independent() {
        let registry = CooldownRegistry::new(Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(registry.should_fire(Command::Left, t0));
        assert!(registry.should_fire(Command::Right, t0));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let registry = CooldownRegistry::new(Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(!registry.is_cooling_down(Command::Forward, t0));
        assert!(registry.should_fire(Command::Forward, t0));
        assert!(registry.is_cooling_down(Command::Forward, t0));
        assert_eq!(
            registry.remaining(Command::Forward, t0 + Duration::from_millis(400)),
            Duration::from_millis(600)
        );
    }

    #[test]
    fn test_status_and_reset() {
        let registry = CooldownRegistry::new(Duration::from_secs(1));
        let t0 = Instant::now();
        registry.should_fire(Command::Right, t0);
        registry.should_fire(Command::Left, t0);

        let status = registry.status(t0);
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].0, Command::Left);

        registry.reset();
        assert!(registry.status(t0).is_empty());
        assert!(registry.should_fire(Command::Left, t0));
    }
}
