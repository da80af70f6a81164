//! # Reconnection Policy
//!
//! Backoff schedule for resubscribing after a change-stream disconnect.
//!
//! ## Reconnection Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reconnection Schedule                              │
//! │                                                                         │
//! │  disconnect                                                             │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  wait 500ms ──▶ attempt 1 ──fail──▶ wait ~1s  ──▶ attempt 2 ──fail──▶  │
//! │  wait ~2s   ──▶ attempt 3 ──fail──▶ ...                                │
//! │                                                                         │
//! │  attempt succeeds  ──▶ reconcile, schedule resets for next disconnect  │
//! │  attempts exhausted ──▶ store marked FAILED until manual reindex       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::time::Duration;

use crate::config::ReconnectSettings;

/// Immutable reconnection parameters for one store.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        ReconnectPolicy {
            max_attempts,
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        ReconnectPolicy {
            max_attempts: settings.max_attempts,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
        }
    }

    /// Overrides the attempt cap, for modules that set their own.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Starts a fresh schedule.
    pub fn schedule(&self) -> ReconnectSchedule {
        ReconnectSchedule {
            backoff: ExponentialBackoff {
                initial_interval: self.initial_backoff,
                max_interval: self.max_backoff,
                multiplier: 2.0,
                max_elapsed_time: None,
                ..Default::default()
            },
            max_backoff: self.max_backoff,
            max_attempts: self.max_attempts,
            attempt: 0,
        }
    }
}

/// Mutable attempt state for one disconnect episode.
pub struct ReconnectSchedule {
    backoff: ExponentialBackoff,
    max_backoff: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectSchedule {
    /// Yields the delay to sleep before the next attempt, or `None` when the
    /// attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.backoff.next_backoff().unwrap_or(self.max_backoff))
    }

    /// Attempts started so far in this episode.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Restores the full budget after a successful resubscribe.
    pub fn reset(&mut self) {
        self.backoff.reset();
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(5, Duration::from_millis(500), Duration::from_secs(30))
    }

    #[test]
    fn test_schedule_exhausts_after_max_attempts() {
        let mut schedule = policy().schedule();

        for i in 1..=5 {
            assert!(schedule.next_delay().is_some());
            assert_eq!(schedule.attempt(), i);
        }
        assert!(schedule.next_delay().is_none());
        assert!(schedule.next_delay().is_none());
        assert_eq!(schedule.attempt(), 5);
    }

    #[test]
    fn test_delays_stay_below_cap() {
        let mut schedule = policy().schedule();
        while let Some(delay) = schedule.next_delay() {
            // Jitter may push a delay past max_interval by half again.
            assert!(delay <= Duration::from_secs(45));
            assert!(delay > Duration::ZERO);
        }
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut schedule = policy().schedule();
        for _ in 0..5 {
            schedule.next_delay();
        }
        assert!(schedule.next_delay().is_none());

        schedule.reset();
        assert_eq!(schedule.attempt(), 0);
        assert!(schedule.next_delay().is_some());
    }

    #[test]
    fn test_module_override_narrows_budget() {
        let mut schedule = policy().with_max_attempts(2).schedule();
        assert!(schedule.next_delay().is_some());
        assert!(schedule.next_delay().is_some());
        assert!(schedule.next_delay().is_none());
    }
}
