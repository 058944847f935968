//! Cooldown gate shared by every alarm source.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Default minimum interval between two admitted alarms.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// The rate limiter's decision for one alarm occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Rejected; `remaining` is the time left until the cooldown expires.
    Suppressed { remaining: Duration },
}

/// A single global cooldown window.
///
/// The limiter admits an alarm if no alarm has been admitted yet, or if at
/// least `cooldown` has elapsed since the last admitted one. The
/// check-and-update happens under one lock, so racing callers in the same
/// window see exactly one admission.
#[derive(Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    last_admitted_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a new `RateLimiter` that has never admitted an alarm.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_admitted_at: Mutex::new(None),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_admitted_at(&self) -> Option<Instant> {
        *self
            .last_admitted_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Decides whether an alarm observed at `now` may proceed.
    ///
    /// A `now` earlier than the last admission counts as zero elapsed time,
    /// and the stored timestamp never moves backwards.
    pub fn check(&self, now: Instant) -> Admission {
        let mut last = self
            .last_admitted_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match *last {
            None => {
                *last = Some(now);
                Admission::Admitted
            }
            Some(previous) => {
                let elapsed = now.saturating_duration_since(previous);
                if elapsed >= self.cooldown {
                    *last = Some(now.max(previous));
                    Admission::Admitted
                } else {
                    Admission::Suppressed {
                        remaining: self.cooldown - elapsed,
                    }
                }
            }
        }
    }

    /// Returns `true` and records `now` if the alarm is admitted.
    pub fn try_admit(&self, now: Instant) -> bool {
        matches!(self.check(now), Admission::Admitted)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
