//! Deadline timer
//!
//! A resettable "expires after D" primitive used for challenge rate limiting,
//! matchmaking cadence, online checks and session inactivity deadlines.
//!
//! Built on `tokio::time::Instant` so paused-clock tests can advance time.

use std::time::Duration;
use tokio::time::Instant;

/// Timer that expires a fixed duration after it was started or last reset
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    duration: Duration,
    started_at: Instant,
}

impl Timer {
    /// Start a timer that expires after `duration`
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started_at: Instant::now(),
        }
    }

    /// Timer that is already expired
    pub fn expired() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Check whether the duration has fully elapsed since the last reset
    pub fn is_expired(&self) -> bool {
        self.started_at.elapsed() >= self.duration
    }

    /// Restart the countdown from now
    pub fn reset(&mut self) {
        self.started_at = Instant::now();
    }

    /// Restart the countdown from now with a new duration
    pub fn reset_with(&mut self, duration: Duration) {
        self.duration = duration;
        self.started_at = Instant::now();
    }

    /// Time left before expiry (zero once expired)
    pub fn time_until_expiration(&self) -> Duration {
        self.duration.saturating_sub(self.started_at.elapsed())
    }
}
