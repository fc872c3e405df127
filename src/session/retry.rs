//! Exponential backoff with a ceiling on total elapsed time
//!
//! Each session invocation is retried under this policy. A classifier on the
//! error decides whether another attempt can help; the policy only decides
//! how long to wait and when to give up.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for a single delay
    pub max_delay: Duration,
    /// Growth factor between attempts
    pub multiplier: f64,
    /// Give up once this much time has passed since the first attempt
    pub max_elapsed: Duration,
    /// Draw each delay uniformly from [0, delay]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_elapsed: Duration::from_secs(600),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `attempt` (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(63) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Begin tracking a sequence of attempts
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 0,
            started_at: Instant::now(),
        }
    }
}

/// Attempt tracker for one retry sequence
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
    started_at: Instant,
}

impl Backoff {
    /// Delay before the next attempt, or None once the elapsed ceiling is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        let mut delay = self.policy.delay(self.attempt);
        if self.policy.jitter && !delay.is_zero() {
            delay = rand::thread_rng().gen_range(Duration::ZERO..=delay);
        }
        if self.started_at.elapsed() + delay > self.policy.max_elapsed {
            return None;
        }
        self.attempt += 1;
        Some(delay)
    }

    /// Retries handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Start over after a success
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.started_at = Instant::now();
    }
}
