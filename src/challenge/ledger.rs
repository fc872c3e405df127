//! Recent challenger ledger
//!
//! Remembers when each challenger was last accepted so repeat challenges from
//! the same bot can be capped within a rolling window.

use std::collections::HashMap;
use std::time::Duration;

use crate::util::Timer;

/// Challenger name to expiry timers, oldest first
#[derive(Debug, Default)]
pub struct RecentChallengerLedger {
    entries: HashMap<String, Vec<Timer>>,
}

impl RecentChallengerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted challenge that counts for `window`
    pub fn record(&mut self, challenger: &str, window: Duration) {
        self.entries
            .entry(challenger.to_string())
            .or_default()
            .push(Timer::new(window));
    }

    /// Live entries for a challenger, pruning expired ones first
    pub fn recent_count(&mut self, challenger: &str) -> usize {
        let Some(timers) = self.entries.get_mut(challenger) else {
            return 0;
        };
        timers.retain(|timer| !timer.is_expired());
        let count = timers.len();
        if count == 0 {
            self.entries.remove(challenger);
        }
        count
    }

    /// Number of challengers with at least one entry (expired or not)
    #[cfg(test)]
    pub fn tracked_challengers(&self) -> usize {
        self.entries.len()
    }
}
