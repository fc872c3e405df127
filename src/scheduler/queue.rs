//! Low-remaining-time queue
//!
//! Sessions already in progress that still need a runner. The one with the
//! least clock time left is started first; equal times keep arrival order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::client::types::SessionId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    seconds_left: u64,
    seq: u64,
    session_id: SessionId,
}

/// Min-heap of sessions keyed by remaining time, then arrival
#[derive(Debug, Default)]
pub struct LowTimeQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl LowTimeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session; games without a clock sort last. Duplicates are ignored
    pub fn push(&mut self, session_id: SessionId, seconds_left: Option<u64>) -> bool {
        if self.contains(&session_id) {
            return false;
        }
        self.heap.push(Reverse(Entry {
            seconds_left: seconds_left.unwrap_or(u64::MAX),
            seq: self.next_seq,
            session_id,
        }));
        self.next_seq += 1;
        true
    }

    /// Take the most urgent session
    pub fn pop(&mut self) -> Option<SessionId> {
        self.heap.pop().map(|Reverse(entry)| entry.session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.heap
            .iter()
            .any(|Reverse(entry)| entry.session_id == session_id)
    }

    /// Drop a session that was started by other means
    pub fn remove(&mut self, session_id: &str) -> bool {
        let before = self.heap.len();
        self.heap
            .retain(|Reverse(entry)| entry.session_id != session_id);
        self.heap.len() != before
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_time_first() {
        let mut queue = LowTimeQueue::new();
        queue.push("slow".into(), Some(300));
        queue.push("urgent".into(), Some(12));
        queue.push("corr".into(), None);
        queue.push("mid".into(), Some(60));

        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(order, ["urgent", "mid", "slow", "corr"]);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let mut queue = LowTimeQueue::new();
        queue.push("b".into(), Some(30));
        queue.push("a".into(), Some(30));
        queue.push("c".into(), Some(30));

        assert_eq!(queue.pop().as_deref(), Some("b"));
        assert_eq!(queue.pop().as_deref(), Some("a"));
        assert_eq!(queue.pop().as_deref(), Some("c"));
    }

    #[test]
    fn test_duplicates_and_removal() {
        let mut queue = LowTimeQueue::new();
        assert!(queue.push("g1".into(), Some(10)));
        assert!(!queue.push("g1".into(), Some(5)));
        assert_eq!(queue.len(), 1);

        assert!(queue.remove("g1"));
        assert!(!queue.remove("g1"));
        assert!(queue.is_empty());
    }
}
