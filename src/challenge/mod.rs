//! Incoming challenge handling
//!
//! Eligibility rules, scoring, the ordered acceptance queue and the
//! repeat-challenger ledger.

pub mod ledger;
pub mod model;
pub mod registry;
pub mod score;

pub use ledger::RecentChallengerLedger;
pub use model::{Challenge, Challenger, DeclineReason};
pub use registry::{evaluate, ChallengeRegistry, Rejection};
pub use score::{ChallengeScorer, RatingScorer};
