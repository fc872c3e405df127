//! Gambit Bot
//!
//! Event-driven orchestrator for a game-playing bot account. Inbound control
//! events (challenges, game starts, session completions) are handled by a
//! single dispatcher that owns all bookkeeping, while each running game is
//! played by its own session runner on a bounded worker pool.
//!
//! # Features
//!
//! - `http` - reqwest-backed game server and move-selection clients (enabled by default)
//! - `webhook` - Local HTTP receiver feeding the control queue (enabled by default)
//! - `metrics_server` - Prometheus/JSON metrics endpoint (enabled by default)

pub mod challenge;
pub mod client;
pub mod config;
pub mod control;
pub mod matchmaking;
pub mod metrics;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod supervisor;
pub mod util;

#[cfg(test)]
pub mod testing;
