//! Control plane
//!
//! Inbound events, the single-consumer dispatch loop and the local webhook
//! that feeds it.

pub mod dispatcher;
pub mod event;

#[cfg(feature = "webhook")]
pub mod webhook;

pub use dispatcher::{ControlSignal, Dispatcher, RunOutcome};
pub use event::{control_channel, ControlEvent, ControlReceiver, ControlSender, EventError};
