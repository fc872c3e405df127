//! Game sessions
//!
//! A session runner follows one game's update stream from start to finish,
//! requests moves when the bot is on move and gives up on idle games.

pub mod result;
pub mod retry;
pub mod runner;
pub mod state;

pub use retry::{Backoff, RetryPolicy};
pub use runner::{SessionContext, SessionRunner};
pub use state::SessionState;

use crate::client::error::{ClientError, EngineError};

/// How a session ended, as reported back to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The game reached a terminal position
    Finished,
    /// Aborted for lack of activity
    Aborted,
    /// Given up after the inactivity allowance ran out
    Terminated,
    /// Correspondence game left idle, tracking stopped locally
    Disconnected,
    /// Stream ended and the server no longer lists the game
    Closed,
    /// Shutdown requested while playing
    Stopped,
    /// Gave up after a fatal error or exhausted retries
    Failed(String),
    /// The runner panicked
    Crashed(String),
    /// The worker pool refused the job
    Rejected(String),
}

impl SessionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SessionOutcome::Failed(_) | SessionOutcome::Crashed(_) | SessionOutcome::Rejected(_)
        )
    }
}

/// Errors that end one session attempt
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("game stream ended")]
    StreamEnded,
    #[error("position update before the game description")]
    MissingGameInfo,
    #[error("bot is not playing in game {0}")]
    NotAParticipant(String),
    #[error("engine move {0} is illegal")]
    IllegalMove(String),
    #[error("gave up reconnecting to the game stream")]
    ReconnectExhausted,
}

impl SessionError {
    /// Stream interruptions that may be resumed by reopening the stream
    pub fn is_interruption(&self) -> bool {
        match self {
            SessionError::StreamEnded => true,
            SessionError::Client(e) => e.is_transport(),
            _ => false,
        }
    }

    /// Retrying the session cannot help
    pub fn is_final(&self) -> bool {
        match self {
            SessionError::Client(e) => e.is_final(),
            SessionError::Engine(e) => !e.is_transient(),
            SessionError::StreamEnded => false,
            SessionError::MissingGameInfo
            | SessionError::NotAParticipant(_)
            | SessionError::IllegalMove(_)
            | SessionError::ReconnectExhausted => true,
        }
    }
}
