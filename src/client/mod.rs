//! External collaborators
//!
//! The orchestrator consumes three capability sets it does not implement
//! itself: the game server (moves, challenges, streams), the rules engine
//! (legality and termination facts) and the move-selection engine.

pub mod error;
pub mod rules;
pub mod types;

#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::challenge::model::DeclineReason;

pub use error::{ClientError, EngineError};
pub use rules::{DrawFacts, RulesEngine, ServerReportedRules, Termination};
pub use types::*;

/// Lazy, in-order, non-restartable sequence of game stream items
pub type UpdateStream = BoxStream<'static, Result<StreamItem, ClientError>>;

/// Wire client to the remote game server
#[async_trait]
pub trait GameServer: Send + Sync {
    /// Account the bot plays as
    async fn profile(&self) -> Result<UserProfile, ClientError>;

    async fn make_move(&self, session_id: &str, uci: &str) -> Result<(), ClientError>;

    async fn accept_challenge(&self, challenge_id: &str) -> Result<(), ClientError>;

    async fn decline_challenge(
        &self,
        challenge_id: &str,
        reason: DeclineReason,
    ) -> Result<(), ClientError>;

    /// Issue an outbound challenge, returning its id
    async fn create_challenge(
        &self,
        opponent: &str,
        request: &OutboundChallenge,
    ) -> Result<String, ClientError>;

    async fn abort(&self, session_id: &str) -> Result<(), ClientError>;

    async fn is_online(&self, user_id: &str) -> Result<bool, ClientError>;

    async fn ongoing_sessions(&self) -> Result<Vec<OngoingSession>, ClientError>;

    /// Open the update stream of a session
    async fn stream_updates(&self, session_id: &str) -> Result<UpdateStream, ClientError>;

    async fn send_chat(&self, session_id: &str, room: ChatRoom, text: &str)
        -> Result<(), ClientError>;
}

/// Move-selection engine (pretrained predictive model)
#[async_trait]
pub trait MoveSelector: Send + Sync {
    /// Choose a move for the position reached by `history`
    async fn select_move(
        &self,
        game: &GameInfo,
        history: &[String],
    ) -> Result<SelectedMove, EngineError>;
}
