//! Control events and the shared control queue
//!
//! Inbound JSON objects are validated here, at the queue boundary, into the
//! closed `ControlEvent` enum. Objects without a `type` discriminator or with
//! an unreadable payload never reach the dispatcher.

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::challenge::model::ChallengePayload;
use crate::client::types::SessionId;
use crate::session::SessionOutcome;

/// Unit of work delivered to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Keep-alive; only triggers maintenance
    Ping,
    ChallengeReceived(ChallengePayload),
    /// The challenger withdrew a challenge
    ChallengeCanceled {
        challenge_id: String,
    },
    /// A peer declined one of our outbound challenges
    ChallengeDeclinedByPeer {
        challenge_id: String,
        decliner: Option<String>,
    },
    SessionStart {
        session_id: SessionId,
    },
    /// A session runner finished (or never ran); frees its slot
    ///
    /// Only produced locally by the worker pool and the scheduler, never
    /// parsed from inbound JSON.
    SessionCompleted {
        session_id: SessionId,
        outcome: SessionOutcome,
    },
    /// The event source died; the orchestrator should restart
    Terminated {
        error: Option<String>,
    },
    /// Recognizable event of a kind the dispatcher does not act on
    Ignored {
        kind: String,
    },
}

impl ControlEvent {
    /// Short kind name for logs and metrics
    pub fn kind(&self) -> &str {
        match self {
            ControlEvent::Ping => "ping",
            ControlEvent::ChallengeReceived(_) => "challenge",
            ControlEvent::ChallengeCanceled { .. } => "challengeCanceled",
            ControlEvent::ChallengeDeclinedByPeer { .. } => "challengeDeclined",
            ControlEvent::SessionStart { .. } => "gameStart",
            ControlEvent::SessionCompleted { .. } => "sessionCompleted",
            ControlEvent::Terminated { .. } => "terminated",
            ControlEvent::Ignored { kind } => kind,
        }
    }

    /// Parse one inbound JSON object
    pub fn from_json(bytes: &[u8]) -> Result<Self, EventError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| EventError::Malformed(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(EventError::MissingType)?
            .to_string();

        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Ok(ControlEvent::Ignored { kind });
        }

        let wire: WireEvent =
            serde_json::from_value(value).map_err(|e| EventError::Malformed(e.to_string()))?;
        wire.try_into()
    }
}

const KNOWN_KINDS: [&str; 6] = [
    "ping",
    "challenge",
    "challengeCanceled",
    "challengeDeclined",
    "gameStart",
    "terminated",
];

/// Errors at the queue boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("event has no type discriminator")]
    MissingType,
    #[error("malformed event: {0}")]
    Malformed(String),
    #[error("control queue is closed")]
    Closed,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireEvent {
    Ping,
    Challenge {
        challenge: ChallengePayload,
    },
    ChallengeCanceled {
        challenge: ChallengeRef,
    },
    ChallengeDeclined {
        challenge: DeclinedPayload,
    },
    GameStart {
        game: GameRef,
    },
    Terminated {
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ChallengeRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeclinedPayload {
    id: String,
    #[serde(default)]
    dest_user: Option<UserRef>,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameRef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    game_id: Option<String>,
}

impl GameRef {
    fn into_id(self) -> Result<SessionId, EventError> {
        self.game_id
            .or(self.id)
            .ok_or_else(|| EventError::Malformed("game reference without id".to_string()))
    }
}

impl TryFrom<WireEvent> for ControlEvent {
    type Error = EventError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        Ok(match wire {
            WireEvent::Ping => ControlEvent::Ping,
            WireEvent::Challenge { challenge } => ControlEvent::ChallengeReceived(challenge),
            WireEvent::ChallengeCanceled { challenge } => ControlEvent::ChallengeCanceled {
                challenge_id: challenge.id,
            },
            WireEvent::ChallengeDeclined { challenge } => ControlEvent::ChallengeDeclinedByPeer {
                challenge_id: challenge.id,
                decliner: challenge.dest_user.map(|u| u.name),
            },
            WireEvent::GameStart { game } => ControlEvent::SessionStart {
                session_id: game.into_id()?,
            },
            WireEvent::Terminated { error } => ControlEvent::Terminated { error },
        })
    }
}

/// Producer side of the control queue; cheap to clone
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::UnboundedSender<ControlEvent>,
}

/// Consumer side of the control queue, owned by the dispatcher
pub type ControlReceiver = mpsc::UnboundedReceiver<ControlEvent>;

/// Create the shared control queue
pub fn control_channel() -> (ControlSender, ControlReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlSender { tx }, rx)
}

impl ControlSender {
    pub fn push(&self, event: ControlEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::Closed)
    }

    /// Validate a raw JSON object and push it; invalid objects are logged and dropped
    pub fn push_json(&self, bytes: &[u8]) -> Result<(), EventError> {
        match ControlEvent::from_json(bytes) {
            Ok(event) => self.push(event),
            Err(e) => {
                warn!(
                    "Unable to handle event ({}): {}",
                    e,
                    String::from_utf8_lossy(bytes)
                );
                Err(e)
            }
        }
    }

    /// Report a finished session
    pub fn session_completed(&self, session_id: SessionId, outcome: SessionOutcome) {
        if self
            .push(ControlEvent::SessionCompleted { session_id, outcome })
            .is_err()
        {
            warn!("Control queue closed, completion dropped");
        }
    }
}
