//! In-crate fakes for the external collaborators

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use crate::challenge::model::{ChallengePayload, DeclineReason};
use crate::client::{
    ChatRoom, ClientError, Color, EngineError, GameInfo, GameServer, GameSnapshot, GameStatus,
    MoveSelector, OngoingSession, OutboundChallenge, PlayerInfo, SelectedMove, StreamItem,
    TimeControl, UpdateStream, UserProfile,
};

pub const BOT_ID: &str = "gambitbot";

/// Every call made against the fake server, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    MakeMove { session: String, uci: String },
    Accept(String),
    Decline(String, DeclineReason),
    Create(String),
    Abort(String),
    IsOnline(String),
    Ongoing,
    Stream(String),
    Chat(String, ChatRoom, String),
}

/// One step of a scripted update stream
#[derive(Debug, Clone)]
pub enum Script {
    Item(StreamItem),
    Fail(ClientError),
    /// Pause before the next step
    Wait(Duration),
    /// A heartbeat every interval, forever
    Heartbeats(Duration),
    /// Never yield again
    Pending,
}

/// Build an update stream that replays a script and then ends
pub fn scripted(script: Vec<Script>) -> UpdateStream {
    stream::unfold(VecDeque::from(script), |mut rest| async move {
        loop {
            let Some(step) = rest.pop_front() else {
                return None;
            };
            match step {
                Script::Item(item) => return Some((Ok(item), rest)),
                Script::Fail(e) => return Some((Err(e), rest)),
                Script::Wait(delay) => tokio::time::sleep(delay).await,
                Script::Heartbeats(interval) => {
                    tokio::time::sleep(interval).await;
                    rest.push_front(Script::Heartbeats(interval));
                    return Some((Ok(StreamItem::Heartbeat), rest));
                }
                Script::Pending => std::future::pending::<()>().await,
            }
        }
    })
    .boxed()
}

/// Game server that replays scripted streams and records calls
pub struct FakeServer {
    profile: UserProfile,
    calls: Mutex<Vec<Call>>,
    streams: Mutex<HashMap<String, VecDeque<Vec<Script>>>>,
    ongoing: Mutex<Vec<OngoingSession>>,
    move_failures: Mutex<VecDeque<ClientError>>,
    accept_failures: Mutex<HashMap<String, ClientError>>,
    online: AtomicBool,
    created: AtomicUsize,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            profile: UserProfile {
                id: BOT_ID.to_string(),
                username: "GambitBot".to_string(),
            },
            calls: Mutex::new(Vec::new()),
            streams: Mutex::new(HashMap::new()),
            ongoing: Mutex::new(Vec::new()),
            move_failures: Mutex::new(VecDeque::new()),
            accept_failures: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            created: AtomicUsize::new(0),
        }
    }

    /// Queue the script served by the next `stream_updates` for a session
    pub fn push_stream(&self, session_id: &str, script: Vec<Script>) {
        self.streams
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push_back(script);
    }

    pub fn set_ongoing(&self, sessions: Vec<OngoingSession>) {
        *self.ongoing.lock() = sessions;
    }

    /// The next `make_move` fails with this error
    pub fn fail_next_move(&self, error: ClientError) {
        self.move_failures.lock().push_back(error);
    }

    pub fn fail_accept(&self, challenge_id: &str, error: ClientError) {
        self.accept_failures
            .lock()
            .insert(challenge_id.to_string(), error);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Moves submitted for a session, in order
    pub fn moves(&self, session_id: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::MakeMove { session, uci } if session == session_id => Some(uci.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl GameServer for FakeServer {
    async fn profile(&self) -> Result<UserProfile, ClientError> {
        Ok(self.profile.clone())
    }

    async fn make_move(&self, session_id: &str, uci: &str) -> Result<(), ClientError> {
        if let Some(error) = self.move_failures.lock().pop_front() {
            return Err(error);
        }
        self.record(Call::MakeMove {
            session: session_id.to_string(),
            uci: uci.to_string(),
        });
        Ok(())
    }

    async fn accept_challenge(&self, challenge_id: &str) -> Result<(), ClientError> {
        self.record(Call::Accept(challenge_id.to_string()));
        match self.accept_failures.lock().remove(challenge_id) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn decline_challenge(
        &self,
        challenge_id: &str,
        reason: DeclineReason,
    ) -> Result<(), ClientError> {
        self.record(Call::Decline(challenge_id.to_string(), reason));
        Ok(())
    }

    async fn create_challenge(
        &self,
        opponent: &str,
        _request: &OutboundChallenge,
    ) -> Result<String, ClientError> {
        self.record(Call::Create(opponent.to_string()));
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("out{}", n))
    }

    async fn abort(&self, session_id: &str) -> Result<(), ClientError> {
        self.record(Call::Abort(session_id.to_string()));
        Ok(())
    }

    async fn is_online(&self, user_id: &str) -> Result<bool, ClientError> {
        self.record(Call::IsOnline(user_id.to_string()));
        Ok(self.online.load(Ordering::SeqCst))
    }

    async fn ongoing_sessions(&self) -> Result<Vec<OngoingSession>, ClientError> {
        self.record(Call::Ongoing);
        Ok(self.ongoing.lock().clone())
    }

    async fn stream_updates(&self, session_id: &str) -> Result<UpdateStream, ClientError> {
        self.record(Call::Stream(session_id.to_string()));
        let script = self
            .streams
            .lock()
            .get_mut(session_id)
            .and_then(|scripts| scripts.pop_front());
        match script {
            Some(script) => Ok(scripted(script)),
            None => Err(ClientError::NotFound(format!("no stream for {}", session_id))),
        }
    }

    async fn send_chat(&self, session_id: &str, room: ChatRoom, text: &str) -> Result<(), ClientError> {
        self.record(Call::Chat(session_id.to_string(), room, text.to_string()));
        Ok(())
    }
}

/// Move selector answering `m<ply>` for every request
#[derive(Default)]
pub struct FakeSelector {
    calls: AtomicUsize,
    with_metrics: bool,
    failures: Mutex<VecDeque<EngineError>>,
}

impl FakeSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a prediction payload to every move
    pub fn with_metrics() -> Self {
        Self {
            with_metrics: true,
            ..Self::default()
        }
    }

    pub fn fail_next(&self, error: EngineError) {
        self.failures.lock().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MoveSelector for FakeSelector {
    async fn select_move(
        &self,
        _game: &GameInfo,
        history: &[String],
    ) -> Result<SelectedMove, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(SelectedMove {
            uci: format!("m{}", history.len()),
            metrics: self
                .with_metrics
                .then(|| serde_json::json!({ "white_elo": 1500, "black_elo": 1600 })),
        })
    }
}

/// Game with the bot playing `color` against "alice"
pub fn game_info(id: &str, color: Color, time_control: TimeControl, moves: &[&str]) -> GameInfo {
    let bot = PlayerInfo {
        id: BOT_ID.to_string(),
        name: "GambitBot".to_string(),
        rating: Some(2000),
        title: Some("BOT".to_string()),
    };
    let opponent = PlayerInfo {
        id: "alice".to_string(),
        name: "Alice".to_string(),
        rating: Some(1800),
        title: None,
    };
    let (white, black) = match color {
        Color::White => (bot, opponent),
        Color::Black => (opponent, bot),
    };
    GameInfo {
        id: id.to_string(),
        white,
        black,
        variant: "standard".to_string(),
        initial_fen: "startpos".to_string(),
        time_control,
        state: GameSnapshot::with_moves(moves.iter().copied()),
    }
}

pub fn full(info: GameInfo) -> Script {
    Script::Item(StreamItem::Full(Box::new(info)))
}

pub fn position(moves: &[&str]) -> Script {
    Script::Item(StreamItem::State(GameSnapshot::with_moves(moves.iter().copied())))
}

pub fn game_over(moves: &[&str], status: GameStatus, winner: Option<Color>) -> Script {
    let mut snapshot = GameSnapshot::with_moves(moves.iter().copied());
    snapshot.status = status;
    snapshot.winner = winner;
    Script::Item(StreamItem::State(snapshot))
}

/// Incoming challenge payload as the event source delivers it
pub fn challenge_payload(id: &str, challenger: &str, rating: u32, bot: bool) -> ChallengePayload {
    let json = serde_json::json!({
        "id": id,
        "challenger": {
            "id": challenger.to_lowercase(),
            "name": challenger,
            "rating": rating,
            "title": if bot { Some("BOT") } else { None },
        },
        "variant": { "key": "standard" },
        "rated": false,
        "timeControl": { "type": "clock", "limit": 180, "increment": 2 },
    });
    serde_json::from_value(json).expect("valid challenge payload")
}
