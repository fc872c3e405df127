//! reqwest-backed collaborators
//!
//! `HttpGameServer` speaks the bot REST API with a bearer token and reads game
//! streams as newline-delimited JSON, where blank lines are keep-alives.
//! `HttpMoveSelector` posts the move history to a model inference endpoint.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::challenge::model::DeclineReason;
use crate::client::types::{
    ChatRoom, Color, GameInfo, GameSnapshot, GameStatus, OngoingSession, OutboundChallenge,
    PlayerInfo, SelectedMove, StreamItem, TimeControl, UserProfile,
};
use crate::client::{ClientError, EngineError, GameServer, MoveSelector, UpdateStream};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// The server sends a keep-alive every few seconds; silence this long means the stream is dead
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest accepted stream line
const MAX_LINE: usize = 1 << 20;

fn transport_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else if e.is_decode() {
        ClientError::Decode(e.to_string())
    } else {
        ClientError::Disconnected(e.to_string())
    }
}

/// Turn a non-success response into a classified error
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::from_status(status.as_u16(), body))
}

fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("gambit-bot/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
}

/// Game server client over the bot REST API
pub struct HttpGameServer {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpGameServer {
    pub fn new(base_url: &str, token: &str) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<Response, ClientError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await
    }

    async fn post(&self, path: &str, form: &[(&str, String)]) -> Result<Response, ClientError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl GameServer for HttpGameServer {
    async fn profile(&self) -> Result<UserProfile, ClientError> {
        let account: WireAccount = Self::json(self.get("/api/account").await?).await?;
        Ok(UserProfile {
            id: account.id,
            username: account.username,
        })
    }

    async fn make_move(&self, session_id: &str, uci: &str) -> Result<(), ClientError> {
        self.post(&format!("/api/bot/game/{}/move/{}", session_id, uci), &[])
            .await?;
        Ok(())
    }

    async fn accept_challenge(&self, challenge_id: &str) -> Result<(), ClientError> {
        self.post(&format!("/api/challenge/{}/accept", challenge_id), &[])
            .await?;
        Ok(())
    }

    async fn decline_challenge(
        &self,
        challenge_id: &str,
        reason: DeclineReason,
    ) -> Result<(), ClientError> {
        self.post(
            &format!("/api/challenge/{}/decline", challenge_id),
            &[("reason", reason.as_str().to_string())],
        )
        .await?;
        Ok(())
    }

    async fn create_challenge(
        &self,
        opponent: &str,
        request: &OutboundChallenge,
    ) -> Result<String, ClientError> {
        let form = challenge_form(request);
        let response = self
            .post(&format!("/api/challenge/{}", opponent), &form)
            .await?;
        let created: WireCreated = Self::json(response).await?;
        created
            .challenge
            .map(|c| c.id)
            .or(created.id)
            .ok_or_else(|| ClientError::Decode("challenge id missing".to_string()))
    }

    async fn abort(&self, session_id: &str) -> Result<(), ClientError> {
        self.post(&format!("/api/bot/game/{}/abort", session_id), &[])
            .await?;
        Ok(())
    }

    async fn is_online(&self, user_id: &str) -> Result<bool, ClientError> {
        let statuses: Vec<WireUserStatus> =
            Self::json(self.get(&format!("/api/users/status?ids={}", user_id)).await?).await?;
        Ok(statuses
            .iter()
            .any(|s| s.id.eq_ignore_ascii_case(user_id) && s.online))
    }

    async fn ongoing_sessions(&self) -> Result<Vec<OngoingSession>, ClientError> {
        let playing: WirePlaying = Self::json(self.get("/api/account/playing").await?).await?;
        Ok(playing.now_playing.into_iter().map(Into::into).collect())
    }

    async fn stream_updates(&self, session_id: &str) -> Result<UpdateStream, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/bot/game/stream/{}", session_id)))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check(response).await?;
        debug!("Opened stream of game {}", session_id);

        let chunks = response.bytes_stream().map(|r| r.map_err(transport_error)).boxed();
        Ok(ndjson_items(chunks, STREAM_IDLE_TIMEOUT))
    }

    async fn send_chat(&self, session_id: &str, room: ChatRoom, text: &str) -> Result<(), ClientError> {
        self.post(
            &format!("/api/bot/game/{}/chat", session_id),
            &[("room", room.as_str().to_string()), ("text", text.to_string())],
        )
        .await?;
        Ok(())
    }
}

fn challenge_form(request: &OutboundChallenge) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("rated", request.rated.to_string()),
        ("variant", request.variant.clone()),
    ];
    match request.time_control {
        TimeControl::Clock { limit, increment } => {
            form.push(("clock.limit", limit.as_secs().to_string()));
            form.push(("clock.increment", increment.as_secs().to_string()));
        }
        TimeControl::Correspondence { days_per_turn } => {
            form.push(("days", days_per_turn.to_string()));
        }
        TimeControl::Unlimited => {}
    }
    form
}

struct LineState<S> {
    chunks: S,
    buffer: Vec<u8>,
    lines: VecDeque<Vec<u8>>,
    done: bool,
}

/// Split a byte stream into stream items, one per line
fn ndjson_items<S, B>(chunks: S, idle_timeout: Duration) -> UpdateStream
where
    S: Stream<Item = Result<B, ClientError>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = LineState {
        chunks,
        buffer: Vec::new(),
        lines: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(line) = state.lines.pop_front() {
                return Some((parse_line(&line), state));
            }
            if state.done {
                return None;
            }

            match tokio::time::timeout(idle_timeout, state.chunks.next()).await {
                Err(_) => {
                    state.done = true;
                    return Some((Err(ClientError::Timeout), state));
                }
                Ok(Some(Err(e))) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                Ok(None) => {
                    state.done = true;
                    if !state.buffer.iter().all(u8::is_ascii_whitespace) {
                        let rest = std::mem::take(&mut state.buffer);
                        state.lines.push_back(rest);
                    }
                }
                Ok(Some(Ok(chunk))) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    while let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                        state.lines.push_back(line);
                    }
                    if state.buffer.len() > MAX_LINE {
                        state.done = true;
                        state.lines.clear();
                        state.buffer = Vec::new();
                        let error = ClientError::Decode(format!("stream line exceeds {} bytes", MAX_LINE));
                        return Some((Err(error), state));
                    }
                }
            }
        }
    })
    .boxed()
}

/// One stream line; blank lines are heartbeats
fn parse_line(line: &[u8]) -> Result<StreamItem, ClientError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(StreamItem::Heartbeat);
    }

    let event: WireGameEvent =
        serde_json::from_str(text).map_err(|e| ClientError::Decode(e.to_string()))?;
    Ok(match event {
        WireGameEvent::GameFull(full) => StreamItem::Full(Box::new((*full).into())),
        WireGameEvent::GameState(state) => StreamItem::State(state.into()),
        WireGameEvent::Other => StreamItem::Other,
    })
}

#[derive(Deserialize)]
struct WireAccount {
    id: String,
    username: String,
}

#[derive(Deserialize)]
struct WireCreated {
    #[serde(default)]
    challenge: Option<WireId>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct WireId {
    id: String,
}

#[derive(Deserialize)]
struct WireUserStatus {
    id: String,
    #[serde(default)]
    online: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePlaying {
    #[serde(default)]
    now_playing: Vec<WireOngoing>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOngoing {
    game_id: String,
    #[serde(default)]
    opponent: WireOpponent,
    #[serde(default)]
    seconds_left: Option<u64>,
}

#[derive(Default, Deserialize)]
struct WireOpponent {
    #[serde(default)]
    username: String,
}

impl From<WireOngoing> for OngoingSession {
    fn from(wire: WireOngoing) -> Self {
        OngoingSession {
            id: wire.game_id,
            opponent: wire.opponent.username,
            seconds_left: wire.seconds_left,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireGameEvent {
    GameFull(Box<WireGameFull>),
    GameState(WireGameState),
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGameFull {
    id: String,
    #[serde(default)]
    white: WirePlayer,
    #[serde(default)]
    black: WirePlayer,
    #[serde(default)]
    variant: WireVariant,
    #[serde(default)]
    initial_fen: Option<String>,
    #[serde(default)]
    clock: Option<WireClock>,
    #[serde(default)]
    days_per_turn: Option<u32>,
    state: WireGameState,
}

#[derive(Default, Deserialize)]
struct WirePlayer {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    rating: Option<u32>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct WireVariant {
    key: String,
}

impl Default for WireVariant {
    fn default() -> Self {
        Self {
            key: "standard".to_string(),
        }
    }
}

/// Clock settings in milliseconds
#[derive(Deserialize)]
struct WireClock {
    initial: u64,
    increment: u64,
}

/// Position update; times in milliseconds
#[derive(Deserialize)]
struct WireGameState {
    #[serde(default)]
    moves: String,
    #[serde(default)]
    wtime: u64,
    #[serde(default)]
    btime: u64,
    #[serde(default)]
    winc: u64,
    #[serde(default)]
    binc: u64,
    #[serde(default = "started")]
    status: GameStatus,
    #[serde(default)]
    winner: Option<Color>,
}

fn started() -> GameStatus {
    GameStatus::Started
}

impl From<WirePlayer> for PlayerInfo {
    fn from(wire: WirePlayer) -> Self {
        PlayerInfo {
            id: wire.id,
            name: wire.name,
            rating: wire.rating,
            title: wire.title,
        }
    }
}

impl From<WireGameState> for GameSnapshot {
    fn from(wire: WireGameState) -> Self {
        GameSnapshot {
            moves: wire.moves.split_whitespace().map(str::to_string).collect(),
            status: wire.status,
            winner: wire.winner,
            white_time: Duration::from_millis(wire.wtime),
            black_time: Duration::from_millis(wire.btime),
            white_increment: Duration::from_millis(wire.winc),
            black_increment: Duration::from_millis(wire.binc),
        }
    }
}

impl From<WireGameFull> for GameInfo {
    fn from(wire: WireGameFull) -> Self {
        let time_control = match (wire.clock, wire.days_per_turn) {
            (Some(clock), _) => TimeControl::Clock {
                limit: Duration::from_millis(clock.initial),
                increment: Duration::from_millis(clock.increment),
            },
            (None, Some(days_per_turn)) => TimeControl::Correspondence { days_per_turn },
            (None, None) => TimeControl::Unlimited,
        };

        GameInfo {
            id: wire.id,
            white: wire.white.into(),
            black: wire.black.into(),
            variant: wire.variant.key,
            initial_fen: wire.initial_fen.unwrap_or_else(|| "startpos".to_string()),
            time_control,
            state: wire.state.into(),
        }
    }
}

/// Move-selection client for a model inference endpoint
pub struct HttpMoveSelector {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictRequest<'a> {
    game_id: &'a str,
    variant: &'a str,
    initial_fen: &'a str,
    moves: &'a [String],
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default, rename = "move")]
    uci: Option<String>,
    #[serde(default)]
    info: Option<serde_json::Value>,
}

impl HttpMoveSelector {
    pub fn new(endpoint: &str) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client()?,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl MoveSelector for HttpMoveSelector {
    async fn select_move(
        &self,
        game: &GameInfo,
        history: &[String],
    ) -> Result<SelectedMove, EngineError> {
        let request = PredictRequest {
            game_id: &game.id,
            variant: &game.variant,
            initial_fen: &game.initial_fen,
            moves: history,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check(response).await?;

        let prediction: PredictResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Failed(format!("unreadable prediction: {}", e)))?;

        match prediction.uci {
            Some(uci) if !uci.is_empty() => Ok(SelectedMove {
                uci,
                metrics: prediction.info,
            }),
            _ => Err(EngineError::NoLegalMove),
        }
    }
}
