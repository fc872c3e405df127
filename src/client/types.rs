//! Data exchanged with the game server and the move-selection engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server-assigned session (game) identifier
pub type SessionId = String;

/// Side to move / side played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Side to move after `ply` half-moves from the standard start
    pub fn to_move_after(ply: usize) -> Self {
        if ply % 2 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }
}

/// Requested time control of a challenge or game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControl {
    /// Real-time clock: initial budget plus per-move increment
    Clock { limit: Duration, increment: Duration },
    /// Days per move
    Correspondence { days_per_turn: u32 },
    /// No clock at all
    Unlimited,
}

impl TimeControl {
    /// Clock with limit and increment in seconds
    pub fn clock(limit_secs: u64, increment_secs: u64) -> Self {
        TimeControl::Clock {
            limit: Duration::from_secs(limit_secs),
            increment: Duration::from_secs(increment_secs),
        }
    }

    /// Speed category using the usual estimate of limit + 40 * increment
    pub fn speed(&self) -> Speed {
        match self {
            TimeControl::Clock { limit, increment } => {
                let estimate = limit.as_secs() + 40 * increment.as_secs();
                if estimate < 30 {
                    Speed::UltraBullet
                } else if estimate < 180 {
                    Speed::Bullet
                } else if estimate < 480 {
                    Speed::Blitz
                } else if estimate < 1500 {
                    Speed::Rapid
                } else {
                    Speed::Classical
                }
            }
            TimeControl::Correspondence { .. } | TimeControl::Unlimited => Speed::Correspondence,
        }
    }

    pub fn is_correspondence(&self) -> bool {
        !matches!(self, TimeControl::Clock { .. })
    }
}

/// Speed category of a time control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speed {
    UltraBullet,
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Correspondence,
}

impl Speed {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ultrabullet" => Some(Speed::UltraBullet),
            "bullet" => Some(Speed::Bullet),
            "blitz" => Some(Speed::Blitz),
            "rapid" => Some(Speed::Rapid),
            "classical" => Some(Speed::Classical),
            "correspondence" => Some(Speed::Correspondence),
            _ => None,
        }
    }
}

/// Game status as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    Created,
    Started,
    Aborted,
    Mate,
    Resign,
    Stalemate,
    Timeout,
    Draw,
    #[serde(rename = "outoftime")]
    OutOfTime,
    Cheat,
    NoStart,
    UnknownFinish,
    VariantEnd,
    #[serde(other)]
    Unknown,
}

impl GameStatus {
    /// Whether the game is still being played
    pub fn is_ongoing(&self) -> bool {
        matches!(self, GameStatus::Created | GameStatus::Started)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Created => "created",
            GameStatus::Started => "started",
            GameStatus::Aborted => "aborted",
            GameStatus::Mate => "mate",
            GameStatus::Resign => "resign",
            GameStatus::Stalemate => "stalemate",
            GameStatus::Timeout => "timeout",
            GameStatus::Draw => "draw",
            GameStatus::OutOfTime => "outoftime",
            GameStatus::Cheat => "cheat",
            GameStatus::NoStart => "noStart",
            GameStatus::UnknownFinish => "unknownFinish",
            GameStatus::VariantEnd => "variantEnd",
            GameStatus::Unknown => "unknown",
        }
    }
}

/// One position update from the game stream
#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    /// Moves played so far, in order (UCI notation)
    pub moves: Vec<String>,
    pub status: GameStatus,
    pub winner: Option<Color>,
    pub white_time: Duration,
    pub black_time: Duration,
    pub white_increment: Duration,
    pub black_increment: Duration,
}

impl GameSnapshot {
    /// Fresh started game with no moves
    pub fn started() -> Self {
        Self {
            moves: Vec::new(),
            status: GameStatus::Started,
            winner: None,
            white_time: Duration::ZERO,
            black_time: Duration::ZERO,
            white_increment: Duration::ZERO,
            black_increment: Duration::ZERO,
        }
    }

    /// Snapshot with the given moves played
    pub fn with_moves<I, S>(moves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            moves: moves.into_iter().map(Into::into).collect(),
            ..Self::started()
        }
    }

    pub fn ply(&self) -> usize {
        self.moves.len()
    }

    /// Remaining clock time for one side
    pub fn time_left(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white_time,
            Color::Black => self.black_time,
        }
    }

    pub fn increment(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white_increment,
            Color::Black => self.black_increment,
        }
    }
}

/// Player identity in a game
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    pub rating: Option<u32>,
    pub title: Option<String>,
}

/// Full game description sent as the first stream item
#[derive(Debug, Clone, PartialEq)]
pub struct GameInfo {
    pub id: SessionId,
    pub white: PlayerInfo,
    pub black: PlayerInfo,
    pub variant: String,
    pub initial_fen: String,
    pub time_control: TimeControl,
    pub state: GameSnapshot,
}

impl GameInfo {
    /// Color played by the given user id (matched case-insensitively)
    pub fn color_of(&self, user_id: &str) -> Option<Color> {
        if self.white.id.eq_ignore_ascii_case(user_id) {
            Some(Color::White)
        } else if self.black.id.eq_ignore_ascii_case(user_id) {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn player(&self, color: Color) -> &PlayerInfo {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }
}

/// Item yielded by a game update stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// Full game description (first item, and again after a reconnect)
    Full(Box<GameInfo>),
    /// Position update
    State(GameSnapshot),
    /// Keep-alive with no position change
    Heartbeat,
    /// Chat lines and other non-position notices
    Other,
}

/// Game the bot is currently playing, as listed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OngoingSession {
    pub id: SessionId,
    pub opponent: String,
    /// Remaining clock time for the bot (None for games without a clock)
    pub seconds_left: Option<u64>,
}

/// Bot account information
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
}

/// Parameters of an outbound challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundChallenge {
    pub variant: String,
    pub time_control: TimeControl,
    pub rated: bool,
}

/// Chat room for auxiliary messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRoom {
    Player,
    Spectator,
}

impl ChatRoom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRoom::Player => "player",
            ChatRoom::Spectator => "spectator",
        }
    }
}

/// Move chosen by the move-selection engine
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedMove {
    /// Move in UCI notation
    pub uci: String,
    /// Auxiliary prediction metadata (e.g. rating estimates)
    pub metrics: Option<serde_json::Value>,
}
