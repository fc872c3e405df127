//! Rules engine boundary
//!
//! Legality and termination facts are produced by an external rules engine.
//! `ServerReportedRules` is the fallback used when no local engine is wired in:
//! it trusts the status reported by the server.

use crate::client::types::{Color, GameInfo, GameSnapshot, GameStatus};

/// How a finished game ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Mate,
    Resign,
    Abort,
    Draw,
    Timeout,
    Other(String),
}

impl Termination {
    /// Classify from the server-reported status (None while still playing)
    pub fn from_status(status: &GameStatus) -> Option<Self> {
        match status {
            GameStatus::Created | GameStatus::Started => None,
            GameStatus::Mate => Some(Termination::Mate),
            GameStatus::Resign => Some(Termination::Resign),
            GameStatus::Aborted => Some(Termination::Abort),
            GameStatus::Draw => Some(Termination::Draw),
            GameStatus::OutOfTime => Some(Termination::Timeout),
            other => Some(Termination::Other(other.as_str().to_string())),
        }
    }
}

/// Draw-by-rule facts about a final position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawFacts {
    pub fifty_moves: bool,
    pub repetition: bool,
    pub insufficient_material: bool,
    pub stalemate: bool,
}

/// Legality and termination facts for a game
pub trait RulesEngine: Send + Sync {
    /// Legal moves in the position, None when the engine cannot tell
    fn legal_moves_from(&self, game: &GameInfo, position: &GameSnapshot) -> Option<Vec<String>>;

    /// Whether the game is over
    fn is_terminal(&self, position: &GameSnapshot) -> bool {
        !position.status.is_ongoing()
    }

    /// Whether the game may still be aborted
    fn is_abortable(&self, position: &GameSnapshot) -> bool {
        position.ply() < 2
    }

    fn classify_termination(&self, position: &GameSnapshot) -> Option<Termination> {
        Termination::from_status(&position.status)
    }

    fn draw_facts(&self, game: &GameInfo, position: &GameSnapshot) -> DrawFacts;

    /// Side to move, honoring the side encoded in a custom initial position
    fn side_to_move(&self, game: &GameInfo, position: &GameSnapshot) -> Color {
        let first = match game.initial_fen.split_whitespace().nth(1) {
            Some("b") => Color::Black,
            _ => Color::White,
        };
        if position.ply() % 2 == 0 {
            first
        } else {
            first.opposite()
        }
    }
}

/// Rules that rely on the server for everything it reports
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerReportedRules;

impl RulesEngine for ServerReportedRules {
    fn legal_moves_from(&self, _game: &GameInfo, _position: &GameSnapshot) -> Option<Vec<String>> {
        None
    }

    fn draw_facts(&self, _game: &GameInfo, position: &GameSnapshot) -> DrawFacts {
        DrawFacts {
            stalemate: position.status == GameStatus::Stalemate,
            ..DrawFacts::default()
        }
    }
}
