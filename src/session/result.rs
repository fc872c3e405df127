//! Human-readable game result lines

use std::time::Duration;

use crate::client::rules::{RulesEngine, Termination};
use crate::client::types::{Color, GameInfo, GameSnapshot};

/// Result lines for a finished game: the outcome, then how it ended
pub fn summarize(info: &GameInfo, snapshot: &GameSnapshot, rules: &dyn RulesEngine) -> Vec<String> {
    let mut lines = Vec::with_capacity(2);
    let termination = rules.classify_termination(snapshot);

    let winner = snapshot.winner;
    let winning_name = &info.player(winner.unwrap_or(Color::Black)).name;
    let losing_name = &info.player(winner.map_or(Color::White, Color::opposite)).name;

    match (winner, &termination) {
        (Some(_), _) => lines.push(format!("{} won!", winning_name)),
        (None, Some(Termination::Draw | Termination::Timeout)) => {
            lines.push("Game ended in a draw.".to_string())
        }
        _ => lines.push("Game adjourned.".to_string()),
    }

    let detail = match termination {
        Some(Termination::Mate) => Some("Game won by checkmate.".to_string()),
        Some(Termination::Resign) => Some(format!("{} resigned.", losing_name)),
        Some(Termination::Abort) => Some("Game aborted.".to_string()),
        Some(Termination::Draw) => {
            let facts = rules.draw_facts(info, snapshot);
            let reason = if facts.fifty_moves {
                "Game drawn by 50-move rule."
            } else if facts.repetition {
                "Game drawn by threefold repetition."
            } else if facts.insufficient_material {
                "Game drawn from insufficient material."
            } else if facts.stalemate {
                "Game drawn by stalemate."
            } else {
                "Game drawn by agreement."
            };
            Some(reason.to_string())
        }
        Some(Termination::Timeout) => Some(if winner.is_some() {
            format!("{} forfeited on time.", losing_name)
        } else {
            let flagged = if snapshot.white_time == Duration::ZERO {
                Color::White
            } else {
                Color::Black
            };
            format!(
                "{} ran out of time, but {} did not have enough material to mate.",
                info.player(flagged).name,
                info.player(flagged.opposite()).name
            )
        }),
        Some(Termination::Other(status)) => Some(format!("Game ended by {}", status)),
        None => None,
    };
    lines.extend(detail);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rules::{DrawFacts, ServerReportedRules};
    use crate::client::types::{GameStatus, PlayerInfo, TimeControl};

    fn game() -> GameInfo {
        GameInfo {
            id: "g".into(),
            white: PlayerInfo { id: "w".into(), name: "Whitey".into(), ..Default::default() },
            black: PlayerInfo { id: "b".into(), name: "Blacky".into(), ..Default::default() },
            variant: "standard".into(),
            initial_fen: "startpos".into(),
            time_control: TimeControl::clock(60, 0),
            state: GameSnapshot::started(),
        }
    }

    fn snapshot(status: GameStatus, winner: Option<Color>) -> GameSnapshot {
        GameSnapshot {
            status,
            winner,
            white_time: Duration::from_secs(5),
            black_time: Duration::from_secs(5),
            ..GameSnapshot::started()
        }
    }

    struct RepetitionRules;

    impl RulesEngine for RepetitionRules {
        fn legal_moves_from(&self, _: &GameInfo, _: &GameSnapshot) -> Option<Vec<String>> {
            None
        }

        fn draw_facts(&self, _: &GameInfo, _: &GameSnapshot) -> DrawFacts {
            DrawFacts {
                repetition: true,
                stalemate: true,
                ..DrawFacts::default()
            }
        }
    }

    #[test]
    fn test_decisive_results() {
        let rules = ServerReportedRules;
        assert_eq!(
            summarize(&game(), &snapshot(GameStatus::Mate, Some(Color::White)), &rules),
            ["Whitey won!", "Game won by checkmate."]
        );
        assert_eq!(
            summarize(&game(), &snapshot(GameStatus::Resign, Some(Color::Black)), &rules),
            ["Blacky won!", "Whitey resigned."]
        );
        assert_eq!(
            summarize(&game(), &snapshot(GameStatus::OutOfTime, Some(Color::White)), &rules),
            ["Whitey won!", "Blacky forfeited on time."]
        );
    }

    #[test]
    fn test_draws() {
        assert_eq!(
            summarize(&game(), &snapshot(GameStatus::Draw, None), &ServerReportedRules),
            ["Game ended in a draw.", "Game drawn by agreement."]
        );
        // First applicable reason wins
        assert_eq!(
            summarize(&game(), &snapshot(GameStatus::Draw, None), &RepetitionRules),
            ["Game ended in a draw.", "Game drawn by threefold repetition."]
        );

        let mut flagged = snapshot(GameStatus::OutOfTime, None);
        flagged.black_time = Duration::ZERO;
        assert_eq!(
            summarize(&game(), &flagged, &ServerReportedRules),
            [
                "Game ended in a draw.",
                "Blacky ran out of time, but Whitey did not have enough material to mate."
            ]
        );
    }

    #[test]
    fn test_other_endings() {
        let rules = ServerReportedRules;
        assert_eq!(
            summarize(&game(), &snapshot(GameStatus::Aborted, None), &rules),
            ["Game adjourned.", "Game aborted."]
        );
        assert_eq!(
            summarize(&game(), &snapshot(GameStatus::Stalemate, None), &rules),
            ["Game adjourned.", "Game ended by stalemate"]
        );
        assert_eq!(
            summarize(&game(), &snapshot(GameStatus::Started, None), &rules),
            ["Game adjourned."]
        );
    }
}
