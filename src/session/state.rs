//! Per-session state kept across stream reconnects and retries

use std::time::Duration;

use crate::client::rules::RulesEngine;
use crate::client::types::{Color, GameInfo, GameSnapshot, SessionId, TimeControl};
use crate::config::SessionConfig;
use crate::session::SessionError;
use crate::util::Timer;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// What the runner knows about one game
#[derive(Debug, Clone)]
pub struct SessionState {
    session_id: SessionId,
    info: Option<GameInfo>,
    color: Option<Color>,
    snapshot: Option<GameSnapshot>,
    /// Move list of the last update that was fully handled
    handled_moves: Option<Vec<String>>,
    abort_deadline: Timer,
    terminate_deadline: Timer,
    disconnect_deadline: Timer,
    moves_submitted: usize,
}

impl SessionState {
    pub fn new(session_id: SessionId, config: &SessionConfig) -> Self {
        Self {
            session_id,
            info: None,
            color: None,
            snapshot: None,
            handled_moves: None,
            abort_deadline: Timer::new(config.abort_time),
            terminate_deadline: Timer::new(config.abort_time + config.terminate_grace),
            disconnect_deadline: Timer::new(config.disconnect_time),
            moves_submitted: 0,
        }
    }

    /// Take in the full game description sent at the start of every stream
    pub fn on_full(
        &mut self,
        info: GameInfo,
        bot_id: &str,
        config: &SessionConfig,
    ) -> Result<(), SessionError> {
        let color = info
            .color_of(bot_id)
            .ok_or_else(|| SessionError::NotAParticipant(info.id.clone()))?;
        let snapshot = info.state.clone();
        self.color = Some(color);
        self.info = Some(info);
        self.apply(snapshot, config);
        Ok(())
    }

    /// Replace the last-seen snapshot; deadlines restart when the position moved
    pub fn apply(&mut self, snapshot: GameSnapshot, config: &SessionConfig) {
        let position_changed = self
            .snapshot
            .as_ref()
            .map_or(true, |last| last.moves != snapshot.moves);
        self.snapshot = Some(snapshot);
        if position_changed {
            self.reset_deadlines(config);
        }
    }

    fn reset_deadlines(&mut self, config: &SessionConfig) {
        self.abort_deadline.reset_with(config.abort_time);
        self.terminate_deadline.reset_with(self.terminate_time(config));
        self.disconnect_deadline.reset_with(config.disconnect_time);
    }

    /// Inactivity allowance before the game is given up on
    fn terminate_time(&self, config: &SessionConfig) -> Duration {
        let Some(info) = &self.info else {
            return config.abort_time + config.terminate_grace;
        };
        match info.time_control {
            TimeControl::Clock { limit, increment } => {
                let (left, inc) = match (&self.snapshot, self.color) {
                    (Some(snapshot), Some(color)) if !snapshot.time_left(color).is_zero() => {
                        (snapshot.time_left(color), snapshot.increment(color))
                    }
                    _ => (limit, increment),
                };
                left + inc + config.abort_time + config.terminate_grace
            }
            TimeControl::Correspondence { days_per_turn } => {
                Duration::from_secs(u64::from(days_per_turn) * SECONDS_PER_DAY)
                    + config.terminate_grace
            }
            TimeControl::Unlimited => config.unlimited_terminate_time,
        }
    }

    /// The move list differs from the last handled update
    pub fn changed(&self) -> bool {
        match (&self.snapshot, &self.handled_moves) {
            (Some(snapshot), Some(handled)) => &snapshot.moves != handled,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Remember the current move list as handled
    pub fn mark_handled(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            self.handled_moves = Some(snapshot.moves.clone());
        }
    }

    pub fn record_move(&mut self) {
        self.moves_submitted += 1;
    }

    pub fn is_bot_turn(&self, rules: &dyn RulesEngine) -> bool {
        match (&self.info, &self.snapshot, self.color) {
            (Some(info), Some(snapshot), Some(color)) => rules.side_to_move(info, snapshot) == color,
            _ => false,
        }
    }

    pub fn is_terminal(&self, rules: &dyn RulesEngine) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|snapshot| rules.is_terminal(snapshot))
    }

    /// A new position with the bot on move that has not been answered yet
    pub fn should_request_move(&self, rules: &dyn RulesEngine) -> bool {
        !self.is_terminal(rules) && self.changed() && self.is_bot_turn(rules)
    }

    pub fn is_abortable(&self, rules: &dyn RulesEngine) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|snapshot| rules.is_abortable(snapshot))
    }

    pub fn abort_due(&self, rules: &dyn RulesEngine) -> bool {
        self.abort_deadline.is_expired() && self.is_abortable(rules)
    }

    pub fn terminate_due(&self) -> bool {
        self.terminate_deadline.is_expired()
    }

    /// Correspondence game idle on the opponent's side past the disconnect time
    pub fn disconnect_due(&self, rules: &dyn RulesEngine) -> bool {
        self.is_correspondence()
            && !self.should_request_move(rules)
            && self.disconnect_deadline.is_expired()
    }

    pub fn is_correspondence(&self) -> bool {
        self.info
            .as_ref()
            .is_some_and(|info| info.time_control.is_correspondence())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn info(&self) -> Option<&GameInfo> {
        self.info.as_ref()
    }

    pub fn snapshot(&self) -> Option<&GameSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn moves_submitted(&self) -> usize {
        self.moves_submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rules::ServerReportedRules;
    use crate::client::types::{GameStatus, PlayerInfo};

    fn info(time_control: TimeControl, moves: &[&str]) -> GameInfo {
        GameInfo {
            id: "g1".into(),
            white: PlayerInfo { id: "bot".into(), name: "Bot".into(), ..Default::default() },
            black: PlayerInfo { id: "alice".into(), name: "Alice".into(), ..Default::default() },
            variant: "standard".into(),
            initial_fen: "startpos".into(),
            time_control,
            state: GameSnapshot::with_moves(moves.iter().copied()),
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            abort_time: Duration::from_secs(20),
            terminate_grace: Duration::from_secs(60),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_changed_tracks_handled_moves() {
        let rules = ServerReportedRules;
        let mut state = SessionState::new("g1".into(), &config());
        state.on_full(info(TimeControl::clock(60, 0), &[]), "bot", &config()).unwrap();

        assert!(state.changed());
        assert!(state.should_request_move(&rules));

        state.mark_handled();
        assert!(!state.changed());
        assert!(!state.should_request_move(&rules));

        // Same position replayed after a reconnect
        state.apply(GameSnapshot::started(), &config());
        assert!(!state.should_request_move(&rules));

        state.apply(GameSnapshot::with_moves(["e2e4", "e7e5"]), &config());
        assert!(state.should_request_move(&rules));
    }

    #[test]
    fn test_not_a_participant() {
        let mut state = SessionState::new("g1".into(), &config());
        let result = state.on_full(info(TimeControl::Unlimited, &[]), "carol", &config());
        assert!(matches!(result, Err(SessionError::NotAParticipant(_))));
    }

    #[test]
    fn test_terminal_position() {
        let rules = ServerReportedRules;
        let mut state = SessionState::new("g1".into(), &config());
        state.on_full(info(TimeControl::clock(60, 0), &[]), "bot", &config()).unwrap();

        let mut over = GameSnapshot::with_moves(["f2f3", "e7e5", "g2g4", "d8h4"]);
        over.status = GameStatus::Mate;
        state.apply(over, &config());

        assert!(state.is_terminal(&rules));
        assert!(!state.should_request_move(&rules));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_deadline_resets_on_position_change() {
        let rules = ServerReportedRules;
        let mut state = SessionState::new("g1".into(), &config());
        state.on_full(info(TimeControl::clock(60, 0), &[]), "alice", &config()).unwrap();

        tokio::time::advance(Duration::from_secs(15)).await;
        state.apply(GameSnapshot::with_moves(["e2e4"]), &config());

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(!state.abort_due(&rules));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(state.abort_due(&rules));

        // Not abortable once both sides have moved
        state.apply(GameSnapshot::with_moves(["e2e4", "e7e5"]), &config());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!state.abort_due(&rules));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_deadline_from_clock() {
        let mut state = SessionState::new("g1".into(), &config());
        let mut game = info(TimeControl::clock(60, 2), &["e2e4", "e7e5"]);
        game.state.white_time = Duration::from_secs(40);
        game.state.white_increment = Duration::from_secs(2);
        state.on_full(game, "bot", &config()).unwrap();

        // 40s left + 2s increment + 20s abort time + 60s grace
        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(!state.terminate_due());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(state.terminate_due());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_only_for_correspondence() {
        let rules = ServerReportedRules;
        let cfg = SessionConfig {
            disconnect_time: Duration::from_secs(300),
            ..config()
        };

        let mut live = SessionState::new("g1".into(), &cfg);
        live.on_full(info(TimeControl::clock(600, 0), &["e2e4"]), "bot", &cfg).unwrap();

        let mut corr = SessionState::new("g2".into(), &cfg);
        corr.on_full(
            info(TimeControl::Correspondence { days_per_turn: 3 }, &["e2e4"]),
            "bot",
            &cfg,
        )
        .unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(!live.disconnect_due(&rules));
        assert!(corr.disconnect_due(&rules));
    }
}
