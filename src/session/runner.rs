//! Session runner
//!
//! Consumes one game's update stream. Position updates may trigger a move
//! request, heartbeats drive the inactivity checks, and stream interruptions
//! reopen the stream when the game is still alive. Each attempt is wrapped in
//! exponential backoff; the `SessionState` survives across attempts so moves
//! that were already submitted are never submitted twice.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::client::rules::RulesEngine;
use crate::client::types::{ChatRoom, SessionId, StreamItem, UserProfile};
use crate::client::{GameServer, MoveSelector, UpdateStream};
use crate::config::SessionConfig;
use crate::metrics::Metrics;
use crate::session::result::summarize;
use crate::session::state::SessionState;
use crate::session::{SessionError, SessionOutcome};
use crate::shutdown::{ShutdownState, ShutdownWatch};

/// Collaborators and settings shared by every runner
pub struct SessionContext {
    pub server: Arc<dyn GameServer>,
    pub rules: Arc<dyn RulesEngine>,
    pub selector: Arc<dyn MoveSelector>,
    pub profile: UserProfile,
    pub config: SessionConfig,
    /// Keep playing through a graceful shutdown
    pub drain_on_shutdown: bool,
    pub metrics: Arc<Metrics>,
}

/// Plays one session to completion
pub struct SessionRunner {
    ctx: Arc<SessionContext>,
    state: SessionState,
    shutdown: ShutdownWatch,
}

type Step = Result<Option<SessionOutcome>, SessionError>;

impl SessionRunner {
    pub fn new(ctx: Arc<SessionContext>, session_id: SessionId, shutdown: ShutdownWatch) -> Self {
        let state = SessionState::new(session_id, &ctx.config);
        Self {
            ctx,
            state,
            shutdown,
        }
    }

    /// Play until the game is over, retrying transient faults with backoff
    pub async fn run(mut self) -> SessionOutcome {
        let mut backoff = self.ctx.config.retry.start();

        let outcome = loop {
            match self.play().await {
                Ok(outcome) => break outcome,
                Err(e) if e.is_final() => {
                    warn!("Giving up on game {}: {}", self.state.session_id(), e);
                    break SessionOutcome::Failed(e.to_string());
                }
                Err(e) => {
                    let Some(delay) = backoff.next_delay() else {
                        warn!(
                            "Giving up on game {} after {} retries: {}",
                            self.state.session_id(),
                            backoff.attempts(),
                            e
                        );
                        break SessionOutcome::Failed(e.to_string());
                    };
                    Metrics::incr(&self.ctx.metrics.session_retries);
                    info!(
                        "Backing off {:.1} seconds after {} tries in game {}: {}",
                        delay.as_secs_f64(),
                        backoff.attempts(),
                        self.state.session_id(),
                        e
                    );
                    tokio::select! {
                        _ = self.shutdown.reached(ShutdownState::Immediate) => break SessionOutcome::Stopped,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        info!(
            "--- {} Game over ({:?}, {} moves played)",
            self.state.session_id(),
            outcome,
            self.state.moves_submitted()
        );
        outcome
    }

    /// One attempt: open the stream and follow it
    async fn play(&mut self) -> Result<SessionOutcome, SessionError> {
        let mut stream = self.open_stream().await?;
        let mut reconnects = self.ctx.config.retry.start();

        loop {
            if self.should_stop() {
                return Ok(SessionOutcome::Stopped);
            }

            let mut move_attempted = false;
            let next = tokio::select! {
                biased;
                _ = self.shutdown.changed() => continue,
                next = stream.next() => next,
            };

            let step = match next {
                Some(Ok(item)) => self.handle_item(item, &mut move_attempted).await,
                Some(Err(e)) => Err(e.into()),
                None => Err(SessionError::StreamEnded),
            };

            match step {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => reconnects.reset(),
                Err(e) if e.is_interruption() => {
                    if !move_attempted && !self.still_listed().await? {
                        debug!("Game {} is no longer listed: {}", self.state.session_id(), e);
                        return Ok(SessionOutcome::Closed);
                    }
                    let delay = reconnects
                        .next_delay()
                        .ok_or(SessionError::ReconnectExhausted)?;
                    info!(
                        "Reopening stream of game {} in {:.1} seconds: {}",
                        self.state.session_id(),
                        delay.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    Metrics::incr(&self.ctx.metrics.stream_reconnects);
                    stream = self.open_stream().await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn open_stream(&self) -> Result<UpdateStream, SessionError> {
        Ok(self
            .ctx
            .server
            .stream_updates(self.state.session_id())
            .await?)
    }

    fn should_stop(&self) -> bool {
        match self.shutdown.state() {
            ShutdownState::Running => false,
            ShutdownState::Graceful => !self.ctx.drain_on_shutdown,
            ShutdownState::Immediate => true,
        }
    }

    async fn handle_item(&mut self, item: StreamItem, move_attempted: &mut bool) -> Step {
        match item {
            StreamItem::Full(game) => {
                let first = self.state.info().is_none();
                self.state
                    .on_full(*game, &self.ctx.profile.id, &self.ctx.config)?;
                if first {
                    self.log_start();
                }
                self.on_position(move_attempted).await
            }
            StreamItem::State(snapshot) => {
                if self.state.info().is_none() {
                    return Err(SessionError::MissingGameInfo);
                }
                self.state.apply(snapshot, &self.ctx.config);
                self.on_position(move_attempted).await
            }
            StreamItem::Heartbeat => self.check_exit().await,
            StreamItem::Other => Ok(None),
        }
    }

    fn log_start(&self) {
        if let (Some(game), Some(color)) = (self.state.info(), self.state.color()) {
            let opponent = game.player(color.opposite());
            info!(
                "+++ Game {} ({:?}) vs {} ({})",
                game.id,
                game.time_control.speed(),
                opponent.name,
                opponent.rating.map_or("?".to_string(), |r| r.to_string())
            );
        }
    }

    async fn on_position(&mut self, move_attempted: &mut bool) -> Step {
        let rules = Arc::clone(&self.ctx.rules);

        if self.state.is_terminal(rules.as_ref()) {
            if let (Some(game), Some(snapshot)) = (self.state.info(), self.state.snapshot()) {
                for line in summarize(game, snapshot, rules.as_ref()) {
                    info!("{}", line);
                }
            }
            return Ok(Some(SessionOutcome::Finished));
        }

        if self.state.should_request_move(rules.as_ref()) {
            *move_attempted = true;
            self.play_move().await?;
        }
        self.state.mark_handled();
        Ok(None)
    }

    /// Ask the engine for a move and submit it
    async fn play_move(&mut self) -> Result<(), SessionError> {
        let ctx = Arc::clone(&self.ctx);
        let session_id = self.state.session_id().to_string();

        let selected = {
            let game = self.state.info().ok_or(SessionError::MissingGameInfo)?;
            let snapshot = self.state.snapshot().ok_or(SessionError::MissingGameInfo)?;
            info!("move: {}", snapshot.ply() / 2 + 1);

            let selected = match ctx.selector.select_move(game, &snapshot.moves).await {
                Ok(selected) => selected,
                Err(e) => {
                    Metrics::incr(&ctx.metrics.engine_errors);
                    return Err(e.into());
                }
            };
            if let Some(legal) = ctx.rules.legal_moves_from(game, snapshot) {
                if !legal.contains(&selected.uci) {
                    return Err(SessionError::IllegalMove(selected.uci));
                }
            }
            selected
        };

        ctx.server.make_move(&session_id, &selected.uci).await?;
        self.state.record_move();
        Metrics::incr(&ctx.metrics.moves_played);

        if ctx.config.publish_predictions {
            if let Some(predictions) = &selected.metrics {
                let text = predictions.to_string();
                if let Err(e) = ctx.server.send_chat(&session_id, ChatRoom::Player, &text).await {
                    debug!("Failed to publish predictions in game {}: {}", session_id, e);
                }
            }
        }

        if !ctx.config.rate_limiting_delay.is_zero() {
            tokio::time::sleep(ctx.config.rate_limiting_delay).await;
        }
        Ok(())
    }

    /// Inactivity checks run on every heartbeat
    async fn check_exit(&mut self) -> Step {
        if self.state.info().is_none() {
            return Ok(None);
        }
        let rules = Arc::clone(&self.ctx.rules);
        let session_id = self.state.session_id().to_string();

        if self.state.disconnect_due(rules.as_ref()) {
            info!("Stop tracking correspondence game {} until it is our move", session_id);
            return Ok(Some(SessionOutcome::Disconnected));
        }
        if self.state.abort_due(rules.as_ref()) {
            info!("Aborting {} by lack of activity", session_id);
            self.ctx.server.abort(&session_id).await?;
            Metrics::incr(&self.ctx.metrics.sessions_aborted);
            return Ok(Some(SessionOutcome::Aborted));
        }
        if self.state.terminate_due() {
            info!("Terminating {} by lack of activity", session_id);
            if self.state.is_abortable(rules.as_ref()) {
                self.ctx.server.abort(&session_id).await?;
                Metrics::incr(&self.ctx.metrics.sessions_aborted);
            }
            return Ok(Some(SessionOutcome::Terminated));
        }
        Ok(None)
    }

    async fn still_listed(&self) -> Result<bool, SessionError> {
        let ongoing = self.ctx.server.ongoing_sessions().await?;
        Ok(ongoing.iter().any(|s| s.id == self.state.session_id()))
    }
}
