//! Control dispatcher
//!
//! The single consumer of the control queue. Each event is handled in turn,
//! then maintenance runs in a fixed order: low-time sessions, queued
//! challenges, matchmaking and the online check. All bookkeeping lives here;
//! session workers only ever talk back through the queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::challenge::model::{Challenge, ChallengePayload, DeclineReason};
use crate::challenge::ChallengeRegistry;
use crate::client::types::{SessionId, UserProfile};
use crate::client::GameServer;
use crate::config::BotConfig;
use crate::control::event::{ControlEvent, ControlReceiver, ControlSender};
use crate::matchmaking::Matchmaker;
use crate::metrics::Metrics;
use crate::scheduler::{SessionFactory, SessionScheduler};
use crate::session::SessionOutcome;
use crate::shutdown::{ShutdownState, ShutdownWatch};
use crate::util::Timer;

/// What the loop does after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Continue,
    /// Keep handling events until the active set empties
    Drain,
    Stop,
}

/// How the dispatch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// The orchestrator should be started again
    pub restart: bool,
}

pub struct Dispatcher {
    server: Arc<dyn GameServer>,
    profile: UserProfile,
    registry: ChallengeRegistry,
    scheduler: SessionScheduler,
    matchmaker: Matchmaker,
    online_check: Timer,
    drain_on_shutdown: bool,
    single_session: bool,
    draining: bool,
    restart: bool,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        config: &BotConfig,
        server: Arc<dyn GameServer>,
        profile: UserProfile,
        factory: Arc<dyn SessionFactory>,
        control: ControlSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        let scheduler = SessionScheduler::new(
            config.challenge.concurrency,
            config.challenge.accept_timeout,
            factory,
            control,
            Arc::clone(&metrics),
        );
        let matchmaker = Matchmaker::new(
            config.matchmaking.clone(),
            &profile.id,
            Arc::clone(&metrics),
        );

        Self {
            server,
            profile,
            registry: ChallengeRegistry::new(config.challenge.clone()),
            scheduler,
            matchmaker,
            online_check: Timer::new(config.online_check_interval),
            drain_on_shutdown: config.quit_after_all_games_finish,
            single_session: config.single_session,
            draining: false,
            restart: false,
            metrics,
        }
    }

    /// Run until stopped, restarted or the queue closes
    pub async fn run(mut self, mut events: ControlReceiver, mut shutdown: ShutdownWatch) -> RunOutcome {
        self.resume_ongoing().await;
        self.matchmaker.show_earliest_challenge_time();
        if self.drain_on_shutdown {
            info!("When quitting, running games are finished first. Press Ctrl-C twice to quit immediately.");
        }

        let mut signal = match shutdown.state() {
            ShutdownState::Running => ControlSignal::Continue,
            state => self.on_shutdown(state),
        };

        while signal != ControlSignal::Stop {
            let event = tokio::select! {
                biased;
                state = shutdown.changed() => {
                    signal = self.on_shutdown(state);
                    continue;
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                warn!("Control queue closed");
                self.restart = true;
                break;
            };

            let started = Instant::now();
            signal = self.dispatch(event).await;
            self.metrics.record_dispatch_time(started.elapsed());
        }

        self.close(&mut shutdown).await;
        RunOutcome {
            restart: self.restart,
        }
    }

    /// React to a shutdown stage change
    fn on_shutdown(&mut self, state: ShutdownState) -> ControlSignal {
        match state {
            ShutdownState::Running => ControlSignal::Continue,
            ShutdownState::Graceful if self.drain_on_shutdown => {
                self.draining = true;
                self.drain_step()
            }
            ShutdownState::Graceful | ShutdownState::Immediate => {
                info!("Terminating");
                ControlSignal::Stop
            }
        }
    }

    fn drain_step(&mut self) -> ControlSignal {
        self.scheduler.release_stale_reservations();
        if self.scheduler.active_count() == 0 {
            ControlSignal::Stop
        } else {
            info!(
                "Waiting for {} games to finish before quitting",
                self.scheduler.active_count()
            );
            ControlSignal::Drain
        }
    }

    /// Handle one event, then run maintenance
    pub(crate) async fn dispatch(&mut self, event: ControlEvent) -> ControlSignal {
        Metrics::incr(&self.metrics.events_dispatched);
        if event != ControlEvent::Ping {
            debug!("Event: {}", event.kind());
        }

        match event {
            ControlEvent::Terminated { error } => {
                debug!("Event source terminated: {}", error.as_deref().unwrap_or("no error"));
                self.restart = true;
                return ControlSignal::Stop;
            }
            ControlEvent::SessionCompleted {
                session_id,
                outcome,
            } => {
                if self.on_session_completed(&session_id, &outcome) {
                    return ControlSignal::Stop;
                }
            }
            ControlEvent::ChallengeReceived(payload) => self.on_challenge(payload).await,
            ControlEvent::ChallengeCanceled { challenge_id } => {
                if let Some(challenge) = self.registry.remove(&challenge_id) {
                    info!("Challenge {} was canceled", challenge);
                }
            }
            ControlEvent::ChallengeDeclinedByPeer {
                challenge_id,
                decliner,
            } => self.matchmaker.on_declined(&challenge_id, decliner.as_deref()),
            ControlEvent::SessionStart { session_id } => {
                self.matchmaker.on_accepted(&session_id);
                self.scheduler.admit(session_id);
            }
            ControlEvent::Ping => {}
            ControlEvent::Ignored { kind } => debug!("Ignoring {} event", kind),
        }

        if self.draining {
            return self.drain_step();
        }

        self.maintain().await;
        if self.restart {
            ControlSignal::Stop
        } else {
            ControlSignal::Continue
        }
    }

    /// Returns true when the loop should stop
    fn on_session_completed(&mut self, session_id: &SessionId, outcome: &SessionOutcome) -> bool {
        if outcome.is_failure() {
            warn!("Game {} ended with {:?}", session_id, outcome);
        } else {
            debug!("Game {} ended with {:?}", session_id, outcome);
        }
        self.scheduler.complete(session_id, outcome);
        self.matchmaker.game_done(session_id);

        if self.single_session {
            info!("Single session completed, stopping");
            return true;
        }
        false
    }

    async fn on_challenge(&mut self, payload: ChallengePayload) {
        Metrics::incr(&self.metrics.challenges_received);
        let challenge = Challenge::from_payload(payload, &self.profile);
        if challenge.from_self {
            return;
        }

        if self.draining {
            info!("Decline {} while shutting down", challenge);
            self.decline(&challenge, DeclineReason::Later).await;
            return;
        }

        let opponent_load = self.opponent_load().await;
        let description = challenge.to_string();
        let declined = challenge.clone();

        match self.registry.handle_challenge(challenge, &opponent_load) {
            Ok(()) => debug!("Queued {}", description),
            Err(rejection) => {
                let reason = rejection.decline_reason();
                info!("Decline {} for reason '{}': {}", description, reason, rejection);
                self.decline(&declined, reason).await;
            }
        }
    }

    async fn decline(&self, challenge: &Challenge, reason: DeclineReason) {
        Metrics::incr(&self.metrics.challenges_declined);
        if let Err(e) = self.server.decline_challenge(&challenge.id, reason).await {
            warn!("Could not decline {}: {}", challenge.id, e);
        }
    }

    /// Running games per opponent name, as the server lists them
    async fn opponent_load(&self) -> HashMap<String, usize> {
        let mut load = HashMap::new();
        match self.server.ongoing_sessions().await {
            Ok(sessions) => {
                for session in sessions {
                    *load.entry(session.opponent).or_insert(0) += 1;
                }
            }
            Err(e) => warn!("Could not list ongoing games: {}", e),
        }
        load
    }

    /// Maintenance run after every event, always in this order
    async fn maintain(&mut self) {
        let failures = self
            .scheduler
            .tick(&mut self.registry, self.server.as_ref())
            .await;
        for failure in failures {
            warn!(
                "Could not accept challenge {}: {}",
                failure.challenge_id, failure.error
            );
        }

        self.matchmaker
            .challenge(
                self.server.as_ref(),
                self.scheduler.active_count(),
                self.registry.len(),
                self.scheduler.max_concurrency(),
            )
            .await;

        self.check_online_status().await;
    }

    /// Restart when the server no longer sees the bot online
    async fn check_online_status(&mut self) {
        if !self.online_check.is_expired() {
            return;
        }
        match self.server.is_online(&self.profile.id).await {
            Ok(online) => {
                if !online {
                    info!("Server reports the bot offline, will restart");
                    self.restart = true;
                }
                self.online_check.reset();
            }
            Err(e) => warn!("Online check failed: {}", e),
        }
    }

    /// Queue games already in progress so they are resumed first
    async fn resume_ongoing(&mut self) {
        match self.server.ongoing_sessions().await {
            Ok(sessions) => {
                for session in &sessions {
                    if self.scheduler.enqueue_low_time(session) {
                        info!("Found ongoing game {} against {}", session.id, session.opponent);
                    }
                }
            }
            Err(e) => warn!("Could not list ongoing games: {}", e),
        }
    }

    /// Stop the worker pool according to the shutdown stage
    async fn close(&mut self, shutdown: &mut ShutdownWatch) {
        let wait = self.draining && !shutdown.is_immediate();
        let pool = self.scheduler.pool_mut();
        pool.close();

        if wait {
            tokio::select! {
                _ = pool.join() => {}
                _ = shutdown.reached(ShutdownState::Immediate) => pool.abort_all(),
            }
        } else {
            pool.abort_all();
        }
    }

    pub fn scheduler(&self) -> &SessionScheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &ChallengeRegistry {
        &self.registry
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }
}
