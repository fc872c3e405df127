//! Outbound challenges
//!
//! When the bot sits idle it challenges one of the configured opponents.
//! At most one outbound challenge is pending at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::client::types::{OutboundChallenge, SessionId};
use crate::client::GameServer;
use crate::config::MatchmakingConfig;
use crate::metrics::Metrics;
use crate::util::Timer;

/// Outbound challenge waiting for an answer
#[derive(Debug, Clone)]
struct Pending {
    challenge_id: String,
    opponent: String,
    expires: Timer,
}

pub struct Matchmaker {
    config: MatchmakingConfig,
    bot_id: String,
    last_challenge: Timer,
    last_game_ended: Timer,
    pending: Option<Pending>,
    /// Opponents that declined, skipped until their timer expires
    declined: HashMap<String, Timer>,
    /// Opponents of running sessions we started
    playing: HashMap<SessionId, String>,
    rng: StdRng,
    metrics: Arc<Metrics>,
}

impl Matchmaker {
    pub fn new(config: MatchmakingConfig, bot_id: &str, metrics: Arc<Metrics>) -> Self {
        Self::with_rng(config, bot_id, metrics, StdRng::from_entropy())
    }

    pub fn with_rng(
        config: MatchmakingConfig,
        bot_id: &str,
        metrics: Arc<Metrics>,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            bot_id: bot_id.to_string(),
            last_challenge: Timer::expired(),
            last_game_ended: Timer::expired(),
            pending: None,
            declined: HashMap::new(),
            playing: HashMap::new(),
            rng,
            metrics,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Time until the cadence allows another outbound challenge
    pub fn earliest_challenge_in(&self) -> Duration {
        self.last_challenge
            .time_until_expiration()
            .max(self.last_game_ended.time_until_expiration())
    }

    pub fn show_earliest_challenge_time(&self) {
        if !self.is_enabled() {
            return;
        }
        let wait = self.earliest_challenge_in();
        if wait.is_zero() {
            info!("Next outbound challenge can be sent now");
        } else {
            info!("Next outbound challenge in {}s", wait.as_secs());
        }
    }

    /// Issue at most one outbound challenge, returning its id
    pub async fn challenge(
        &mut self,
        server: &dyn GameServer,
        active: usize,
        pending_incoming: usize,
        max_concurrency: usize,
    ) -> Option<String> {
        if !self.is_enabled() || active >= max_concurrency || pending_incoming > 0 {
            return None;
        }
        self.expire_pending();
        if self.pending.is_some() || self.earliest_challenge_in() > Duration::ZERO {
            return None;
        }

        let opponent = self.pick_opponent()?;
        let request = OutboundChallenge {
            variant: self.config.variant.clone(),
            time_control: self.config.time_control,
            rated: self.config.rated,
        };

        // Failed attempts also wait out the delay
        self.last_challenge.reset_with(self.config.challenge_delay);

        info!("Challenging {}", opponent);
        match server.create_challenge(&opponent, &request).await {
            Ok(challenge_id) => {
                Metrics::incr(&self.metrics.outbound_challenges);
                self.pending = Some(Pending {
                    challenge_id: challenge_id.clone(),
                    opponent,
                    expires: Timer::new(self.config.challenge_timeout),
                });
                Some(challenge_id)
            }
            Err(e) => {
                warn!("Could not challenge {}: {}", opponent, e);
                None
            }
        }
    }

    /// Random configured opponent that has not declined recently and is not playing us
    fn pick_opponent(&mut self) -> Option<String> {
        self.declined.retain(|_, timer| !timer.is_expired());

        let candidates: Vec<&String> = self
            .config
            .opponents
            .iter()
            .filter(|name| !name.eq_ignore_ascii_case(&self.bot_id))
            .filter(|name| !self.declined.contains_key(&name.to_lowercase()))
            .filter(|name| {
                !self
                    .playing
                    .values()
                    .any(|opponent| opponent.eq_ignore_ascii_case(name))
            })
            .collect();

        match candidates.choose(&mut self.rng) {
            Some(name) => Some((*name).clone()),
            None => {
                debug!("No opponent available to challenge");
                None
            }
        }
    }

    fn expire_pending(&mut self) {
        if let Some(pending) = self.pending.as_ref().filter(|p| p.expires.is_expired()) {
            info!(
                "Challenge {} to {} got no answer",
                pending.challenge_id, pending.opponent
            );
            self.pending = None;
        }
    }

    fn take_pending(&mut self, challenge_id: &str) -> Option<Pending> {
        if self.pending.as_ref()?.challenge_id == challenge_id {
            self.pending.take()
        } else {
            None
        }
    }

    /// A session started; it belongs to us when it answers our pending challenge
    pub fn on_accepted(&mut self, session_id: &str) {
        let Some(pending) = self.take_pending(session_id) else {
            return;
        };
        info!("{} accepted challenge {}", pending.opponent, session_id);
        self.playing.insert(session_id.to_string(), pending.opponent);
    }

    /// The peer refused our challenge; skip them for the decline cooldown
    pub fn on_declined(&mut self, challenge_id: &str, decliner: Option<&str>) {
        let pending = self.take_pending(challenge_id);
        let Some(opponent) = decliner
            .map(str::to_string)
            .or_else(|| pending.map(|p| p.opponent))
        else {
            return;
        };

        info!(
            "{} declined challenge {}, skipping them for {}s",
            opponent,
            challenge_id,
            self.config.decline_cooldown.as_secs()
        );
        self.declined.insert(
            opponent.to_lowercase(),
            Timer::new(self.config.decline_cooldown),
        );
    }

    /// A session finished; wait the post-game delay before challenging again
    pub fn game_done(&mut self, session_id: &str) {
        self.playing.remove(session_id);
        self.last_game_ended.reset_with(self.config.post_game_delay);
    }

    pub fn pending_challenge(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.challenge_id.as_str())
    }

    pub fn is_declined(&self, opponent: &str) -> bool {
        self.declined
            .get(&opponent.to_lowercase())
            .is_some_and(|timer| !timer.is_expired())
    }
}
