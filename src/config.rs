use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::client::types::{Speed, TimeControl};
use crate::session::retry::RetryPolicy;

/// Challenge ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Accept in arrival order
    First,
    /// Accept the highest-scoring challenge first
    Best,
}

/// Opponent type to cluster first in the challenge queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    None,
    Human,
    Bot,
}

/// Challenge acceptance configuration
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Maximum number of concurrent sessions
    pub concurrency: usize,
    pub sort_by: SortBy,
    pub preference: Preference,
    /// Accepted variant keys
    pub variants: Vec<String>,
    /// Accepted speed categories
    pub speeds: Vec<Speed>,
    pub accept_rated: bool,
    pub accept_casual: bool,
    /// Accept challenges from bots
    pub accept_bot: bool,
    /// Accept challenges from bots only
    pub only_bot: bool,
    pub min_base: Duration,
    pub max_base: Duration,
    pub min_increment: Duration,
    pub max_increment: Duration,
    pub min_days: u32,
    pub max_days: u32,
    pub min_rating: Option<u32>,
    pub max_rating: Option<u32>,
    /// Challengers that are always declined
    pub block_list: Vec<String>,
    /// Maximum concurrent games against a single challenger
    pub max_simultaneous_games_per_user: usize,
    /// Rolling window for repeat bot challenges (None disables the check)
    pub recent_bot_challenge_age: Option<Duration>,
    /// Accepted bot challenges per challenger within the window
    pub max_recent_bot_challenges: usize,
    /// Release the slot of an accepted challenge whose game never starts
    pub accept_timeout: Duration,
    /// Score added to human challengers when sorting by best
    pub human_bonus: i64,
    /// Prefer challengers close to this rating when sorting by best
    pub target_rating: Option<u32>,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            sort_by: SortBy::First,
            preference: Preference::None,
            variants: vec!["standard".to_string()],
            speeds: vec![Speed::Bullet, Speed::Blitz, Speed::Rapid, Speed::Classical],
            accept_rated: true,
            accept_casual: true,
            accept_bot: true,
            only_bot: false,
            min_base: Duration::ZERO,
            max_base: Duration::from_secs(3 * 60 * 60),
            min_increment: Duration::ZERO,
            max_increment: Duration::from_secs(180),
            min_days: 1,
            max_days: 14,
            min_rating: None,
            max_rating: None,
            block_list: Vec::new(),
            max_simultaneous_games_per_user: 5,
            recent_bot_challenge_age: None,
            max_recent_bot_challenges: 1,
            accept_timeout: Duration::from_secs(120),
            human_bonus: 0,
            target_rating: None,
        }
    }
}

/// Per-session behavior
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Abort an abortable game after this long without a move
    pub abort_time: Duration,
    /// Pause after each submitted move
    pub rate_limiting_delay: Duration,
    /// Stop tracking a correspondence game after this long off-move
    pub disconnect_time: Duration,
    /// Terminate deadline for games without a clock
    pub unlimited_terminate_time: Duration,
    /// Extra slack added to the clock-derived terminate deadline
    pub terminate_grace: Duration,
    /// Publish the engine's auxiliary predictions to the player chat
    pub publish_predictions: bool,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            abort_time: Duration::from_secs(20),
            rate_limiting_delay: Duration::ZERO,
            disconnect_time: Duration::from_secs(5 * 60),
            unlimited_terminate_time: Duration::from_secs(60 * 60),
            terminate_grace: Duration::from_secs(60),
            publish_predictions: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outbound challenge configuration
#[derive(Debug, Clone)]
pub struct MatchmakingConfig {
    pub enabled: bool,
    /// Candidate opponents
    pub opponents: Vec<String>,
    /// Minimum time between outbound challenges
    pub challenge_delay: Duration,
    /// Minimum time after a game ends before challenging again
    pub post_game_delay: Duration,
    /// How long an opponent who declined is skipped
    pub decline_cooldown: Duration,
    /// Pending outbound challenge is forgotten after this long
    pub challenge_timeout: Duration,
    pub variant: String,
    pub time_control: TimeControl,
    pub rated: bool,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            opponents: Vec::new(),
            challenge_delay: Duration::from_secs(30 * 60),
            post_game_delay: Duration::from_secs(60),
            decline_cooldown: Duration::from_secs(60 * 60),
            challenge_timeout: Duration::from_secs(30),
            variant: "standard".to_string(),
            time_control: TimeControl::clock(180, 2),
            rated: true,
        }
    }
}

/// Bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Base URL of the game server API
    pub server_url: String,
    /// API token for the bot account
    pub token: String,
    /// Move-selection inference endpoint
    pub engine_url: String,
    /// Address of the local webhook receiver
    pub webhook_addr: SocketAddr,
    /// Port of the metrics endpoint (None disables it)
    pub metrics_port: Option<u16>,
    /// On the first shutdown signal, let running sessions finish
    pub quit_after_all_games_finish: bool,
    /// Stop after the first completed session
    pub single_session: bool,
    /// Restart the orchestrator when it asks for it
    pub restart_enabled: bool,
    pub restart_delay: Duration,
    /// How often to confirm the server still sees the bot online
    pub online_check_interval: Duration,
    pub challenge: ChallengeConfig,
    pub session: SessionConfig,
    pub matchmaking: MatchmakingConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            server_url: "https://lichess.org".to_string(),
            token: String::new(),
            engine_url: "http://127.0.0.1:8000/predict".to_string(),
            webhook_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 5001)),
            metrics_port: Some(9090),
            quit_after_all_games_finish: false,
            single_session: false,
            restart_enabled: true,
            restart_delay: Duration::from_secs(10),
            online_check_interval: Duration::from_secs(60 * 60),
            challenge: ChallengeConfig::default(),
            session: SessionConfig::default(),
            matchmaking: MatchmakingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("API token is not set")]
    MissingToken,
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("{0} minimum exceeds maximum")]
    InvertedBounds(&'static str),
    #[error("bots are refused but only bots are accepted")]
    ContradictoryBotRules,
    #[error("neither rated nor casual challenges are accepted")]
    NoModes,
    #[error("matchmaking is enabled without opponents")]
    NoOpponents,
}

/// Read and parse an environment variable, warning on invalid values
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    Some(
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

impl BotConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SERVER_URL") {
            config.server_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(token) = std::env::var("API_TOKEN") {
            config.token = token;
        }
        if let Ok(url) = std::env::var("ENGINE_URL") {
            config.engine_url = url;
        }
        if let Some(addr) = env_parse("WEBHOOK_ADDR") {
            config.webhook_addr = addr;
        }
        if let Ok(port) = std::env::var("METRICS_PORT") {
            match port.parse::<u16>() {
                Ok(0) => config.metrics_port = None,
                Ok(parsed) => config.metrics_port = Some(parsed),
                Err(_) => tracing::warn!("Invalid METRICS_PORT '{}', using default", port),
            }
        }
        if let Some(flag) = env_parse("QUIT_AFTER_ALL_GAMES_FINISH") {
            config.quit_after_all_games_finish = flag;
        }
        if let Some(flag) = env_parse("SINGLE_SESSION") {
            config.single_session = flag;
        }
        if let Some(flag) = env_parse("RESTART_ENABLED") {
            config.restart_enabled = flag;
        }
        if let Some(secs) = env_secs("ONLINE_CHECK_INTERVAL_SECS") {
            config.online_check_interval = secs;
        }

        config.load_challenge_env();
        config.load_session_env();
        config.load_matchmaking_env();
        config
    }

    fn load_challenge_env(&mut self) {
        let challenge = &mut self.challenge;

        if let Some(concurrency) = env_parse::<usize>("CONCURRENCY") {
            if (1..=64).contains(&concurrency) {
                challenge.concurrency = concurrency;
            } else {
                tracing::warn!("CONCURRENCY must be 1-64, using default");
            }
        }
        if let Ok(sort_by) = std::env::var("SORT_BY") {
            match sort_by.as_str() {
                "best" => challenge.sort_by = SortBy::Best,
                "first" => challenge.sort_by = SortBy::First,
                _ => tracing::warn!("Invalid SORT_BY '{}', using default", sort_by),
            }
        }
        if let Ok(preference) = std::env::var("PREFERENCE") {
            match preference.as_str() {
                "none" => challenge.preference = Preference::None,
                "human" => challenge.preference = Preference::Human,
                "bot" => challenge.preference = Preference::Bot,
                _ => tracing::warn!("Invalid PREFERENCE '{}', using default", preference),
            }
        }
        if let Some(variants) = env_list("ACCEPT_VARIANTS") {
            challenge.variants = variants;
        }
        if let Some(speeds) = env_list("ACCEPT_SPEEDS") {
            challenge.speeds = speeds
                .iter()
                .filter_map(|name| {
                    let speed = Speed::parse(name);
                    if speed.is_none() {
                        tracing::warn!("Ignoring unknown speed '{}'", name);
                    }
                    speed
                })
                .collect();
        }
        if let Some(flag) = env_parse("ACCEPT_RATED") {
            challenge.accept_rated = flag;
        }
        if let Some(flag) = env_parse("ACCEPT_CASUAL") {
            challenge.accept_casual = flag;
        }
        if let Some(flag) = env_parse("ACCEPT_BOT") {
            challenge.accept_bot = flag;
        }
        if let Some(flag) = env_parse("ONLY_BOT") {
            challenge.only_bot = flag;
        }
        if let Some(secs) = env_secs("MIN_BASE_SECS") {
            challenge.min_base = secs;
        }
        if let Some(secs) = env_secs("MAX_BASE_SECS") {
            challenge.max_base = secs;
        }
        if let Some(secs) = env_secs("MIN_INCREMENT_SECS") {
            challenge.min_increment = secs;
        }
        if let Some(secs) = env_secs("MAX_INCREMENT_SECS") {
            challenge.max_increment = secs;
        }
        if let Some(days) = env_parse("MIN_DAYS") {
            challenge.min_days = days;
        }
        if let Some(days) = env_parse("MAX_DAYS") {
            challenge.max_days = days;
        }
        if let Some(rating) = env_parse("MIN_RATING") {
            challenge.min_rating = Some(rating);
        }
        if let Some(rating) = env_parse("MAX_RATING") {
            challenge.max_rating = Some(rating);
        }
        if let Some(block_list) = env_list("BLOCK_LIST") {
            challenge.block_list = block_list;
        }
        if let Some(games) = env_parse("MAX_SIMULTANEOUS_GAMES_PER_USER") {
            challenge.max_simultaneous_games_per_user = games;
        }
        if let Some(secs) = env_secs("RECENT_BOT_CHALLENGE_AGE_SECS") {
            challenge.recent_bot_challenge_age = Some(secs);
        }
        if let Some(count) = env_parse("MAX_RECENT_BOT_CHALLENGES") {
            challenge.max_recent_bot_challenges = count;
        }
        if let Some(secs) = env_secs("ACCEPT_TIMEOUT_SECS") {
            challenge.accept_timeout = secs;
        }
        if let Some(bonus) = env_parse("HUMAN_BONUS") {
            challenge.human_bonus = bonus;
        }
        if let Some(rating) = env_parse("TARGET_RATING") {
            challenge.target_rating = Some(rating);
        }
    }

    fn load_session_env(&mut self) {
        let session = &mut self.session;

        if let Some(secs) = env_secs("ABORT_TIME_SECS") {
            session.abort_time = secs;
        }
        if let Some(ms) = env_parse::<u64>("RATE_LIMITING_DELAY_MS") {
            session.rate_limiting_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_secs("DISCONNECT_TIME_SECS") {
            session.disconnect_time = secs;
        }
        if let Some(secs) = env_secs("UNLIMITED_TERMINATE_TIME_SECS") {
            session.unlimited_terminate_time = secs;
        }
        if let Some(flag) = env_parse("PUBLISH_PREDICTIONS") {
            session.publish_predictions = flag;
        }
        if let Some(secs) = env_secs("RETRY_MAX_ELAPSED_SECS") {
            session.retry.max_elapsed = secs;
        }
    }

    fn load_matchmaking_env(&mut self) {
        let matchmaking = &mut self.matchmaking;

        if let Some(flag) = env_parse("MATCHMAKING_ENABLED") {
            matchmaking.enabled = flag;
        }
        if let Some(opponents) = env_list("MATCHMAKING_OPPONENTS") {
            matchmaking.opponents = opponents;
        }
        if let Some(secs) = env_secs("MATCHMAKING_DELAY_SECS") {
            matchmaking.challenge_delay = secs;
        }
        if let Some(secs) = env_secs("MATCHMAKING_POST_GAME_DELAY_SECS") {
            matchmaking.post_game_delay = secs;
        }
        if let Some(secs) = env_secs("MATCHMAKING_DECLINE_COOLDOWN_SECS") {
            matchmaking.decline_cooldown = secs;
        }
        if let Ok(variant) = std::env::var("MATCHMAKING_VARIANT") {
            matchmaking.variant = variant;
        }
        if let (Some(limit), Some(increment)) = (
            env_parse::<u64>("MATCHMAKING_CLOCK_LIMIT_SECS"),
            env_parse::<u64>("MATCHMAKING_CLOCK_INCREMENT_SECS"),
        ) {
            matchmaking.time_control = TimeControl::clock(limit, increment);
        }
        if let Some(flag) = env_parse("MATCHMAKING_RATED") {
            matchmaking.rated = flag;
        }
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        self.challenge.validate()?;
        if self.matchmaking.enabled && self.matchmaking.opponents.is_empty() {
            return Err(ConfigError::NoOpponents);
        }
        Ok(())
    }
}

impl ChallengeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.min_base > self.max_base {
            return Err(ConfigError::InvertedBounds("base time"));
        }
        if self.min_increment > self.max_increment {
            return Err(ConfigError::InvertedBounds("increment"));
        }
        if self.min_days > self.max_days {
            return Err(ConfigError::InvertedBounds("days per turn"));
        }
        if let (Some(min), Some(max)) = (self.min_rating, self.max_rating) {
            if min > max {
                return Err(ConfigError::InvertedBounds("rating"));
            }
        }
        if self.only_bot && !self.accept_bot {
            return Err(ConfigError::ContradictoryBotRules);
        }
        if !self.accept_rated && !self.accept_casual {
            return Err(ConfigError::NoModes);
        }
        Ok(())
    }
}
