use std::collections::{HashMap, VecDeque};

use crate::challenge::ledger::RecentChallengerLedger;
use crate::challenge::model::{Challenge, DeclineReason};
use crate::challenge::score::{ChallengeScorer, RatingScorer};
use crate::client::types::{Speed, TimeControl};
use crate::config::{ChallengeConfig, Preference, SortBy};

/// Why a challenge is not eligible
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("challenger is blocked")]
    Blocked,
    #[error("variant {0} is not supported")]
    Variant(String),
    #[error("speed {0:?} is not accepted")]
    Speed(Speed),
    #[error("time control is too fast")]
    TooFast,
    #[error("time control is too slow")]
    TooSlow,
    #[error("rated games are not accepted")]
    RatedNotAccepted,
    #[error("casual games are not accepted")]
    CasualNotAccepted,
    #[error("bots are not accepted")]
    BotNotAccepted,
    #[error("only bots are accepted")]
    HumanNotAccepted,
    #[error("rating {0} is outside the accepted range")]
    RatingOutOfRange(u32),
    #[error("already playing {0} games against this challenger")]
    TooManyGames(usize),
    #[error("recent challenge: {0} accepted within the window")]
    RecentChallenge(usize),
}

impl Rejection {
    /// Reason reported to the server
    pub fn decline_reason(&self) -> DeclineReason {
        match self {
            Rejection::Blocked => DeclineReason::Generic,
            Rejection::Variant(_) => DeclineReason::Variant,
            Rejection::Speed(_) => DeclineReason::TimeControl,
            Rejection::TooFast => DeclineReason::TooFast,
            Rejection::TooSlow => DeclineReason::TooSlow,
            Rejection::RatedNotAccepted => DeclineReason::Casual,
            Rejection::CasualNotAccepted => DeclineReason::Rated,
            Rejection::BotNotAccepted => DeclineReason::NoBot,
            Rejection::HumanNotAccepted => DeclineReason::OnlyBot,
            Rejection::RatingOutOfRange(_) => DeclineReason::Generic,
            Rejection::TooManyGames(_) => DeclineReason::Later,
            Rejection::RecentChallenge(_) => DeclineReason::Later,
        }
    }
}

/// Check a challenge against the acceptance rules; the first failing check wins
pub fn evaluate(
    challenge: &Challenge,
    config: &ChallengeConfig,
    ledger: &mut RecentChallengerLedger,
    opponent_load: &HashMap<String, usize>,
) -> Result<(), Rejection> {
    let challenger = &challenge.challenger;

    if config
        .block_list
        .iter()
        .any(|name| name.eq_ignore_ascii_case(&challenger.name))
    {
        return Err(Rejection::Blocked);
    }

    if !config.variants.iter().any(|v| v == &challenge.variant) {
        return Err(Rejection::Variant(challenge.variant.clone()));
    }

    check_time_control(&challenge.time_control, config)?;

    if challenge.rated && !config.accept_rated {
        return Err(Rejection::RatedNotAccepted);
    }
    if !challenge.rated && !config.accept_casual {
        return Err(Rejection::CasualNotAccepted);
    }

    if challenger.is_bot && !config.accept_bot {
        return Err(Rejection::BotNotAccepted);
    }
    if !challenger.is_bot && config.only_bot {
        return Err(Rejection::HumanNotAccepted);
    }

    if let Some(rating) = challenger.rating {
        let too_low = config.min_rating.is_some_and(|min| rating < min);
        let too_high = config.max_rating.is_some_and(|max| rating > max);
        if too_low || too_high {
            return Err(Rejection::RatingOutOfRange(rating));
        }
    }

    let active = opponent_load.get(&challenger.name).copied().unwrap_or(0);
    if active >= config.max_simultaneous_games_per_user {
        return Err(Rejection::TooManyGames(active));
    }

    if config.recent_bot_challenge_age.is_some() && challenger.is_bot {
        let recent = ledger.recent_count(&challenger.name);
        if recent >= config.max_recent_bot_challenges {
            return Err(Rejection::RecentChallenge(recent));
        }
    }

    Ok(())
}

fn check_time_control(time_control: &TimeControl, config: &ChallengeConfig) -> Result<(), Rejection> {
    let speed = time_control.speed();
    if !config.speeds.contains(&speed) {
        return Err(Rejection::Speed(speed));
    }

    match *time_control {
        TimeControl::Clock { limit, increment } => {
            if limit < config.min_base || increment < config.min_increment {
                return Err(Rejection::TooFast);
            }
            if limit > config.max_base || increment > config.max_increment {
                return Err(Rejection::TooSlow);
            }
        }
        TimeControl::Correspondence { days_per_turn } => {
            if days_per_turn < config.min_days {
                return Err(Rejection::TooFast);
            }
            if days_per_turn > config.max_days {
                return Err(Rejection::TooSlow);
            }
        }
        TimeControl::Unlimited => {}
    }
    Ok(())
}

/// Pending incoming challenges in acceptance order
pub struct ChallengeRegistry {
    config: ChallengeConfig,
    queue: VecDeque<Challenge>,
    ledger: RecentChallengerLedger,
    scorer: Box<dyn ChallengeScorer>,
}

impl ChallengeRegistry {
    pub fn new(config: ChallengeConfig) -> Self {
        let scorer = RatingScorer::from_config(&config);
        Self::with_scorer(config, Box::new(scorer))
    }

    pub fn with_scorer(config: ChallengeConfig, scorer: Box<dyn ChallengeScorer>) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            ledger: RecentChallengerLedger::new(),
            scorer,
        }
    }

    /// Evaluate a challenge and queue it when eligible
    ///
    /// Declining through the server is left to the caller.
    pub fn handle_challenge(
        &mut self,
        challenge: Challenge,
        opponent_load: &HashMap<String, usize>,
    ) -> Result<(), Rejection> {
        evaluate(&challenge, &self.config, &mut self.ledger, opponent_load)?;

        let challenger = challenge.challenger.name.clone();
        self.queue.push_back(challenge);
        self.sort();

        if let Some(window) = self.config.recent_bot_challenge_age {
            self.ledger.record(&challenger, window);
        }
        Ok(())
    }

    /// Re-order the queue: best score first, then a stable preference clustering
    fn sort(&mut self) {
        let queue = self.queue.make_contiguous();

        if self.config.sort_by == SortBy::Best {
            let scorer = &self.scorer;
            queue.sort_by_cached_key(|c| std::cmp::Reverse(scorer.score(c)));
        }

        match self.config.preference {
            Preference::None => {}
            // `sort_by_key` is stable, so equally-preferred entries keep their order
            Preference::Bot => queue.sort_by_key(|c| !c.challenger.is_bot),
            Preference::Human => queue.sort_by_key(|c| c.challenger.is_bot),
        }
    }

    /// Take the next challenge to accept
    pub fn pop_front(&mut self) -> Option<Challenge> {
        self.queue.pop_front()
    }

    /// Drop a challenge that was withdrawn upstream
    pub fn remove(&mut self, challenge_id: &str) -> Option<Challenge> {
        let index = self.queue.iter().position(|c| c.id == challenge_id)?;
        self.queue.remove(index)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Challenge> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::model::Challenger;
    use std::time::Duration;

    fn challenge(id: &str, name: &str, rating: u32, is_bot: bool) -> Challenge {
        Challenge {
            id: id.to_string(),
            challenger: Challenger {
                id: name.to_lowercase(),
                name: name.to_string(),
                rating: Some(rating),
                is_bot,
                title: is_bot.then(|| "BOT".to_string()),
            },
            variant: "standard".to_string(),
            time_control: TimeControl::clock(180, 2),
            rated: false,
            from_self: false,
        }
    }

    fn score_by_rating() -> Box<dyn ChallengeScorer> {
        Box::new(|c: &Challenge| i64::from(c.challenger.rating.unwrap_or(0)))
    }

    fn ids(registry: &ChallengeRegistry) -> Vec<&str> {
        registry.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_first_keeps_arrival_order() {
        let mut registry = ChallengeRegistry::with_scorer(ChallengeConfig::default(), score_by_rating());
        let load = HashMap::new();
        registry.handle_challenge(challenge("a", "A", 10, false), &load).unwrap();
        registry.handle_challenge(challenge("b", "B", 30, false), &load).unwrap();
        registry.handle_challenge(challenge("c", "C", 20, false), &load).unwrap();

        assert_eq!(ids(&registry), ["a", "b", "c"]);
    }

    #[test]
    fn test_sort_by_best() {
        let config = ChallengeConfig {
            sort_by: SortBy::Best,
            ..ChallengeConfig::default()
        };
        let mut registry = ChallengeRegistry::with_scorer(config, score_by_rating());
        let load = HashMap::new();
        registry.handle_challenge(challenge("a", "A", 10, false), &load).unwrap();
        registry.handle_challenge(challenge("b", "B", 30, false), &load).unwrap();
        registry.handle_challenge(challenge("c", "C", 20, false), &load).unwrap();

        assert_eq!(ids(&registry), ["b", "c", "a"]);
    }

    #[test]
    fn test_best_then_bot_preference() {
        let config = ChallengeConfig {
            sort_by: SortBy::Best,
            preference: Preference::Bot,
            ..ChallengeConfig::default()
        };
        let mut registry = ChallengeRegistry::with_scorer(config, score_by_rating());
        let load = HashMap::new();
        registry.handle_challenge(challenge("a", "A", 10, false), &load).unwrap();
        registry.handle_challenge(challenge("b", "B", 30, true), &load).unwrap();
        registry.handle_challenge(challenge("c", "C", 20, false), &load).unwrap();

        assert_eq!(ids(&registry), ["b", "c", "a"]);
    }

    #[test]
    fn test_preference_is_stable_secondary_sort() {
        let config = ChallengeConfig {
            sort_by: SortBy::Best,
            preference: Preference::Bot,
            ..ChallengeConfig::default()
        };
        let mut registry = ChallengeRegistry::with_scorer(config, score_by_rating());
        let load = HashMap::new();
        registry.handle_challenge(challenge("a", "A", 10, true), &load).unwrap();
        registry.handle_challenge(challenge("b", "B", 30, false), &load).unwrap();
        registry.handle_challenge(challenge("c", "C", 20, false), &load).unwrap();

        // The bot jumps ahead, the humans keep their best-first order
        assert_eq!(ids(&registry), ["a", "b", "c"]);
    }

    #[test]
    fn test_human_preference_without_best() {
        let config = ChallengeConfig {
            preference: Preference::Human,
            ..ChallengeConfig::default()
        };
        let mut registry = ChallengeRegistry::with_scorer(config, score_by_rating());
        let load = HashMap::new();
        registry.handle_challenge(challenge("a", "A", 10, true), &load).unwrap();
        registry.handle_challenge(challenge("b", "B", 30, true), &load).unwrap();
        registry.handle_challenge(challenge("c", "C", 20, false), &load).unwrap();

        assert_eq!(ids(&registry), ["c", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_challenge_window() {
        let config = ChallengeConfig {
            recent_bot_challenge_age: Some(Duration::from_secs(60)),
            max_recent_bot_challenges: 1,
            ..ChallengeConfig::default()
        };
        let mut registry = ChallengeRegistry::new(config);
        let load = HashMap::new();

        registry.handle_challenge(challenge("c1", "Rival", 1500, true), &load).unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        let result = registry.handle_challenge(challenge("c2", "Rival", 1500, true), &load);
        assert_eq!(result, Err(Rejection::RecentChallenge(1)));
        assert_eq!(result.unwrap_err().decline_reason(), DeclineReason::Later);

        tokio::time::advance(Duration::from_secs(56)).await;
        assert!(registry
            .handle_challenge(challenge("c3", "Rival", 1500, true), &load)
            .is_ok());
        assert_eq!(ids(&registry), ["c1", "c3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_not_enforced_without_config() {
        let mut registry = ChallengeRegistry::new(ChallengeConfig::default());
        let load = HashMap::new();
        registry.handle_challenge(challenge("c1", "Rival", 1500, true), &load).unwrap();
        registry.handle_challenge(challenge("c2", "Rival", 1500, true), &load).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_first_failing_check_wins() {
        let config = ChallengeConfig {
            accept_bot: false,
            ..ChallengeConfig::default()
        };
        let mut ledger = RecentChallengerLedger::new();
        let mut c = challenge("x", "Rival", 1500, true);
        c.variant = "atomic".to_string();

        // Both variant and bot checks fail, variant comes first
        let result = evaluate(&c, &config, &mut ledger, &HashMap::new());
        assert_eq!(result, Err(Rejection::Variant("atomic".to_string())));
        assert_eq!(result.unwrap_err().decline_reason(), DeclineReason::Variant);
    }

    #[test]
    fn test_time_control_bounds() {
        let config = ChallengeConfig {
            min_base: Duration::from_secs(120),
            max_increment: Duration::from_secs(5),
            ..ChallengeConfig::default()
        };
        let mut ledger = RecentChallengerLedger::new();
        let load = HashMap::new();

        let mut fast = challenge("f", "A", 1500, false);
        fast.time_control = TimeControl::clock(60, 2);
        assert_eq!(evaluate(&fast, &config, &mut ledger, &load), Err(Rejection::TooFast));

        let mut slow = challenge("s", "A", 1500, false);
        slow.time_control = TimeControl::clock(600, 10);
        assert_eq!(evaluate(&slow, &config, &mut ledger, &load), Err(Rejection::TooSlow));

        let mut ultra = challenge("u", "A", 1500, false);
        ultra.time_control = TimeControl::clock(15, 0);
        assert_eq!(
            evaluate(&ultra, &config, &mut ledger, &load),
            Err(Rejection::Speed(Speed::UltraBullet))
        );

        let mut corr = challenge("c", "A", 1500, false);
        corr.time_control = TimeControl::Correspondence { days_per_turn: 30 };
        let config = ChallengeConfig {
            speeds: vec![Speed::Correspondence],
            ..ChallengeConfig::default()
        };
        assert_eq!(evaluate(&corr, &config, &mut ledger, &load), Err(Rejection::TooSlow));
    }

    #[test]
    fn test_mode_and_bot_rules() {
        let mut ledger = RecentChallengerLedger::new();
        let load = HashMap::new();

        let config = ChallengeConfig {
            accept_rated: false,
            ..ChallengeConfig::default()
        };
        let mut rated = challenge("r", "A", 1500, false);
        rated.rated = true;
        let result = evaluate(&rated, &config, &mut ledger, &load);
        assert_eq!(result, Err(Rejection::RatedNotAccepted));
        assert_eq!(result.unwrap_err().decline_reason(), DeclineReason::Casual);

        let config = ChallengeConfig {
            only_bot: true,
            ..ChallengeConfig::default()
        };
        let human = challenge("h", "A", 1500, false);
        assert_eq!(
            evaluate(&human, &config, &mut ledger, &load),
            Err(Rejection::HumanNotAccepted)
        );
    }

    #[test]
    fn test_rating_and_block_list() {
        let mut ledger = RecentChallengerLedger::new();
        let load = HashMap::new();
        let config = ChallengeConfig {
            min_rating: Some(1200),
            max_rating: Some(2000),
            block_list: vec!["troll".to_string()],
            ..ChallengeConfig::default()
        };

        assert_eq!(
            evaluate(&challenge("l", "A", 1000, false), &config, &mut ledger, &load),
            Err(Rejection::RatingOutOfRange(1000))
        );
        assert_eq!(
            evaluate(&challenge("b", "Troll", 1500, false), &config, &mut ledger, &load),
            Err(Rejection::Blocked)
        );
        assert!(evaluate(&challenge("ok", "A", 1500, false), &config, &mut ledger, &load).is_ok());
    }

    #[test]
    fn test_opponent_load() {
        let config = ChallengeConfig {
            max_simultaneous_games_per_user: 2,
            ..ChallengeConfig::default()
        };
        let mut ledger = RecentChallengerLedger::new();
        let mut load = HashMap::new();
        load.insert("Rival".to_string(), 2);

        assert_eq!(
            evaluate(&challenge("x", "Rival", 1500, false), &config, &mut ledger, &load),
            Err(Rejection::TooManyGames(2))
        );
        assert!(evaluate(&challenge("y", "Other", 1500, false), &config, &mut ledger, &load).is_ok());
    }

    #[test]
    fn test_configured_human_bonus_orders_best() {
        let load = HashMap::new();
        let config = ChallengeConfig {
            sort_by: SortBy::Best,
            ..ChallengeConfig::default()
        };

        let mut registry = ChallengeRegistry::new(config.clone());
        registry.handle_challenge(challenge("h", "Human", 1500, false), &load).unwrap();
        registry.handle_challenge(challenge("b", "Bot", 1550, true), &load).unwrap();
        assert_eq!(ids(&registry), ["b", "h"]);

        let mut registry = ChallengeRegistry::new(ChallengeConfig {
            human_bonus: 100,
            ..config
        });
        registry.handle_challenge(challenge("h", "Human", 1500, false), &load).unwrap();
        registry.handle_challenge(challenge("b", "Bot", 1550, true), &load).unwrap();
        assert_eq!(ids(&registry), ["h", "b"]);
    }

    #[test]
    fn test_pop_and_remove() {
        let mut registry = ChallengeRegistry::new(ChallengeConfig::default());
        let load = HashMap::new();
        registry.handle_challenge(challenge("a", "A", 10, false), &load).unwrap();
        registry.handle_challenge(challenge("b", "B", 20, false), &load).unwrap();
        registry.handle_challenge(challenge("c", "C", 30, false), &load).unwrap();

        assert_eq!(registry.remove("b").map(|c| c.id), Some("b".to_string()));
        assert!(registry.remove("missing").is_none());
        assert_eq!(registry.pop_front().map(|c| c.id), Some("a".to_string()));
        assert_eq!(registry.len(), 1);
    }
}
