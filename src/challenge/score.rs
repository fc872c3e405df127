//! Challenge scoring used when accepting the best challenge first

use crate::challenge::model::Challenge;
use crate::config::ChallengeConfig;

/// Scores a challenge; higher is accepted earlier
pub trait ChallengeScorer: Send + Sync {
    fn score(&self, challenge: &Challenge) -> i64;
}

impl<F> ChallengeScorer for F
where
    F: Fn(&Challenge) -> i64 + Send + Sync,
{
    fn score(&self, challenge: &Challenge) -> i64 {
        self(challenge)
    }
}

/// Rating-based score with bonuses for rated games, titled players and humans
#[derive(Debug, Clone)]
pub struct RatingScorer {
    pub rated_bonus: i64,
    pub title_bonus: i64,
    pub human_bonus: i64,
    /// When set, score by closeness to this rating instead of raw rating
    pub target_rating: Option<u32>,
}

impl Default for RatingScorer {
    fn default() -> Self {
        Self {
            rated_bonus: 200,
            title_bonus: 200,
            human_bonus: 0,
            target_rating: None,
        }
    }
}

impl RatingScorer {
    /// Default bonuses with the configured human reward and target rating
    pub fn from_config(config: &ChallengeConfig) -> Self {
        Self {
            human_bonus: config.human_bonus,
            target_rating: config.target_rating,
            ..Self::default()
        }
    }
}

impl ChallengeScorer for RatingScorer {
    fn score(&self, challenge: &Challenge) -> i64 {
        let rating = i64::from(challenge.challenger.rating.unwrap_or(0));
        let mut score = match self.target_rating {
            Some(target) => -(rating - i64::from(target)).abs(),
            None => rating,
        };
        if challenge.rated {
            score += self.rated_bonus;
        }
        if challenge.challenger.human_title().is_some() {
            score += self.title_bonus;
        }
        if !challenge.challenger.is_bot {
            score += self.human_bonus;
        }
        score
    }
}
