//! Challenge model
//!
//! Wire payloads for incoming challenges and their validated in-memory form.

use serde::Deserialize;
use std::time::Duration;

use crate::client::types::{TimeControl, UserProfile};

/// Reason sent to the server when declining a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclineReason {
    Generic,
    Later,
    TooFast,
    TooSlow,
    TimeControl,
    Rated,
    Casual,
    Standard,
    Variant,
    NoBot,
    OnlyBot,
}

impl DeclineReason {
    /// Key understood by the server API
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineReason::Generic => "generic",
            DeclineReason::Later => "later",
            DeclineReason::TooFast => "tooFast",
            DeclineReason::TooSlow => "tooSlow",
            DeclineReason::TimeControl => "timeControl",
            DeclineReason::Rated => "rated",
            DeclineReason::Casual => "casual",
            DeclineReason::Standard => "standard",
            DeclineReason::Variant => "variant",
            DeclineReason::NoBot => "noBot",
            DeclineReason::OnlyBot => "onlyBot",
        }
    }
}

impl std::fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who sent a challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenger {
    pub id: String,
    pub name: String,
    pub rating: Option<u32>,
    pub is_bot: bool,
    pub title: Option<String>,
}

impl Challenger {
    /// Title that is not the bot marker
    pub fn human_title(&self) -> Option<&str> {
        match self.title.as_deref() {
            Some("BOT") | None => None,
            Some(title) => Some(title),
        }
    }
}

/// A pending incoming (or echoed outgoing) challenge
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub id: String,
    pub challenger: Challenger,
    pub variant: String,
    pub time_control: TimeControl,
    pub rated: bool,
    /// Sent by this bot (echo of an outbound challenge)
    pub from_self: bool,
}

impl Challenge {
    /// Validate a wire payload against the bot's own profile
    pub fn from_payload(payload: ChallengePayload, profile: &UserProfile) -> Self {
        let challenger = payload.challenger.unwrap_or_default();
        let from_self = !profile.id.is_empty() && challenger.id.eq_ignore_ascii_case(&profile.id);
        let is_bot = challenger.title.as_deref() == Some("BOT");

        Self {
            id: payload.id,
            challenger: Challenger {
                id: challenger.id,
                name: challenger.name,
                rating: challenger.rating,
                is_bot,
                title: challenger.title,
            },
            variant: payload.variant.key,
            time_control: payload.time_control.into(),
            rated: payload.rated,
            from_self,
        }
    }
}

impl std::fmt::Display for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.rated { "rated" } else { "casual" };
        match self.challenger.rating {
            Some(rating) => write!(
                f,
                "{} {} challenge from {} ({}) ID: {}",
                mode, self.variant, self.challenger.name, rating, self.id
            ),
            None => write!(
                f,
                "{} {} challenge from {} ID: {}",
                mode, self.variant, self.challenger.name, self.id
            ),
        }
    }
}

/// Challenge object as delivered in a `challenge` event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengePayload {
    pub id: String,
    #[serde(default)]
    pub challenger: Option<ChallengerPayload>,
    #[serde(default)]
    pub variant: VariantPayload,
    #[serde(default)]
    pub rated: bool,
    #[serde(default)]
    pub time_control: TimeControlPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ChallengerPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rating: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VariantPayload {
    pub key: String,
}

impl Default for VariantPayload {
    fn default() -> Self {
        Self {
            key: "standard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimeControlPayload {
    Clock {
        limit: u64,
        increment: u64,
    },
    #[serde(rename_all = "camelCase")]
    Correspondence {
        days_per_turn: u32,
    },
    #[default]
    Unlimited,
}

impl From<TimeControlPayload> for TimeControl {
    fn from(payload: TimeControlPayload) -> Self {
        match payload {
            TimeControlPayload::Clock { limit, increment } => TimeControl::Clock {
                limit: Duration::from_secs(limit),
                increment: Duration::from_secs(increment),
            },
            TimeControlPayload::Correspondence { days_per_turn } => {
                TimeControl::Correspondence { days_per_turn }
            }
            TimeControlPayload::Unlimited => TimeControl::Unlimited,
        }
    }
}
