//! # Model
//! Core NPS types shared by the ingestion endpoint, the store and the widget.
//!
//! `FeedbackSubmission` has private fields on purpose: the only way to get
//! one is through [`crate::validate::validate`], so everything past the
//! validator can rely on the bounds having been checked.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest and highest NPS rating.
pub const MIN_SCORE: u8 = 0;
pub const MAX_SCORE: u8 = 10;

/// A rating in `0..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Score(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("score {0} is outside 0..=10")]
pub struct ScoreOutOfRange(pub i64);

impl Score {
    pub fn new(value: i64) -> Result<Self, ScoreOutOfRange> {
        if (MIN_SCORE as i64..=MAX_SCORE as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScoreOutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn category(self) -> NpsCategory {
        NpsCategory::from_score(self)
    }

    /// All eleven valid ratings, lowest first.
    pub fn all() -> impl Iterator<Item = Score> {
        (MIN_SCORE..=MAX_SCORE).map(Score)
    }
}

impl TryFrom<i64> for Score {
    type Error = ScoreOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for u8 {
    fn from(s: Score) -> u8 {
        s.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// NPS bucket of a single rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpsCategory {
    Detractor,
    Passive,
    Promoter,
}

impl NpsCategory {
    pub fn from_score(score: Score) -> Self {
        match score.get() {
            0..=6 => NpsCategory::Detractor,
            7..=8 => NpsCategory::Passive,
            _ => NpsCategory::Promoter,
        }
    }

    /// Label shown under the selected rating.
    pub fn label(self) -> &'static str {
        match self {
            NpsCategory::Detractor => "Not likely",
            NpsCategory::Passive => "Neutral",
            NpsCategory::Promoter => "Very likely",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            NpsCategory::Detractor => "#dc2626",
            NpsCategory::Passive => "#d97706",
            NpsCategory::Promoter => "#16a34a",
        }
    }
}

/// Account a credential belongs to. Responses are stored and listed per account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned identifier of an accepted response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(String);

impl ResponseId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated, immutable NPS response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackSubmission {
    score: Score,
    feedback: Option<String>,
    timestamp: DateTime<Utc>,
    source_url: Option<String>,
    client_agent: Option<String>,
}

impl FeedbackSubmission {
    /// Only the validator builds submissions; bounds are its responsibility.
    pub(crate) fn from_validated(
        score: Score,
        feedback: Option<String>,
        timestamp: DateTime<Utc>,
        source_url: Option<String>,
        client_agent: Option<String>,
    ) -> Self {
        Self {
            score,
            feedback,
            timestamp,
            source_url,
            client_agent,
        }
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    /// Already truncated to the configured cap.
    pub fn client_agent(&self) -> Option<&str> {
        self.client_agent.as_deref()
    }
}

/// Wire payload posted by the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// A response as held by a [`crate::store::ResponseStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub id: ResponseId,
    pub account: AccountId,
    pub submission: FeedbackSubmission,
    pub received_at: DateTime<Utc>,
}

/// Keep at most `max` characters. Never splits a char; idempotent.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
