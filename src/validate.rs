//! # Submission Validator
//! Turns a raw JSON body into a [`FeedbackSubmission`] or a [`ValidationError`]
//! that lists every violated rule, not just the first one.
//!
//! Works on `serde_json::Value` rather than a derived struct so that a wrong
//! type in one field does not hide problems in the others.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{truncate_chars, FeedbackSubmission, Score};

/// Length caps applied to incoming submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionLimits {
    /// Longer feedback is rejected.
    pub max_feedback_chars: usize,
    /// Longer user agents are truncated.
    pub max_client_agent_chars: usize,
    /// Longer URLs are truncated.
    pub max_url_chars: usize,
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            max_feedback_chars: 2_000,
            max_client_agent_chars: 100,
            max_url_chars: 2_048,
        }
    }
}

/// A single broken rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("body must be a JSON object")]
    NotAnObject,
    #[error("score is required")]
    MissingScore,
    #[error("score must be an integer")]
    ScoreNotInteger,
    #[error("score {0} is outside 0..=10")]
    ScoreOutOfRange(i64),
    #[error("feedback must be a string")]
    FeedbackNotString,
    #[error("feedback has {len} characters, at most {max} allowed")]
    FeedbackTooLong { len: usize, max: usize },
    #[error("timestamp must be a string")]
    TimestampNotString,
    #[error("timestamp '{0}' is not an ISO 8601 date-time")]
    TimestampInvalid(String),
    #[error("url must be a string")]
    UrlNotString,
    #[error("userAgent must be a string")]
    UserAgentNotString,
}

/// Every violation found in one payload. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid payload: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn single(v: Violation) -> Self {
        Self {
            violations: vec![v],
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// Validate a raw body. `now` stamps submissions that carry no timestamp.
pub fn validate(
    raw: &Value,
    limits: &SubmissionLimits,
    now: DateTime<Utc>,
) -> Result<FeedbackSubmission, ValidationError> {
    let Some(obj) = raw.as_object() else {
        return Err(ValidationError::single(Violation::NotAnObject));
    };

    let mut violations = Vec::new();

    let score = check_score(obj, &mut violations);

    let feedback = match optional_str(obj, "feedback") {
        Ok(Some(text)) => {
            let len = text.chars().count();
            if len > limits.max_feedback_chars {
                violations.push(Violation::FeedbackTooLong {
                    len,
                    max: limits.max_feedback_chars,
                });
                None
            } else if text.trim().is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        }
        Ok(None) => None,
        Err(()) => {
            violations.push(Violation::FeedbackNotString);
            None
        }
    };

    let timestamp = match optional_str(obj, "timestamp") {
        Ok(Some(raw_ts)) => match DateTime::parse_from_rfc3339(raw_ts) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(_) => {
                violations.push(Violation::TimestampInvalid(
                    truncate_chars(raw_ts, 64).to_string(),
                ));
                now
            }
        },
        Ok(None) => now,
        Err(()) => {
            violations.push(Violation::TimestampNotString);
            now
        }
    };

    let source_url = match optional_str(obj, "url") {
        Ok(v) => v.map(|u| truncate_chars(u, limits.max_url_chars).to_string()),
        Err(()) => {
            violations.push(Violation::UrlNotString);
            None
        }
    };

    let client_agent = match optional_str(obj, "userAgent") {
        Ok(v) => v.map(|ua| truncate_chars(ua, limits.max_client_agent_chars).to_string()),
        Err(()) => {
            violations.push(Violation::UserAgentNotString);
            None
        }
    };

    match score {
        Some(score) if violations.is_empty() => Ok(FeedbackSubmission::from_validated(
            score,
            feedback,
            timestamp,
            source_url,
            client_agent,
        )),
        _ => Err(ValidationError { violations }),
    }
}

fn check_score(obj: &Map<String, Value>, violations: &mut Vec<Violation>) -> Option<Score> {
    let v = match obj.get("score") {
        None | Some(Value::Null) => {
            violations.push(Violation::MissingScore);
            return None;
        }
        Some(v) => v,
    };
    let Some(n) = v.as_i64() else {
        // u64 beyond i64::MAX is an integer, just a very wrong one
        if v.as_u64().is_some() {
            violations.push(Violation::ScoreOutOfRange(i64::MAX));
        } else {
            violations.push(Violation::ScoreNotInteger);
        }
        return None;
    };
    match Score::new(n) {
        Ok(s) => Some(s),
        Err(_) => {
            violations.push(Violation::ScoreOutOfRange(n));
            None
        }
    }
}

/// `Ok(None)` for absent or null, `Err(())` for a non-string value.
fn optional_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>, ()> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(()),
    }
}
