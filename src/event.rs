use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::scoring::{self, ContentType, RiskFeatures};

/// Keys owned by the scorer; never accepted from the inbound payload
const RESERVED_KEYS: [&str; 2] = ["risk_score", "scored_at"];

pub type DecodeResult<T> = core::result::Result<T, DecodeError>;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("delivery contained no records")]
    EmptyDelivery,

    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// Batch envelope delivered by the queue
#[derive(Debug, Clone, Deserialize)]
pub struct QueueDelivery {
    #[serde(rename = "Records")]
    pub records: Vec<QueueRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueRecord {
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
    pub body: String,
}

impl QueueDelivery {
    pub fn decode(raw: &[u8]) -> DecodeResult<Self> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Splits the delivery into the record to process and the records left behind
    pub fn into_first(self) -> DecodeResult<(QueueRecord, Vec<QueueRecord>)> {
        let mut records = self.records.into_iter();
        let first = records.next().ok_or(DecodeError::EmptyDelivery)?;

        Ok((first, records.collect()))
    }
}

/// A single piece of content submitted for moderation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEvent {
    pub content_id: String,
    pub user_id: String,
    pub content_type: ContentType,
    #[serde(default, deserialize_with = "nullable")]
    pub user_is_flagged: bool,
    /// `None` when the producer did not report a count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u64>,
    #[serde(default, deserialize_with = "nullable")]
    pub toxicity_score: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub blacklist_match: bool,

    /// Fields we don't interpret but keep for the archived copy
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Treats an explicit `null` the same as a missing field
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ContentEvent {
    pub fn decode(raw: &[u8]) -> DecodeResult<Self> {
        let mut event: ContentEvent = serde_json::from_slice(raw)?;
        event.validate()?;

        for key in RESERVED_KEYS {
            event.extra.remove(key);
        }

        Ok(event)
    }

    fn validate(&self) -> DecodeResult<()> {
        if self.content_id.trim().is_empty() {
            return Err(invalid("content_id", "must not be empty"));
        }

        if let Some(reason) = unsafe_key_segment(&self.content_id) {
            return Err(invalid("content_id", reason));
        }

        if self.user_id.trim().is_empty() {
            return Err(invalid("user_id", "must not be empty"));
        }

        if !self.toxicity_score.is_finite() || !(0.0..=1.0).contains(&self.toxicity_score) {
            return Err(invalid(
                "toxicity_score",
                format!("{} is outside [0.0, 1.0]", self.toxicity_score),
            ));
        }

        Ok(())
    }

    pub fn features(&self) -> RiskFeatures {
        RiskFeatures {
            user_is_flagged: self.user_is_flagged,
            content_type: Some(self.content_type.clone()),
            review_count: self.review_count,
            toxicity_score: self.toxicity_score,
            blacklist_match: self.blacklist_match,
        }
    }

    /// Consumes the event, assigning its risk score and the time it was scored
    pub fn score(self, scored_at: DateTime<Utc>) -> ScoredEvent {
        let risk_score = scoring::score(&self.features());

        ScoredEvent {
            event: self,
            risk_score,
            scored_at,
        }
    }
}

/// `content_id` becomes part of an archive key, so it must stay a single plain path segment
fn unsafe_key_segment(id: &str) -> Option<&'static str> {
    if id.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if id.contains("..") {
        Some("must not contain '..'")
    } else if id.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> DecodeError {
    DecodeError::InvalidField {
        field,
        reason: reason.into(),
    }
}

/// A [`ContentEvent`] annotated with its score.
///
/// Only [`ContentEvent::score`] builds one; the score and timestamp can be read but never
/// reassigned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEvent {
    #[serde(flatten)]
    event: ContentEvent,
    risk_score: u8,
    scored_at: DateTime<Utc>,
}

impl ScoredEvent {
    pub fn event(&self) -> &ContentEvent {
        &self.event
    }

    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    pub fn scored_at(&self) -> DateTime<Utc> {
        self.scored_at
    }
}
