use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::ScoredEvent;

/// Row shape of the `moderation_risk_scores` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskScoreRow {
    pub content_id: String,
    pub user_id: String,
    pub content_type: String,
    pub risk_score: i16,
    pub scored_at: DateTime<Utc>,
}

impl From<&ScoredEvent> for RiskScoreRow {
    fn from(scored: &ScoredEvent) -> Self {
        let event = scored.event();

        Self {
            content_id: event.content_id.clone(),
            user_id: event.user_id.clone(),
            content_type: event.content_type.to_string(),
            risk_score: i16::from(scored.risk_score()),
            scored_at: scored.scored_at(),
        }
    }
}
