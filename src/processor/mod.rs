use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::archive::{Archive, ArchiveError, archive_key};
use crate::db::models::RiskScoreRow;
use crate::db::{Warehouse, WarehouseError};
use crate::event::{ContentEvent, DecodeError, QueueDelivery, ScoredEvent};
use crate::scoring;

#[cfg(test)]
mod tests;

pub const SUCCESS_DETAIL: &str = "Scoring successful";
pub const FAILURE_DETAIL: &str = "Error processing event";

pub type ProcessResult<T> = core::result::Result<T, ProcessError>;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("persistence error: {0}")]
    Persistence(#[from] WarehouseError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
}

impl ProcessError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::Decode(_) => "decode",
            ProcessError::Persistence(_) => "persistence",
            ProcessError::Archive(_) => "archive",
        }
    }
}

/// Response handed back to the invoking runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub status_code: u16,
    pub body: String,
}

impl InvocationResult {
    pub fn success() -> Self {
        Self {
            status_code: 200,
            body: SUCCESS_DETAIL.to_string(),
        }
    }

    pub fn failure() -> Self {
        Self {
            status_code: 500,
            body: FAILURE_DETAIL.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Decodes, scores, persists and archives one event per call.
///
/// Holds no per-invocation state; the warehouse and archive handles are built once by the caller
/// and shared across invocations.
#[derive(Debug, Clone)]
pub struct Processor {
    warehouse: Arc<dyn Warehouse>,
    archive: Arc<dyn Archive>,
    key_prefix: String,
}

impl Processor {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        archive: Arc<dyn Archive>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            warehouse,
            archive,
            key_prefix: key_prefix.into(),
        }
    }

    /// Runs every step for a single message body, stopping at the first failure.
    ///
    /// A failed archive write leaves the warehouse row in place; nothing is rolled back or retried.
    #[instrument(skip(self, body), fields(content_id = tracing::field::Empty))]
    pub async fn process(&self, body: &[u8]) -> ProcessResult<ScoredEvent> {
        let event = ContentEvent::decode(body)?;
        tracing::Span::current().record("content_id", event.content_id.as_str());
        tracing::debug!(rules = ?scoring::triggered_rules(&event.features()), "scoring event");

        let scored = event.score(Utc::now());

        self.warehouse
            .insert_score(&RiskScoreRow::from(&scored))
            .await?;

        let key = archive_key(&self.key_prefix, Utc::now(), &scored.event().content_id);
        let payload = serde_json::to_vec(&scored).map_err(ArchiveError::Serialize)?;
        self.archive.put(&key, payload).await?;

        tracing::info!(
            risk_score = scored.risk_score(),
            archive_key = %key,
            "event scored"
        );

        Ok(scored)
    }

    /// Processes one message body and converts the outcome into an [`InvocationResult`].
    ///
    /// Failures are logged here with the payload; the caller only ever sees the generic detail.
    pub async fn handle(&self, body: &[u8]) -> InvocationResult {
        match self.process(body).await {
            Ok(_) => InvocationResult::success(),
            Err(e) => {
                log_failure(&e, body);
                InvocationResult::failure()
            }
        }
    }

    /// Unwraps a queue delivery and handles its first record.
    #[instrument(skip(self, raw))]
    pub async fn handle_delivery(&self, raw: &[u8]) -> InvocationResult {
        let (record, ignored) = match QueueDelivery::decode(raw).and_then(QueueDelivery::into_first)
        {
            Ok(split) => split,
            Err(e) => {
                log_failure(&ProcessError::from(e), raw);
                return InvocationResult::failure();
            }
        };

        if !ignored.is_empty() {
            let ignored_ids: Vec<&str> = ignored
                .iter()
                .map(|r| r.message_id.as_deref().unwrap_or("<none>"))
                .collect();
            tracing::warn!(
                count = ignored.len(),
                ?ignored_ids,
                "delivery held more than one record; only the first is processed"
            );
        }

        tracing::debug!(message_id = ?record.message_id, "handling queued record");
        self.handle(record.body.as_bytes()).await
    }
}

fn log_failure(error: &ProcessError, payload: &[u8]) {
    tracing::error!(
        kind = error.kind(),
        error = %error,
        payload = %String::from_utf8_lossy(payload),
        "failed to process event"
    );
}
