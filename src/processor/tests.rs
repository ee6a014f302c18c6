use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use super::*;
use crate::archive::fs::FsArchive;
use crate::archive::{ArchiveResult, DEFAULT_KEY_PREFIX};
use crate::db::WarehouseResult;

#[derive(Debug, Default)]
pub struct RecordingWarehouse {
    pub rows: Mutex<Vec<RiskScoreRow>>,
    pub fail: bool,
}

impl RecordingWarehouse {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn rows(&self) -> Vec<RiskScoreRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn insert_score(&self, row: &RiskScoreRow) -> WarehouseResult<()> {
        if self.fail {
            return Err(WarehouseError::Sqlx(sqlx::Error::PoolTimedOut));
        }

        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingArchive {
    pub objects: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail: bool,
}

impl RecordingArchive {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn objects(&self) -> Vec<(String, Vec<u8>)> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl Archive for RecordingArchive {
    async fn put(&self, key: &str, body: Vec<u8>) -> ArchiveResult<()> {
        if self.fail {
            return Err(ArchiveError::Io(std::io::Error::other("bucket unreachable")));
        }

        self.objects.lock().unwrap().push((key.to_string(), body));
        Ok(())
    }
}

fn processor(
    warehouse: &Arc<RecordingWarehouse>,
    archive: &Arc<RecordingArchive>,
) -> Processor {
    Processor::new(warehouse.clone(), archive.clone(), DEFAULT_KEY_PREFIX)
}

fn risky_event() -> Vec<u8> {
    json!({
        "content_id": "content-123",
        "user_id": "user-7",
        "content_type": "video",
        "user_is_flagged": true,
        "review_count": 1,
        "toxicity_score": 0.9,
        "blacklist_match": true
    })
    .to_string()
    .into_bytes()
}

fn delivery(bodies: &[Vec<u8>]) -> Vec<u8> {
    let records: Vec<_> = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            json!({
                "messageId": format!("msg-{i}"),
                "body": String::from_utf8(body.clone()).unwrap()
            })
        })
        .collect();

    json!({ "Records": records }).to_string().into_bytes()
}

#[tokio::test]
async fn test_well_formed_message_is_persisted_and_archived() {
    let (warehouse, archive) = (
        Arc::new(RecordingWarehouse::default()),
        Arc::new(RecordingArchive::default()),
    );

    let result = processor(&warehouse, &archive)
        .handle_delivery(&delivery(&[risky_event()]))
        .await;

    assert_eq!(result, InvocationResult::success());
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({ "statusCode": 200, "body": "Scoring successful" })
    );

    let rows = warehouse.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content_id, "content-123");
    assert_eq!(rows[0].user_id, "user-7");
    assert_eq!(rows[0].content_type, "video");
    assert_eq!(rows[0].risk_score, 100);

    let objects = archive.objects();
    assert_eq!(objects.len(), 1);

    let (key, body) = &objects[0];
    assert!(key.starts_with(DEFAULT_KEY_PREFIX));
    assert!(key.ends_with("_content-123.json"));

    let archived: serde_json::Value = serde_json::from_slice(body).unwrap();
    assert_eq!(archived["content_id"], "content-123");
    assert_eq!(archived["risk_score"], 100);
    assert_eq!(
        archived["scored_at"],
        serde_json::to_value(rows[0].scored_at).unwrap()
    );
}

#[tokio::test]
async fn test_invalid_json_makes_no_writes() {
    let (warehouse, archive) = (
        Arc::new(RecordingWarehouse::default()),
        Arc::new(RecordingArchive::default()),
    );
    let processor = processor(&warehouse, &archive);

    let bad_body = processor
        .handle_delivery(&delivery(&[b"{\"content_id\": ".to_vec()]))
        .await;
    let bad_envelope = processor.handle_delivery(b"not json at all").await;
    let empty = processor.handle_delivery(br#"{"Records": []}"#).await;

    for result in [bad_body, bad_envelope, empty] {
        assert_eq!(result, InvocationResult::failure());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "statusCode": 500, "body": "Error processing event" })
        );
    }

    assert!(warehouse.rows().is_empty());
    assert!(archive.objects().is_empty());
}

#[tokio::test]
async fn test_persistence_failure_skips_archive() {
    let (warehouse, archive) = (
        Arc::new(RecordingWarehouse::failing()),
        Arc::new(RecordingArchive::default()),
    );

    let err = processor(&warehouse, &archive)
        .process(&risky_event())
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Persistence(_)));
    assert_eq!(err.kind(), "persistence");
    assert!(archive.objects().is_empty());
}

#[tokio::test]
async fn test_archive_failure_keeps_warehouse_row() {
    let (warehouse, archive) = (
        Arc::new(RecordingWarehouse::default()),
        Arc::new(RecordingArchive::failing()),
    );
    let processor = processor(&warehouse, &archive);

    let err = processor.process(&risky_event()).await.unwrap_err();
    assert!(matches!(err, ProcessError::Archive(_)));

    let result = processor.handle(&risky_event()).await;
    assert_eq!(result, InvocationResult::failure());
    assert_eq!(result.body, FAILURE_DETAIL);

    assert_eq!(warehouse.rows().len(), 2);
}

#[tokio::test]
async fn test_only_first_record_of_batch_is_processed() {
    let (warehouse, archive) = (
        Arc::new(RecordingWarehouse::default()),
        Arc::new(RecordingArchive::default()),
    );

    let second = json!({
        "content_id": "content-456",
        "user_id": "user-8",
        "content_type": "text"
    })
    .to_string()
    .into_bytes();

    let result = processor(&warehouse, &archive)
        .handle_delivery(&delivery(&[risky_event(), second]))
        .await;

    assert!(result.is_success());
    let rows = warehouse.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content_id, "content-123");
    assert_eq!(archive.objects().len(), 1);
}

#[tokio::test]
async fn test_scores_partial_event() {
    let (warehouse, archive) = (
        Arc::new(RecordingWarehouse::default()),
        Arc::new(RecordingArchive::default()),
    );

    let body = json!({
        "content_id": "c-text",
        "user_id": "u-1",
        "content_type": "text",
        "review_count": 5,
        "toxicity_score": 0.2
    })
    .to_string();

    let scored = processor(&warehouse, &archive)
        .process(body.as_bytes())
        .await
        .unwrap();

    assert_eq!(scored.risk_score(), 0);
    assert_eq!(warehouse.rows()[0].risk_score, 0);
}

#[tokio::test]
async fn test_content_id_cannot_escape_archive_root() {
    let outer = tempfile::tempdir().unwrap();
    let root = outer.path().join("archive");
    let warehouse = Arc::new(RecordingWarehouse::default());
    let processor = Processor::new(
        warehouse.clone(),
        Arc::new(FsArchive::new(&root)),
        DEFAULT_KEY_PREFIX,
    );

    let body = json!({
        "content_id": "/../../../escaped",
        "user_id": "u-1",
        "content_type": "text"
    })
    .to_string()
    .into_bytes();

    let result = processor.handle_delivery(&delivery(&[body])).await;

    assert_eq!(result, InvocationResult::failure());
    assert!(warehouse.rows().is_empty());
    assert!(!outer.path().join("escaped.json").exists());
    assert!(!root.exists());
}
