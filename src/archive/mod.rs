use core::fmt;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

pub mod fs;
pub mod s3;

pub const DEFAULT_KEY_PREFIX: &str = "scored-events/";

/// Append-only object store receiving the audit copy of each scored event
#[async_trait]
pub trait Archive: Send + Sync + fmt::Debug {
    async fn put(&self, key: &str, body: Vec<u8>) -> ArchiveResult<()>;
}

/// `<prefix><timestamp>_<content_id>.json`
///
/// The timestamp is RFC 3339 UTC at microsecond precision, so two distinct content ids can never
/// share a key.
pub fn archive_key(prefix: &str, at: DateTime<Utc>, content_id: &str) -> String {
    format!(
        "{prefix}{}_{content_id}.json",
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    )
}

pub type ArchiveResult<T> = core::result::Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("s3 error: {0}")]
    S3(#[from] aws_sdk_s3::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize scored event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("object '{0}' already exists")]
    AlreadyExists(String),

    #[error("key '{0}' does not name a location inside the archive")]
    InvalidKey(String),
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Timelike};

    use super::*;

    #[test]
    fn test_archive_key_layout() {
        let at = Utc
            .with_ymd_and_hms(2024, 3, 9, 8, 7, 6)
            .unwrap()
            .with_nanosecond(123_456_000)
            .unwrap();

        assert_eq!(
            archive_key(DEFAULT_KEY_PREFIX, at, "c-42"),
            "scored-events/2024-03-09T08:07:06.123456Z_c-42.json"
        );
    }

    #[test]
    fn test_archive_keys_differ_per_content_id() {
        let at = Utc::now();
        assert_ne!(
            archive_key(DEFAULT_KEY_PREFIX, at, "a"),
            archive_key(DEFAULT_KEY_PREFIX, at, "b")
        );
    }
}
