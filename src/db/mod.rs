use core::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub mod models;
pub mod pg;

/// Relational store holding one row per scored event
#[async_trait]
pub trait Warehouse: Send + Sync + fmt::Debug {
    /// Inserts and commits a single row. No conflict handling: a duplicate key is an error.
    async fn insert_score(&self, row: &models::RiskScoreRow) -> WarehouseResult<()>;
}

pub type WarehouseResult<T> = core::result::Result<T, WarehouseError>;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}
