use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::instrument;

use crate::db::models::RiskScoreRow;
use crate::db::{Warehouse, WarehouseResult};

/// Connection settings for the warehouse. Redshift and Postgres share the wire protocol.
#[derive(Clone)]
pub struct WarehouseOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
}

impl core::fmt::Debug for WarehouseOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WarehouseOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl WarehouseOptions {
    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    /// Builds the pool without connecting; connection failures surface on the first insert.
    #[instrument]
    pub fn connect_lazy(options: &WarehouseOptions) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .connect_lazy_with(options.connect_options());

        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    #[instrument(skip(self, row), fields(content_id = %row.content_id))]
    async fn insert_score(&self, row: &RiskScoreRow) -> WarehouseResult<()> {
        let mut tx = self.pool.begin().await?;

        match sqlx::query(
            r#"
            INSERT INTO moderation_risk_scores (
                content_id,
                user_id,
                content_type,
                risk_score,
                scored_at
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&row.content_id)
        .bind(&row.user_id)
        .bind(&row.content_type)
        .bind(row.risk_score)
        .bind(row.scored_at)
        .execute(&mut *tx)
        .await
        {
            Ok(_) => (),
            Err(e) => {
                tracing::error!(error = ?e, "failure during risk score insertion");
                return Err(e.into());
            }
        }

        tx.commit().await?;
        tracing::debug!(risk_score = row.risk_score, "risk score committed");

        Ok(())
    }
}
