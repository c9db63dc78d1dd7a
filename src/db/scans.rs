//! Scan queue operations

use crate::db::models::{ScanJob, StatusUpdate};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Typed access to the scan queue
///
/// Every status write is guarded so a row only moves forward through
/// `uploaded -> processing -> {complete, failed}`. Writes that hit a guard
/// are no-ops rather than errors, which makes repeated terminal writes
/// idempotent.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Oldest `uploaded` scan by `created_at` (ties broken by id), no side effects
    async fn fetch_next_candidate(&self) -> Result<Option<ScanJob>>;

    /// Move `uploaded -> processing` and clear `error`.
    ///
    /// Returns `false` when the row is no longer `uploaded`, i.e. someone
    /// else claimed it.
    async fn claim(&self, id: &str) -> Result<bool>;

    /// Apply a terminal update
    async fn set_status(&self, id: &str, update: &StatusUpdate) -> Result<()>;

    /// Write `log_text`
    async fn save_log(&self, id: &str, log_text: &str) -> Result<()>;
}

/// PostgreSQL-backed store over the `scans` table
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool against `database_url`
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn fetch_next_candidate(&self) -> Result<Option<ScanJob>> {
        let job = sqlx::query_as::<_, ScanJob>(
            r#"
            SELECT id::text AS id,
                   status::text AS status,
                   zip_path,
                   user_id::text AS user_id,
                   stl_path,
                   error,
                   created_at
            FROM scans
            WHERE status = 'uploaded'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn claim(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scans
            SET status = 'processing',
                error = NULL
            WHERE id = $1::uuid
              AND status = 'uploaded'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_status(&self, id: &str, update: &StatusUpdate) -> Result<()> {
        match update {
            StatusUpdate::Complete { stl_path } => {
                sqlx::query(
                    r#"
                    UPDATE scans
                    SET status = 'complete',
                        stl_path = $2,
                        error = NULL
                    WHERE id = $1::uuid
                      AND status IN ('processing', 'complete')
                    "#,
                )
                .bind(id)
                .bind(stl_path)
                .execute(&self.pool)
                .await?;
            }
            StatusUpdate::Failed { error } => {
                sqlx::query(
                    r#"
                    UPDATE scans
                    SET status = 'failed',
                        error = $2
                    WHERE id = $1::uuid
                      AND status <> 'complete'
                    "#,
                )
                .bind(id)
                .bind(error)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn save_log(&self, id: &str, log_text: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scans
            SET log_text = $2
            WHERE id = $1::uuid
            "#,
        )
        .bind(id)
        .bind(log_text)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
