//! PostgreSQL implementation of TaskQueue and StatusStore
//!
//! Production persistence using PostgreSQL with:
//! - Lease-based claiming with SKIP LOCKED
//! - Expired leases reclaimed on the claim path (no sweeper process)
//! - Rank-guarded upserts so status never regresses

use std::time::Duration;

use async_trait::async_trait;
use docket_core::{QueuedJob, StatusWrite, TaskKind, TaskRecord, TaskStatus};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::store::*;

/// PostgreSQL implementation of TaskQueue and StatusStore
///
/// Both tables live in the same database so one pool serves the queue and
/// the status store.
///
/// # Example
///
/// ```ignore
/// use docket_durable::PostgresStore;
///
/// let store = PostgresStore::connect("postgres://localhost/docket", 10).await?;
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                StoreError::Unavailable(e.to_string())
            })?;

        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                StoreError::Database(e.to_string())
            })?;
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_kind(raw: &str) -> Result<TaskKind, StoreError> {
    raw.parse()
        .map_err(|e: docket_core::ValidationError| StoreError::Serialization(e.to_string()))
}

fn record_from_row(row: &PgRow) -> Result<TaskRecord, StoreError> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    Ok(TaskRecord {
        id: row.get("id"),
        kind: parse_kind(&kind)?,
        status: status.parse::<TaskStatus>().map_err(StoreError::Serialization)?,
        result: row.get("result"),
        error: row.get("error"),
        correlation_id: row.get("correlation_id"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl TaskQueue for PostgresStore {
    #[instrument(skip(self, job), fields(task_id = %job.task_id, kind = %job.kind))]
    async fn publish(&self, job: QueuedJob) -> Result<Uuid, StoreError> {
        let job_id = Uuid::now_v7();

        sqlx::query(
            r#"
            INSERT INTO task_queue (id, task_id, kind, payload, correlation_id, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            "#,
        )
        .bind(job_id)
        .bind(job.task_id)
        .bind(job.kind.as_str())
        .bind(&job.payload)
        .bind(&job.correlation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to publish job: {}", e);
            StoreError::Database(e.to_string())
        })?;

        debug!(%job_id, "published job");
        Ok(job_id)
    }

    #[instrument(skip(self))]
    async fn claim(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<ClaimedJob>, StoreError> {
        // Oldest pending job, or oldest claimed job whose holder stopped
        // renewing. SKIP LOCKED keeps concurrent claimers from blocking on
        // each other; the UPDATE bumps the attempt and sets a fresh lease.
        let row = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id
                FROM task_queue
                WHERE status = 'pending'
                   OR (status = 'claimed' AND lease_expires_at <= NOW())
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE task_queue t
            SET status = 'claimed',
                claimed_by = $1,
                lease_expires_at = NOW() + ($2::bigint * INTERVAL '1 millisecond'),
                attempt = attempt + 1
            FROM claimable c
            WHERE t.id = c.id
            RETURNING t.id, t.task_id, t.kind, t.payload, t.correlation_id,
                      t.attempt, t.claimed_by, t.lease_expires_at
            "#,
        )
        .bind(worker_id)
        .bind(lease.as_millis() as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to claim job: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind: String = row.get("kind");
        let claimed = ClaimedJob {
            id: row.get("id"),
            job: QueuedJob {
                task_id: row.get("task_id"),
                kind: parse_kind(&kind)?,
                payload: row.get("payload"),
                correlation_id: row.get("correlation_id"),
            },
            attempt: row.get::<i32, _>("attempt") as u32,
            claimed_by: row.get("claimed_by"),
            lease_expires_at: row.get("lease_expires_at"),
        };

        debug!(
            worker_id,
            job_id = %claimed.id,
            attempt = claimed.attempt,
            "claimed job"
        );
        Ok(Some(claimed))
    }

    #[instrument(skip(self, claimed), fields(job_id = %claimed.id, attempt = claimed.attempt))]
    async fn acknowledge(&self, claimed: &ClaimedJob) -> Result<(), StoreError> {
        // A repeat acknowledge from the same holder succeeds
        let row = sqlx::query(
            r#"
            WITH target AS (
                SELECT id FROM task_queue WHERE id = $1
            ), acked AS (
                UPDATE task_queue
                SET status = 'acknowledged',
                    acknowledged_at = COALESCE(acknowledged_at, NOW()),
                    lease_expires_at = NULL
                WHERE id = $1
                  AND status IN ('claimed', 'acknowledged')
                  AND claimed_by = $2
                  AND attempt = $3
                RETURNING id
            )
            SELECT EXISTS (SELECT 1 FROM target) AS found,
                   EXISTS (SELECT 1 FROM acked) AS acked
            "#,
        )
        .bind(claimed.id)
        .bind(&claimed.claimed_by)
        .bind(claimed.attempt as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to acknowledge job: {}", e);
            StoreError::Database(e.to_string())
        })?;

        if !row.get::<bool, _>("found") {
            return Err(StoreError::JobNotFound(claimed.id));
        }
        if !row.get::<bool, _>("acked") {
            warn!(worker_id = %claimed.claimed_by, "acknowledge from stale lease holder");
            return Err(StoreError::LeaseLost(claimed.id));
        }
        Ok(())
    }

    #[instrument(skip(self, claimed), fields(job_id = %claimed.id, attempt = claimed.attempt))]
    async fn fail(&self, claimed: &ClaimedJob, reason: &str) -> Result<(), StoreError> {
        let row = sqlx::query(
            r#"
            WITH target AS (
                SELECT id FROM task_queue WHERE id = $1
            ), released AS (
                UPDATE task_queue
                SET status = 'pending',
                    claimed_by = NULL,
                    lease_expires_at = NULL
                WHERE id = $1
                  AND status = 'claimed'
                  AND claimed_by = $2
                  AND attempt = $3
                RETURNING id
            )
            SELECT EXISTS (SELECT 1 FROM target) AS found,
                   EXISTS (SELECT 1 FROM released) AS released
            "#,
        )
        .bind(claimed.id)
        .bind(&claimed.claimed_by)
        .bind(claimed.attempt as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to release job: {}", e);
            StoreError::Database(e.to_string())
        })?;

        if !row.get::<bool, _>("found") {
            return Err(StoreError::JobNotFound(claimed.id));
        }
        if !row.get::<bool, _>("released") {
            return Err(StoreError::LeaseLost(claimed.id));
        }
        debug!(reason, "released job for redelivery");
        Ok(())
    }
}

#[async_trait]
impl StatusStore for PostgresStore {
    #[instrument(skip(self, write), fields(task_id = %write.task_id, status = %write.status))]
    async fn upsert(&self, write: StatusWrite) -> Result<bool, StoreError> {
        // The WHERE on the conflict branch drops writes that would lower the
        // rank. kind and correlation_id are never overwritten.
        let result = sqlx::query(
            r#"
            INSERT INTO task_records (id, kind, status, result, error, correlation_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                result = EXCLUDED.result,
                error = EXCLUDED.error,
                updated_at = GREATEST(NOW(), task_records.updated_at)
            WHERE (CASE EXCLUDED.status
                       WHEN 'queued' THEN 0 WHEN 'working' THEN 1 ELSE 2 END)
               >= (CASE task_records.status
                       WHEN 'queued' THEN 0 WHEN 'working' THEN 1 ELSE 2 END)
            "#,
        )
        .bind(write.task_id)
        .bind(write.kind.as_str())
        .bind(write.status.as_str())
        .bind(&write.result)
        .bind(&write.error)
        .bind(&write.correlation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to upsert task record: {}", e);
            StoreError::Database(e.to_string())
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn get(&self, task_id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, status, result, error, correlation_id, updated_at
            FROM task_records
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load task record: {}", e);
            StoreError::Database(e.to_string())
        })?;

        row.as_ref().map(record_from_row).transpose()
    }
}
