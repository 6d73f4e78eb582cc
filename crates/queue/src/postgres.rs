//! Postgres-backed job store implementation.
//!
//! The conditional update is a single `UPDATE ... WHERE id = $1 AND
//! version = $2`; the row count tells the caller whether it won. No
//! advisory locks, no `SELECT ... FOR UPDATE` — the version column is the
//! sole concurrency-control mechanism, so stateless invocations on separate
//! machines can safely overlap.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `JobStoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | JobStoreError | Scenario |
//! |------------|----------------------|---------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | Job id collision on insert |
//! | Database (other) | Any other | `Unavailable` | Constraint/database failure |
//! | ColumnDecode / Decode | N/A | `Decode` | Stored row no longer matches the job model |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` | Connection-level failure |
//! | Other | N/A | `Unavailable` | Network errors, protocol errors, etc. |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::job::{Job, JobId, JobStatus};
use crate::stats::StatusCounts;
use crate::store::{JobStore, JobStoreError, JobUpdate};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id UUID PRIMARY KEY,
        job_type TEXT NOT NULL,
        payload JSONB NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL,
        max_attempts INTEGER NOT NULL,
        scheduled_for TIMESTAMPTZ NOT NULL,
        last_error TEXT,
        version BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS jobs_due_idx ON jobs (status, scheduled_for, created_at)",
    "CREATE INDEX IF NOT EXISTS jobs_age_idx ON jobs (status, updated_at)",
];

/// Postgres-backed job store.
///
/// Uses the SQLx connection pool, which is `Send + Sync` and can be shared
/// across tasks; every operation is a single statement, so no transaction
/// management is needed.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Apply the job table schema (idempotent).
    pub async fn migrate(&self) -> Result<(), JobStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type), err)]
    async fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let id = job.id;
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, job_type, payload, status, attempts, max_attempts,
                scheduled_for, last_error, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.status.as_str())
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .bind(job.scheduled_for)
        .bind(&job.last_error)
        .bind(job.version as i64)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::Duplicate(id)
            } else {
                map_sqlx_error("insert", e)
            }
        })?;

        Ok(id)
    }

    #[instrument(skip(self), err)]
    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&select_jobs("WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    #[instrument(skip(self, update), err)]
    async fn conditional_update(
        &self,
        id: JobId,
        expected_version: u64,
        update: JobUpdate,
    ) -> Result<bool, JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $3,
                attempts = $4,
                scheduled_for = $5,
                last_error = $6,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected_version as i64)
        .bind(update.status.as_str())
        .bind(update.attempts as i32)
        .bind(update.scheduled_for)
        .bind(&update.last_error)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("conditional_update", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn query_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(&select_jobs(
            "WHERE status = $1 AND scheduled_for <= $2 \
             ORDER BY scheduled_for ASC, created_at ASC LIMIT $3",
        ))
        .bind(JobStatus::Pending.as_str())
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_due", e))?;

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn query_stale_running(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(&select_jobs(
            "WHERE status = $1 AND updated_at < $2 ORDER BY updated_at ASC LIMIT $3",
        ))
        .bind(JobStatus::Running.as_str())
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_stale_running", e))?;

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(&select_jobs(
            "WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at ASC LIMIT $2",
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self, statuses), fields(statuses = ?statuses), err)]
    async fn delete_older_than(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<u64, JobStoreError> {
        let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status = ANY($1) AND updated_at < $2",
        )
        .bind(&names)
        .bind(cutoff)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_older_than", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn count_by_status(&self) -> Result<StatusCounts, JobStoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM jobs GROUP BY status")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_by_status", e))?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(|e| JobStoreError::Decode(format!("failed to read status: {e}")))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| JobStoreError::Decode(format!("failed to read count: {e}")))?;
            let status = JobStatus::parse(&status)
                .ok_or_else(|| JobStoreError::Decode(format!("unknown status: {status}")))?;
            counts.add(status, count as u64);
        }
        Ok(counts)
    }
}

fn select_jobs(tail: &str) -> String {
    format!(
        "SELECT id, job_type, payload, status, attempts, max_attempts, \
         scheduled_for, last_error, version, created_at, updated_at \
         FROM jobs {tail}"
    )
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<Job, JobStoreError> {
    let decode = |e: sqlx::Error| JobStoreError::Decode(format!("failed to read job row: {e}"));

    let status: String = row.try_get("status").map_err(decode)?;
    let status = JobStatus::parse(&status)
        .ok_or_else(|| JobStoreError::Decode(format!("unknown status: {status}")))?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(decode)?),
        job_type: row.try_get("job_type").map_err(decode)?,
        payload: row.try_get("payload").map_err(decode)?,
        status,
        attempts: row.try_get::<i32, _>("attempts").map_err(decode)? as u32,
        max_attempts: row.try_get::<i32, _>("max_attempts").map_err(decode)? as u32,
        scheduled_for: row.try_get("scheduled_for").map_err(decode)?,
        last_error: row.try_get("last_error").map_err(decode)?,
        version: row.try_get::<i64, _>("version").map_err(decode)? as u64,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => JobStoreError::Unavailable(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            JobStoreError::Decode(format!("decode error in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            JobStoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            JobStoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        _ => JobStoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
