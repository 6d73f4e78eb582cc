//! Job store contract.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::job::{Job, JobId, JobStatus};
use crate::stats::StatusCounts;

/// Job store operation error.
///
/// These are infrastructure errors. Per-job execution failures never surface
/// here; they are captured on the job record itself.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// Insert collided with an existing job id.
    #[error("job already exists: {0}")]
    Duplicate(JobId),

    /// A stored record could not be decoded into a `Job`.
    #[error("job record decode failed: {0}")]
    Decode(String),

    /// The persistence layer cannot be reached. Aborts the whole pass.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Mutation applied by a won conditional update.
///
/// The store contract is that a winning update applies exactly these fields,
/// bumps `version` by one, and refreshes `updated_at`; a losing update has no
/// side effects at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub attempts: u32,
    pub scheduled_for: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl JobUpdate {
    /// `Pending` -> `Running` claim transition. The attempt is counted here,
    /// at claim time, so a job is never executed more than `max_attempts`
    /// times even if the process dies mid-run.
    pub fn claim(job: &Job) -> Self {
        Self {
            status: JobStatus::Running,
            attempts: job.attempts + 1,
            scheduled_for: job.scheduled_for,
            last_error: job.last_error.clone(),
        }
    }

    /// `Running` -> `Completed`, clearing the last error.
    pub fn complete(job: &Job) -> Self {
        Self {
            status: JobStatus::Completed,
            attempts: job.attempts,
            scheduled_for: job.scheduled_for,
            last_error: None,
        }
    }

    /// `Running` -> `Pending` with an advanced due time (retry scheduling).
    pub fn retry(job: &Job, error: impl Into<String>, next_due: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Pending,
            attempts: job.attempts,
            scheduled_for: next_due,
            last_error: Some(error.into()),
        }
    }

    /// `Running` -> `Failed` (attempt budget exhausted).
    pub fn fail(job: &Job, error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            attempts: job.attempts,
            scheduled_for: job.scheduled_for,
            last_error: Some(error.into()),
        }
    }

    /// `Pending`/`Running` -> `Cancelled` (externally initiated).
    pub fn cancel(job: &Job) -> Self {
        Self {
            status: JobStatus::Cancelled,
            attempts: job.attempts,
            scheduled_for: job.scheduled_for,
            last_error: job.last_error.clone(),
        }
    }

    /// Stuck `Running` -> `Pending`, due immediately. Attempts are unchanged;
    /// the lost execution was already counted by its claim.
    pub fn release(job: &Job, now: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Pending,
            attempts: job.attempts,
            scheduled_for: now,
            last_error: job.last_error.clone(),
        }
    }
}

/// Durable job store.
///
/// ## Design Principles
///
/// - **No storage assumptions**: works with an in-memory implementation
///   (tests/dev) and SQL backends (production)
/// - **Optimistic concurrency only**: every mutation after insert goes
///   through `conditional_update`; there are no blocking locks and no
///   read-modify-write outside a version guard
/// - **Stable due ordering**: due queries are oldest-due-first with
///   `created_at` as the tie-break, so claim order is deterministic
///
/// Implementations must ensure `conditional_update` is atomic: two callers
/// racing on the same `(id, expected_version)` see exactly one `true`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `Duplicate` on id collision.
    async fn insert(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Apply `update` iff the stored version still equals `expected_version`.
    ///
    /// Returns `false` on a version mismatch (or a missing row) with no side
    /// effects. A winning update bumps the version by exactly one.
    async fn conditional_update(
        &self,
        id: JobId,
        expected_version: u64,
        update: JobUpdate,
    ) -> Result<bool, JobStoreError>;

    /// `Pending` jobs with `scheduled_for <= now`, ordered by `scheduled_for`
    /// ascending then `created_at` ascending, bounded to `limit`.
    async fn query_due(&self, now: DateTime<Utc>, limit: usize)
        -> Result<Vec<Job>, JobStoreError>;

    /// `Running` jobs whose `updated_at` is older than `cutoff` (candidates
    /// for the stuck-job reclaim sweep), oldest first, bounded to `limit`.
    async fn query_stale_running(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// List jobs, optionally filtered by status, `created_at` ascending.
    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// Delete jobs in the given statuses with `updated_at < cutoff`.
    /// Returns the number of deleted jobs.
    async fn delete_older_than(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<u64, JobStoreError>;

    /// Point-in-time job counts by status.
    async fn count_by_status(&self) -> Result<StatusCounts, JobStoreError>;
}

#[async_trait]
impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    async fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).insert(job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(id).await
    }

    async fn conditional_update(
        &self,
        id: JobId,
        expected_version: u64,
        update: JobUpdate,
    ) -> Result<bool, JobStoreError> {
        (**self).conditional_update(id, expected_version, update).await
    }

    async fn query_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).query_due(now, limit).await
    }

    async fn query_stale_running(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).query_stale_running(cutoff, limit).await
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list(status, limit).await
    }

    async fn delete_older_than(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<u64, JobStoreError> {
        (**self).delete_older_than(statuses, cutoff).await
    }

    async fn count_by_status(&self) -> Result<StatusCounts, JobStoreError> {
        (**self).count_by_status().await
    }
}
