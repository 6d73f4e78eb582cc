//! One-pass dispatch: enqueue, claim + execute, cancel, stats.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::claim::claim_due;
use crate::cleanup::cleanup;
use crate::executor::{ExecutionOutcome, Executor, HandlerRegistry};
use crate::job::{Job, JobId, JobStatus};
use crate::reclaim::reclaim_stuck;
use crate::retry::RetryPolicy;
use crate::stats::StatusCounts;
use crate::store::{JobStore, JobStoreError, JobUpdate};

/// Queue operation error.
///
/// Per-job handler failures never appear here; they are contained by the
/// executor and reflected in the pass summary. Only store-level failures and
/// caller mistakes surface.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid job type: {0}")]
    InvalidJobType(String),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Enqueue options.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Delay before the job first becomes due
    pub delay: Option<Duration>,
    /// Per-job attempt ceiling; the policy default applies when unset
    pub max_attempts: Option<u32>,
}

impl EnqueueOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Aggregate result of one processing pass.
///
/// Accounting rule: `processed` counts jobs that reached `Completed` during
/// this pass; `failed` counts every failure outcome of this pass, whether
/// the job was rescheduled for retry or went terminally `Failed`. A job
/// whose post-execution update lost its version race counts as neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub processed: u64,
    pub failed: u64,
}

/// The job queue handle.
///
/// An explicit, injectable handle over a store, a handler registry, and a
/// retry policy; there is deliberately no process-wide instance. Each
/// `process_pending` call is a short-lived, stateless pass that may overlap
/// with another in-flight pass against the same store.
pub struct JobQueue<S> {
    store: S,
    executor: Executor<S>,
    policy: RetryPolicy,
}

impl<S> JobQueue<S>
where
    S: JobStore + Clone + 'static,
{
    pub fn new(store: S, registry: Arc<HandlerRegistry>, policy: RetryPolicy) -> Self {
        let executor = Executor::new(store.clone(), registry, policy.clone());
        Self {
            store,
            executor,
            policy,
        }
    }

    /// Enqueue a new job.
    ///
    /// The job becomes due at `now + delay` (immediately when no delay is
    /// given) and starts with zero attempts.
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId, QueueError> {
        if job_type.trim().is_empty() {
            return Err(QueueError::InvalidJobType(
                "job type must not be empty".to_string(),
            ));
        }

        let delay = options.delay.unwrap_or(Duration::ZERO);
        let max_attempts = options
            .max_attempts
            .unwrap_or(self.policy.default_max_attempts)
            .max(1);

        let job = Job::new(job_type, payload, Utc::now(), max_attempts).delayed(delay);
        let id = self.store.insert(job).await?;
        debug!(job_id = %id, job_type, "job enqueued");
        Ok(id)
    }

    /// Run one processing pass: claim up to `limit` due jobs, execute each,
    /// and report aggregate counts.
    ///
    /// Jobs are executed sequentially in claim order (oldest-due-first), so
    /// a slow job delays its siblings within the pass but never blocks a
    /// concurrent pass from claiming other work. Per-job failures are
    /// contained; only a store failure aborts the pass.
    pub async fn process_pending(&self, limit: usize) -> Result<PassSummary, QueueError> {
        let now = Utc::now();
        let claimed = claim_due(&self.store, now, limit).await?;
        let batch = claimed.len();

        let mut summary = PassSummary::default();
        for job in &claimed {
            match self.executor.execute(job).await? {
                ExecutionOutcome::Completed => summary.processed += 1,
                ExecutionOutcome::Retried | ExecutionOutcome::Failed => summary.failed += 1,
                ExecutionOutcome::LostOwnership => {}
            }
        }

        info!(
            claimed = batch,
            processed = summary.processed,
            failed = summary.failed,
            "processing pass finished"
        );
        Ok(summary)
    }

    /// Cancel a job that has not yet gone terminal.
    ///
    /// Returns `true` when this call performed the cancellation, `false`
    /// when the job was already terminal or the guarded update lost a race
    /// with an in-flight pass. Missing jobs are an error.
    pub async fn cancel(&self, id: JobId) -> Result<bool, QueueError> {
        let job = self
            .store
            .get(id)
            .await?
            .ok_or(QueueError::NotFound(id))?;

        if job.status.is_terminal() {
            return Ok(false);
        }

        let won = self
            .store
            .conditional_update(id, job.version, JobUpdate::cancel(&job))
            .await?;
        if won {
            info!(job_id = %id, "job cancelled");
        }
        Ok(won)
    }

    pub async fn get(&self, id: JobId) -> Result<Option<Job>, QueueError> {
        Ok(self.store.get(id).await?)
    }

    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, QueueError> {
        Ok(self.store.list(status, limit).await?)
    }

    /// Point-in-time counts by status.
    pub async fn stats(&self) -> Result<StatusCounts, QueueError> {
        Ok(self.store.count_by_status().await?)
    }

    /// Delete terminal (`Completed`/`Failed`) jobs older than `max_age`.
    pub async fn cleanup(&self, max_age: Duration) -> Result<u64, QueueError> {
        Ok(cleanup(&self.store, max_age).await?)
    }

    /// Return jobs stuck in `Running` longer than `stale_after` to `Pending`.
    pub async fn reclaim_stuck(&self, stale_after: Duration) -> Result<u64, QueueError> {
        Ok(reclaim_stuck(&self.store, stale_after).await?)
    }
}
