//! In-memory job store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::job::{Job, JobId, JobStatus};
use crate::stats::StatusCounts;
use crate::store::{JobStore, JobStoreError, JobUpdate};

/// In-memory job store.
///
/// Mirrors the durable-store semantics exactly, including the versioned
/// conditional update, so claim-race behavior can be tested without a
/// database.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
impl InMemoryJobStore {
    /// Test hook: rewrite a stored job's `updated_at` to simulate age.
    pub(crate) fn backdate(&self, id: JobId, updated_at: DateTime<Utc>) {
        if let Some(job) = self.write().get_mut(&id) {
            job.updated_at = updated_at;
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.write();
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::Duplicate(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.read().get(&id).cloned())
    }

    async fn conditional_update(
        &self,
        id: JobId,
        expected_version: u64,
        update: JobUpdate,
    ) -> Result<bool, JobStoreError> {
        let mut jobs = self.write();
        match jobs.get_mut(&id) {
            Some(job) if job.version == expected_version => {
                job.status = update.status;
                job.attempts = update.attempts;
                job.scheduled_for = update.scheduled_for;
                job.last_error = update.last_error;
                job.version += 1;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn query_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.read();
        let mut due: Vec<_> = jobs.values().filter(|j| j.is_due(now)).cloned().collect();
        due.sort_by(|a, b| {
            a.scheduled_for
                .cmp(&b.scheduled_for)
                .then(a.created_at.cmp(&b.created_at))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn query_stale_running(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.read();
        let mut stale: Vec<_> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Running && j.updated_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|j| j.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.read();
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    async fn delete_older_than(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<u64, JobStoreError> {
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, j| !(statuses.contains(&j.status) && j.updated_at < cutoff));
        Ok((before - jobs.len()) as u64)
    }

    async fn count_by_status(&self) -> Result<StatusCounts, JobStoreError> {
        let jobs = self.read();
        let mut counts = StatusCounts::default();
        for job in jobs.values() {
            counts.record(job.status);
        }
        Ok(counts)
    }
}
