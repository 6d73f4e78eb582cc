//! Atomic claim protocol.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::job::{Job, JobStatus};
use crate::store::{JobStore, JobStoreError, JobUpdate};

/// Claim up to `limit` due jobs for the current invocation.
///
/// Queries a snapshot of due `Pending` jobs and attempts the
/// `Pending` -> `Running` transition on each, guarded by the job's last-read
/// version. A lost conditional update means another overlapping invocation
/// already claimed that job; it is skipped silently. The returned jobs are
/// exclusively owned by this invocation, in oldest-due-first order, with
/// their post-claim state (status, attempts, version) reflected.
///
/// Idempotent under retries of the claim step: re-running against the same
/// snapshot wins nothing twice, and two racing invocations see at most one
/// winner per job.
pub async fn claim_due(
    store: &dyn JobStore,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Job>, JobStoreError> {
    let due = store.query_due(now, limit).await?;
    let mut claimed = Vec::with_capacity(due.len());

    for mut job in due {
        let expected_version = job.version;
        let won = store
            .conditional_update(job.id, expected_version, JobUpdate::claim(&job))
            .await?;

        if !won {
            debug!(job_id = %job.id, "claim lost to a concurrent invocation, skipping");
            continue;
        }

        // Mirror the store-side transition: a winning update applies the
        // claim fields and bumps the version by exactly one.
        job.status = JobStatus::Running;
        job.attempts += 1;
        job.version = expected_version + 1;
        job.updated_at = now;
        claimed.push(job);
    }

    Ok(claimed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::memory::InMemoryJobStore;

    use std::collections::HashSet;
    use std::sync::Arc;

    fn due_job(job_type: &str) -> Job {
        Job::new(job_type, serde_json::json!({}), Utc::now(), 3)
    }

    #[tokio::test]
    async fn claims_due_jobs_and_marks_them_running() {
        let store = InMemoryJobStore::new();
        let job = due_job("test");
        let id = job.id;
        store.insert(job).await.unwrap();

        let claimed = claim_due(&store, Utc::now(), 10).await.unwrap();

        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);
        assert_eq!(claimed[0].status, JobStatus::Running);
        assert_eq!(claimed[0].attempts, 1);

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(stored.version, claimed[0].version);
    }

    #[tokio::test]
    async fn never_claims_before_scheduled_time() {
        let store = InMemoryJobStore::new();
        let delay = std::time::Duration::from_secs(120);
        let job = Job::new("delayed", serde_json::json!({}), Utc::now(), 3).delayed(delay);
        assert!(job.scheduled_for >= job.created_at + chrono::Duration::seconds(120));
        let due_at = job.scheduled_for;
        store.insert(job).await.unwrap();

        assert!(claim_due(&store, Utc::now(), 10).await.unwrap().is_empty());
        assert!(
            claim_due(&store, due_at - chrono::Duration::seconds(1), 10)
                .await
                .unwrap()
                .is_empty()
        );

        let claimed = claim_due(&store, due_at, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
    }

    #[tokio::test]
    async fn interleaved_invocations_cannot_both_win_a_job() {
        let store = InMemoryJobStore::new();
        let job = due_job("contended");
        let id = job.id;
        store.insert(job).await.unwrap();

        // Both invocations read the same due snapshot.
        let now = Utc::now();
        let snapshot_a = store.query_due(now, 10).await.unwrap();
        let snapshot_b = store.query_due(now, 10).await.unwrap();
        assert_eq!(snapshot_a[0].version, snapshot_b[0].version);

        let won_a = store
            .conditional_update(id, snapshot_a[0].version, JobUpdate::claim(&snapshot_a[0]))
            .await
            .unwrap();
        let won_b = store
            .conditional_update(id, snapshot_b[0].version, JobUpdate::claim(&snapshot_b[0]))
            .await
            .unwrap();

        assert!(won_a);
        assert!(!won_b);
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_passes_claim_disjoint_job_sets() {
        let store = InMemoryJobStore::arc();
        let total = 40;
        for i in 0..total {
            store
                .insert(Job::new("race", serde_json::json!({ "i": i }), Utc::now(), 3))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                loop {
                    let batch = claim_due(store.as_ref(), Utc::now(), 5).await.unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    mine.extend(batch.into_iter().map(|j| j.id));
                }
                mine
            }));
        }

        let mut seen = HashSet::new();
        let mut claimed_total = 0;
        for handle in handles {
            for id in handle.await.unwrap() {
                claimed_total += 1;
                assert!(seen.insert(id), "job {id} claimed by two passes");
            }
        }
        assert_eq!(claimed_total, total);
    }

    #[tokio::test]
    async fn respects_the_batch_limit() {
        let store = InMemoryJobStore::new();
        for i in 0..5 {
            store
                .insert(Job::new("bulk", serde_json::json!({ "i": i }), Utc::now(), 3))
                .await
                .unwrap();
        }

        let claimed = claim_due(&store, Utc::now(), 2).await.unwrap();
        assert_eq!(claimed.len(), 2);

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts.running, 2);
        assert_eq!(counts.pending, 3);
    }
}
