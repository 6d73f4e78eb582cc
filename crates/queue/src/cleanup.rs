//! Retention sweep for terminal jobs.

use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::job::JobStatus;
use crate::store::{JobStore, JobStoreError};

/// Statuses the retention sweep is allowed to delete.
///
/// `Cancelled` is deliberately excluded: a cancelled job is an
/// operator-visible record and is only removed explicitly.
const SWEEPABLE: [JobStatus; 2] = [JobStatus::Completed, JobStatus::Failed];

/// Delete `Completed`/`Failed` jobs whose last update is older than
/// `max_age`. `Pending`, `Running`, and `Cancelled` jobs are never touched,
/// regardless of age. Returns the number of deleted jobs.
pub async fn cleanup(store: &dyn JobStore, max_age: Duration) -> Result<u64, JobStoreError> {
    let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
    let deleted = store.delete_older_than(&SWEEPABLE, cutoff).await?;
    if deleted > 0 {
        info!(deleted, %cutoff, "retention sweep removed terminal jobs");
    }
    Ok(deleted)
}
