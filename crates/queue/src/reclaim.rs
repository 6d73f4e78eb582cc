//! Stuck-job reclaim sweep.
//!
//! A pass may be abandoned mid-way (process killed, deploy, timeout), which
//! leaves its claimed jobs in `Running` with nobody to finish them. The
//! reclaim sweep returns jobs stuck in `Running` beyond a staleness
//! threshold back to `Pending`, due immediately. The transition is guarded
//! by the job's version, so a reclaim racing a still-alive (merely slow)
//! pass can only interleave safely: either the reclaim wins and the slow
//! pass's final update becomes a logged anomaly, or the pass finishes first
//! and the reclaim loses.

use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::store::{JobStore, JobStoreError, JobUpdate};

/// Upper bound on jobs examined per sweep.
const RECLAIM_BATCH: usize = 100;

/// Return jobs stuck in `Running` longer than `stale_after` to `Pending`.
///
/// Attempts are left unchanged; the interrupted execution was already
/// counted by its claim, so a job that repeatedly dies mid-run still
/// exhausts its attempt budget instead of looping forever. Returns the
/// number of reclaimed jobs.
pub async fn reclaim_stuck(
    store: &dyn JobStore,
    stale_after: Duration,
) -> Result<u64, JobStoreError> {
    let now = Utc::now();
    let cutoff = now - chrono::Duration::from_std(stale_after).unwrap_or_default();
    let stale = store.query_stale_running(cutoff, RECLAIM_BATCH).await?;

    let mut reclaimed = 0u64;
    for job in stale {
        let won = store
            .conditional_update(job.id, job.version, JobUpdate::release(&job, now))
            .await?;
        if won {
            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                stuck_since = %job.updated_at,
                "reclaimed job stuck in running"
            );
            reclaimed += 1;
        }
    }

    if reclaimed > 0 {
        info!(reclaimed, "stuck-job sweep finished");
    }
    Ok(reclaimed)
}
