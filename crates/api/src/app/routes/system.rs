//! Trigger surface: processing/cleanup/reclaim passes and stats.
//!
//! These are the endpoints an external scheduler hits on a fixed cadence.
//! A pass reports aggregate statistics even when individual jobs failed;
//! only a store-level failure turns into an error response.

use std::time::Duration;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::app::dto::{CleanupQuery, ProcessQuery, ReclaimQuery};
use crate::app::{errors, SharedQueue};

const DEFAULT_BATCH_LIMIT: usize = 25;
const DEFAULT_RETENTION_SECONDS: u64 = 7 * 24 * 3600;
const DEFAULT_STALE_AFTER_SECONDS: u64 = 600;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// POST /process?limit= - run one processing pass
pub async fn process(
    Extension(queue): Extension<SharedQueue>,
    Query(query): Query<ProcessQuery>,
) -> axum::response::Response {
    let limit = query.limit.unwrap_or(DEFAULT_BATCH_LIMIT);
    match queue.process_pending(limit).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}

/// POST /cleanup?max_age_seconds= - sweep old terminal jobs
pub async fn cleanup(
    Extension(queue): Extension<SharedQueue>,
    Query(query): Query<CleanupQuery>,
) -> axum::response::Response {
    let max_age = Duration::from_secs(
        query.max_age_seconds.unwrap_or(DEFAULT_RETENTION_SECONDS),
    );
    match queue.cleanup(max_age).await {
        Ok(deleted) => Json(json!({ "deleted": deleted })).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}

/// POST /reclaim?stale_after_seconds= - return stuck running jobs to pending
pub async fn reclaim(
    Extension(queue): Extension<SharedQueue>,
    Query(query): Query<ReclaimQuery>,
) -> axum::response::Response {
    let stale_after = Duration::from_secs(
        query
            .stale_after_seconds
            .unwrap_or(DEFAULT_STALE_AFTER_SECONDS),
    );
    match queue.reclaim_stuck(stale_after).await {
        Ok(reclaimed) => Json(json!({ "reclaimed": reclaimed })).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}

/// GET /stats - point-in-time counts by status
pub async fn stats(Extension(queue): Extension<SharedQueue>) -> axum::response::Response {
    match queue.stats().await {
        Ok(counts) => Json(counts).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}
