//! Job surface: enqueue, inspect, cancel.

use std::time::Duration;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;

use driftq_queue::{EnqueueOptions, JobId, JobStatus};

use crate::app::dto::{EnqueueRequest, JobResponse, ListQuery};
use crate::app::{errors, SharedQueue};

/// POST /jobs - enqueue a new job
pub async fn enqueue(
    Extension(queue): Extension<SharedQueue>,
    Json(body): Json<EnqueueRequest>,
) -> axum::response::Response {
    let mut options = EnqueueOptions::default();
    if let Some(seconds) = body.delay_seconds {
        options = options.with_delay(Duration::from_secs(seconds));
    }
    if let Some(max_attempts) = body.max_attempts {
        options = options.with_max_attempts(max_attempts);
    }

    match queue.enqueue(&body.job_type, body.payload, options).await {
        Ok(id) => (StatusCode::CREATED, Json(json!({ "id": id }))).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}

/// GET /jobs/:id - fetch one job
pub async fn get_job(
    Extension(queue): Extension<SharedQueue>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    let id = JobId::from_uuid(id);
    match queue.get(id).await {
        Ok(Some(job)) => Json(JobResponse::from(job)).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("job {id} not found"),
        ),
        Err(e) => errors::queue_error_to_response(e),
    }
}

/// GET /jobs?status=&limit= - list jobs
pub async fn list(
    Extension(queue): Extension<SharedQueue>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    let status = match query.status.as_deref() {
        None => None,
        Some(s) => match JobStatus::parse(s) {
            Some(status) => Some(status),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_status",
                    "status must be one of: pending, running, completed, failed, cancelled",
                );
            }
        },
    };

    match queue.list(status, query.limit.unwrap_or(100)).await {
        Ok(jobs) => {
            let jobs: Vec<JobResponse> = jobs.into_iter().map(JobResponse::from).collect();
            Json(jobs).into_response()
        }
        Err(e) => errors::queue_error_to_response(e),
    }
}

/// POST /jobs/:id/cancel - cancel a non-terminal job
pub async fn cancel(
    Extension(queue): Extension<SharedQueue>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    match queue.cancel(JobId::from_uuid(id)).await {
        Ok(cancelled) => Json(json!({ "cancelled": cancelled })).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}
