use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use driftq_queue::{JobStoreError, QueueError};

pub fn queue_error_to_response(err: QueueError) -> axum::response::Response {
    match err {
        QueueError::InvalidJobType(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_job_type", msg)
        }
        QueueError::NotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("job {id} not found"),
        ),
        QueueError::Store(JobStoreError::Duplicate(id)) => json_error(
            StatusCode::CONFLICT,
            "duplicate_key",
            format!("job {id} already exists"),
        ),
        QueueError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
