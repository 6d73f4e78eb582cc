use axum::{
    routing::{get, post},
    Router,
};

pub mod jobs;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(jobs::enqueue).get(jobs::list))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/cancel", post(jobs::cancel))
        .route("/process", post(system::process))
        .route("/cleanup", post(system::cleanup))
        .route("/reclaim", post(system::reclaim))
        .route("/stats", get(system::stats))
}
