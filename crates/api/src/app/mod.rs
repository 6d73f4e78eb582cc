//! HTTP application wiring (Axum router + queue handle).
//!
//! - `routes/`: HTTP routes + handlers (jobs surface, trigger surface)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use driftq_queue::{JobQueue, JobStore};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// The queue handle shared across request handlers.
pub type SharedQueue = Arc<JobQueue<Arc<dyn JobStore>>>;

/// Build the full HTTP router (public entrypoint used by `main.rs` and by
/// applications embedding the trigger surface).
///
/// Everything except `/health` requires the shared-secret bearer token.
pub fn build_app(queue: SharedQueue, api_token: String) -> Router {
    let auth_state = middleware::AuthState {
        token: Arc::from(api_token),
    };

    // Protected routes: require the shared secret.
    let protected = routes::router()
        .layer(Extension(queue))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
