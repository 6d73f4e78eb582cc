use std::sync::Arc;

use driftq_queue::{
    HandlerRegistry, InMemoryJobStore, JobQueue, JobStore, PostgresJobStore, RetryPolicy,
};

#[tokio::main]
async fn main() {
    driftq_observability::init();

    let api_token = std::env::var("DRIFTQ_API_TOKEN").unwrap_or_else(|_| {
        tracing::warn!("DRIFTQ_API_TOKEN not set; using insecure dev default");
        "dev-secret".to_string()
    });

    let store: Arc<dyn JobStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .expect("failed to connect to DATABASE_URL");
            let store = PostgresJobStore::new(pool);
            store.migrate().await.expect("failed to apply job schema");
            Arc::new(store)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; jobs will not survive a restart");
            Arc::new(InMemoryJobStore::new())
        }
    };

    // Handlers are registered by the application embedding this queue; the
    // stock binary only serves the trigger surface.
    let registry = Arc::new(HandlerRegistry::new());
    if registry.is_empty() {
        tracing::warn!("no job handlers registered; claimed jobs will fail as unknown types");
    }

    let queue = Arc::new(JobQueue::new(store, registry, RetryPolicy::default()));
    let app = driftq_api::app::build_app(queue, api_token);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind 0.0.0.0:8080");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
