use std::sync::Arc;
use std::time::Duration;

use driftq_queue::{HandlerRegistry, InMemoryJobStore, JobQueue, JobStore, RetryPolicy};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(api_token: &str) -> Self {
        // Build the prod router over an in-memory store, bound to an
        // ephemeral port.
        let mut registry = HandlerRegistry::new();
        registry.register_fn("echo", |_job| async { Ok(()) });
        registry.register_fn("always-fails", |_job| async {
            Err(anyhow::anyhow!("downstream unavailable"))
        });

        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let policy = RetryPolicy::default().with_base_delay(Duration::from_secs(1));
        let queue = Arc::new(JobQueue::new(store, Arc::new(registry), policy));
        let app = driftq_api::app::build_app(queue, api_token.to_string());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

const TOKEN: &str = "test-secret";

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn(TOKEN).await;
    let client = client();

    let res = client
        .get(format!("{}/stats", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/stats", srv.base_url))
        .bearer_auth("wrong-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Health stays open for probes.
    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn enqueue_process_and_stats_lifecycle() {
    let srv = TestServer::spawn(TOKEN).await;
    let client = client();

    let res = client
        .post(format!("{}/jobs", srv.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({ "type": "echo", "payload": { "n": 1 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let id = body["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/process?limit=10", srv.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary: serde_json::Value = res.json().await.unwrap();
    assert_eq!(summary["processed"], 1);
    assert_eq!(summary["failed"], 0);

    let res = client
        .get(format!("{}/jobs/{}", srv.base_url, id))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let job: serde_json::Value = res.json().await.unwrap();
    assert_eq!(job["status"], "completed");
    assert_eq!(job["attempts"], 1);

    let res = client
        .get(format!("{}/stats", srv.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let stats: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stats["completed"], 1);
    assert_eq!(stats["pending"], 0);
}

#[tokio::test]
async fn failed_jobs_are_reported_in_the_pass_summary() {
    let srv = TestServer::spawn(TOKEN).await;
    let client = client();

    client
        .post(format!("{}/jobs", srv.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({ "type": "always-fails", "max_attempts": 2 }))
        .send()
        .await
        .unwrap();

    let res = client
        .post(format!("{}/process", srv.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary: serde_json::Value = res.json().await.unwrap();
    assert_eq!(summary["processed"], 0);
    assert_eq!(summary["failed"], 1);

    // Scheduled for a backoff retry, visible in the listing.
    let res = client
        .get(format!("{}/jobs?status=pending", srv.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let jobs: serde_json::Value = res.json().await.unwrap();
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert!(jobs[0]["last_error"]
        .as_str()
        .unwrap()
        .contains("downstream unavailable"));
}

#[tokio::test]
async fn empty_job_type_is_rejected() {
    let srv = TestServer::spawn(TOKEN).await;

    let res = client()
        .post(format!("{}/jobs", srv.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({ "type": "", "payload": {} }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_job_type");
}

#[tokio::test]
async fn cancel_prevents_processing() {
    let srv = TestServer::spawn(TOKEN).await;
    let client = client();

    let res = client
        .post(format!("{}/jobs", srv.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({ "type": "echo", "delay_seconds": 3600 }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let id = body["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/jobs/{}/cancel", srv.base_url, id))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["cancelled"], true);

    let res = client
        .get(format!("{}/jobs/{}", srv.base_url, id))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let job: serde_json::Value = res.json().await.unwrap();
    assert_eq!(job["status"], "cancelled");

    // Cancelling an unknown job is a 404.
    let res = client
        .post(format!(
            "{}/jobs/00000000-0000-0000-0000-000000000000/cancel",
            srv.base_url
        ))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cleanup_and_reclaim_report_counts() {
    let srv = TestServer::spawn(TOKEN).await;
    let client = client();

    let res = client
        .post(format!("{}/cleanup?max_age_seconds=0", srv.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["deleted"], 0);

    let res = client
        .post(format!("{}/reclaim?stale_after_seconds=60", srv.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["reclaimed"], 0);
}
