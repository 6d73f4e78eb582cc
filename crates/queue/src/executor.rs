//! Job execution: handler lookup, outcome capture, state transition.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::job::Job;
use crate::retry::RetryPolicy;
use crate::store::{JobStore, JobStoreError, JobUpdate};

/// A registered job handler.
///
/// Handlers receive the job (payload included, verbatim) and report success
/// or failure through the returned `Result`. Errors and panics are both
/// captured by the executor as failure outcomes; they never abort the
/// processing of sibling jobs in the same batch.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> anyhow::Result<()>;
}

type BoxedHandlerFn =
    Box<dyn Fn(Job) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

struct FnHandler {
    f: BoxedHandlerFn,
}

#[async_trait]
impl JobHandler for FnHandler {
    async fn run(&self, job: &Job) -> anyhow::Result<()> {
        (self.f)(job.clone()).await
    }
}

/// Mapping from job type to handler.
///
/// Registration happens at process startup, outside the queue core; dispatch
/// is by type string, so handler sets are extensible without touching the
/// dispatcher.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type, replacing any previous registration.
    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    /// Register an async closure as the handler for a job type.
    pub fn register_fn<F, Fut>(&mut self, job_type: impl Into<String>, f: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = FnHandler {
            f: Box::new(move |job| {
                Box::pin(f(job)) as Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            }),
        };
        self.register(job_type, Arc::new(handler));
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// What happened to one claimed job during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Handler succeeded; the job reached `Completed`
    Completed,
    /// Handler failed; the job went back to `Pending` with an advanced due time
    Retried,
    /// Handler failed with the attempt budget exhausted; the job reached `Failed`
    Failed,
    /// The post-execution update lost its version race (e.g. the job was
    /// cancelled or reclaimed mid-run); logged as an anomaly, nothing persisted
    LostOwnership,
}

/// Runs claimed jobs and persists their outcomes.
///
/// All persistence rides the version obtained at claim time, so a job
/// mutated behind this invocation's back (cancel, reclaim) is detected as a
/// lost race rather than overwritten.
pub struct Executor<S> {
    store: S,
    registry: Arc<HandlerRegistry>,
    policy: RetryPolicy,
}

impl<S: JobStore> Executor<S> {
    pub fn new(store: S, registry: Arc<HandlerRegistry>, policy: RetryPolicy) -> Self {
        Self {
            store,
            registry,
            policy,
        }
    }

    /// Execute one claimed (`Running`) job and persist the resulting
    /// transition.
    ///
    /// Only a store failure is an error; handler failures (including a
    /// missing registration and panics) are captured into the job record and
    /// reported through the outcome.
    pub async fn execute(&self, job: &Job) -> Result<ExecutionOutcome, JobStoreError> {
        let result = match self.registry.get(&job.job_type) {
            Some(handler) => run_handler(handler, job.clone()).await,
            None => Err(format!(
                "unknown job type: no handler registered for \"{}\"",
                job.job_type
            )),
        };

        match result {
            Ok(()) => {
                let won = self
                    .store
                    .conditional_update(job.id, job.version, JobUpdate::complete(job))
                    .await?;
                if !won {
                    warn!(job_id = %job.id, "completion update lost the version race");
                    return Ok(ExecutionOutcome::LostOwnership);
                }
                debug!(job_id = %job.id, job_type = %job.job_type, "job completed");
                Ok(ExecutionOutcome::Completed)
            }
            Err(error) => self.persist_failure(job, error).await,
        }
    }

    async fn persist_failure(
        &self,
        job: &Job,
        error: String,
    ) -> Result<ExecutionOutcome, JobStoreError> {
        if self.policy.is_terminal(job.attempts, job.max_attempts) {
            let won = self
                .store
                .conditional_update(job.id, job.version, JobUpdate::fail(job, &error))
                .await?;
            if !won {
                warn!(job_id = %job.id, "failure update lost the version race");
                return Ok(ExecutionOutcome::LostOwnership);
            }
            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                attempts = job.attempts,
                error = %error,
                "job failed permanently"
            );
            return Ok(ExecutionOutcome::Failed);
        }

        let delay = self.policy.next_delay(job.attempts);
        let next_due = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        let won = self
            .store
            .conditional_update(job.id, job.version, JobUpdate::retry(job, &error, next_due))
            .await?;
        if !won {
            warn!(job_id = %job.id, "retry update lost the version race");
            return Ok(ExecutionOutcome::LostOwnership);
        }
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            next_due = %next_due,
            error = %error,
            "job failed, retry scheduled"
        );
        Ok(ExecutionOutcome::Retried)
    }
}

/// Run the handler in its own task so a panic is contained and reported as a
/// failure outcome instead of tearing down the pass.
async fn run_handler(handler: Arc<dyn JobHandler>, job: Job) -> Result<(), String> {
    let task = tokio::spawn(async move { handler.run(&job).await });
    match task.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(format!("{error:#}")),
        Err(join_error) => {
            if join_error.is_panic() {
                let panic = join_error.into_panic();
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "opaque panic payload".to_string());
                Err(format!("handler panicked: {msg}"))
            } else {
                Err("handler task cancelled".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::claim_due;
    use crate::job::JobStatus;
    use crate::memory::InMemoryJobStore;

    use std::sync::atomic::{AtomicU32, Ordering};

    fn registry_with(job_type: &str, ok: bool) -> Arc<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();
        if ok {
            registry.register_fn(job_type, |_job| async { Ok(()) });
        } else {
            registry.register_fn(job_type, |_job| async {
                Err(anyhow::anyhow!("handler exploded"))
            });
        }
        Arc::new(registry)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().with_base_delay(std::time::Duration::from_secs(1))
    }

    async fn insert_and_claim(store: &InMemoryJobStore, job_type: &str, max_attempts: u32) -> Job {
        store
            .insert(Job::new(job_type, serde_json::json!({}), Utc::now(), max_attempts))
            .await
            .unwrap();
        let mut claimed = claim_due(store, Utc::now(), 1).await.unwrap();
        claimed.pop().unwrap()
    }

    #[tokio::test]
    async fn success_transitions_to_completed_and_clears_error() {
        let store = InMemoryJobStore::arc();
        let executor = Executor::new(
            Arc::clone(&store),
            registry_with("ok", true),
            fast_policy(),
        );

        let claimed = insert_and_claim(&store, "ok", 3).await;
        let outcome = executor.execute(&claimed).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome::Completed);
        let stored = store.get(claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.is_none());
    }

    #[tokio::test]
    async fn failure_below_budget_schedules_a_retry_with_backoff() {
        let store = InMemoryJobStore::arc();
        let executor = Executor::new(
            Arc::clone(&store),
            registry_with("boom", false),
            fast_policy(),
        );

        let before = Utc::now();
        let claimed = insert_and_claim(&store, "boom", 3).await;
        let outcome = executor.execute(&claimed).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome::Retried);
        let stored = store.get(claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert!(stored.scheduled_for > before);
        assert!(stored.last_error.as_deref().unwrap().contains("handler exploded"));
    }

    #[tokio::test]
    async fn failure_at_budget_goes_terminal() {
        let store = InMemoryJobStore::arc();
        let executor = Executor::new(
            Arc::clone(&store),
            registry_with("boom", false),
            fast_policy(),
        );

        let claimed = insert_and_claim(&store, "boom", 1).await;
        let outcome = executor.execute(&claimed).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome::Failed);
        let stored = store.get(claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.is_some());
    }

    #[tokio::test]
    async fn unknown_job_type_is_a_normal_failure() {
        let store = InMemoryJobStore::arc();
        let executor = Executor::new(
            Arc::clone(&store),
            Arc::new(HandlerRegistry::new()),
            fast_policy(),
        );

        let claimed = insert_and_claim(&store, "nobody-home", 1).await;
        let outcome = executor.execute(&claimed).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome::Failed);
        let stored = store.get(claimed.id).await.unwrap().unwrap();
        assert!(stored.last_error.as_deref().unwrap().contains("unknown job type"));
    }

    async fn panicking_handler(_job: Job) -> anyhow::Result<()> {
        panic!("wires crossed")
    }

    #[tokio::test]
    async fn handler_panic_is_captured_as_a_failure() {
        let store = InMemoryJobStore::arc();
        let mut registry = HandlerRegistry::new();
        registry.register_fn("panics", panicking_handler);
        let executor = Executor::new(Arc::clone(&store), Arc::new(registry), fast_policy());

        let claimed = insert_and_claim(&store, "panics", 3).await;
        let outcome = executor.execute(&claimed).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome::Retried);
        let stored = store.get(claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert!(stored.last_error.as_deref().unwrap().contains("wires crossed"));
    }

    #[tokio::test]
    async fn lost_version_race_is_an_anomaly_not_an_error() {
        let store = InMemoryJobStore::arc();
        let executor = Executor::new(
            Arc::clone(&store),
            registry_with("ok", true),
            fast_policy(),
        );

        let claimed = insert_and_claim(&store, "ok", 3).await;

        // The job is cancelled behind the executor's back.
        let won = store
            .conditional_update(claimed.id, claimed.version, JobUpdate::cancel(&claimed))
            .await
            .unwrap();
        assert!(won);

        let outcome = executor.execute(&claimed).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::LostOwnership);
        let stored = store.get(claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn handler_sees_the_payload_verbatim() {
        let store = InMemoryJobStore::arc();
        let seen = Arc::new(AtomicU32::new(0));
        let seen_in_handler = Arc::clone(&seen);

        let mut registry = HandlerRegistry::new();
        registry.register_fn("echo", move |job| {
            let seen = Arc::clone(&seen_in_handler);
            async move {
                let n = job.payload["n"].as_u64().unwrap() as u32;
                seen.store(n, Ordering::SeqCst);
                Ok(())
            }
        });
        let executor = Executor::new(Arc::clone(&store), Arc::new(registry), fast_policy());

        store
            .insert(Job::new("echo", serde_json::json!({ "n": 42 }), Utc::now(), 3))
            .await
            .unwrap();
        let claimed = claim_due(store.as_ref(), Utc::now(), 1).await.unwrap();
        executor.execute(&claimed[0]).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
