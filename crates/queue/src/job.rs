//! Core job record and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Job lifecycle status.
///
/// `Completed`, `Failed`, and `Cancelled` are terminal: once entered, a job
/// never transitions again and is only removed by the retention sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to become due and be claimed
    Pending,
    /// Exclusively owned by one in-flight processing pass
    Running,
    /// Handler succeeded
    Completed,
    /// Handler failed and the attempt budget is exhausted
    Failed,
    /// Cancelled externally before completion
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Stable string form, used for storage and the HTTP surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable background job.
///
/// `version` is the optimistic-concurrency token: every store mutation is
/// guarded by the last-read version and increments it by exactly one, so two
/// overlapping passes can never both win the same transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID, assigned at enqueue, immutable
    pub id: JobId,
    /// Handler-routing tag, opaque to the queue
    pub job_type: String,
    /// Opaque payload passed verbatim to the handler
    pub payload: serde_json::Value,
    /// Current lifecycle status
    pub status: JobStatus,
    /// Execution attempts so far; only ever increases
    pub attempts: u32,
    /// Ceiling on attempts before the job goes terminal
    pub max_attempts: u32,
    /// Earliest instant at which the job is eligible for claim
    pub scheduled_for: DateTime<Utc>,
    /// Last captured failure message, cleared on success
    pub last_error: Option<String>,
    /// Optimistic-concurrency version, bumped on every won update
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job due at `scheduled_for`.
    pub fn new(
        job_type: impl Into<String>,
        payload: serde_json::Value,
        scheduled_for: DateTime<Utc>,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            scheduled_for: scheduled_for.max(now),
            last_error: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Delay the due time relative to the creation instant, so
    /// `scheduled_for == created_at + delay` holds exactly.
    pub fn delayed(mut self, delay: std::time::Duration) -> Self {
        self.scheduled_for =
            self.created_at + chrono::Duration::from_std(delay).unwrap_or_default();
        self
    }

    /// Whether the job is eligible for claim at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_for <= now
    }
}
