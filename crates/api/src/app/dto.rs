//! Request/response DTOs for the trigger boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use driftq_queue::{Job, JobId};

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    /// Opaque payload forwarded verbatim to the handler; defaults to `null`.
    #[serde(default)]
    pub payload: serde_json::Value,
    pub delay_seconds: Option<u64>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub scheduled_for: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status.as_str().to_string(),
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            scheduled_for: job.scheduled_for,
            last_error: job.last_error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    pub max_age_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ReclaimQuery {
    pub stale_after_seconds: Option<u64>,
}
