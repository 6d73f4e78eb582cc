//! HTTP trigger boundary: authenticated endpoints for enqueueing jobs and
//! triggering processing/cleanup passes on a schedule.

pub mod app;
pub mod middleware;
