//! Point-in-time job counts by status.

use serde::Serialize;

use crate::job::JobStatus;

/// Job counts per lifecycle status.
///
/// A snapshot read with no side effects, used for before/after comparison
/// around a processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: JobStatus) {
        *self.slot_mut(status) += 1;
    }

    pub fn add(&mut self, status: JobStatus, count: u64) {
        *self.slot_mut(status) += count;
    }

    pub fn get(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.running + self.completed + self.failed + self.cancelled
    }

    fn slot_mut(&mut self, status: JobStatus) -> &mut u64 {
        match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Running => &mut self.running,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Cancelled => &mut self.cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_get_by_status() {
        let mut counts = StatusCounts::default();
        counts.record(JobStatus::Pending);
        counts.record(JobStatus::Pending);
        counts.record(JobStatus::Failed);

        assert_eq!(counts.get(JobStatus::Pending), 2);
        assert_eq!(counts.get(JobStatus::Failed), 1);
        assert_eq!(counts.get(JobStatus::Completed), 0);
        assert_eq!(counts.total(), 3);
    }
}
