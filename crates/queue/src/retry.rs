//! Retry/backoff policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy configuration.
///
/// Pure and deterministic: given the same attempt count it always produces
/// the same delay, so it can be tested without a store and two invocations
/// computing a retry schedule agree on the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempt ceiling applied when an enqueue does not specify one
    pub default_max_attempts: u32,
    /// Base delay for the first retry computation
    pub base_delay: Duration,
    /// Cap on the computed delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    pub fn with_default_max_attempts(mut self, max_attempts: u32) -> Self {
        self.default_max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before the next attempt, given the number of attempts made so far.
    ///
    /// Exponential: `min(base_delay * 2^attempts, max_delay)`, saturating at
    /// the cap for large attempt counts.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let delay = 2u32
            .checked_pow(attempts)
            .map(|factor| self.base_delay.saturating_mul(factor))
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }

    /// Whether the attempt budget is exhausted.
    pub fn is_terminal(&self, attempts: u32, max_attempts: u32) -> bool {
        attempts >= max_attempts
    }
}
