//! Retry policy for failed ingestion jobs. Purely a function of attempt
//! counters; it never sees payloads or task output.

use std::time::Duration;

use common::storage::types::ingestion_job::{
    IngestionJob, DEFAULT_BACKOFF_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
};

/// What to do with a job whose attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the job back in the queue, visible again after the delay.
    Requeue(Duration),
    /// Attempts exhausted; the job is terminally failed.
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_delay: Duration::from_millis(DEFAULT_BACKOFF_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff_delay,
        }
    }

    /// Each job carries its own knobs, fixed at enqueue time.
    pub fn for_job(job: &IngestionJob) -> Self {
        Self::new(job.max_attempts, job.backoff_delay())
    }

    /// `attempt` is the number of executions so far, the one that just
    /// failed included. Fixed delay between attempts.
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt < self.max_attempts {
            RetryDecision::Requeue(self.backoff_delay)
        } else {
            RetryDecision::GiveUp
        }
    }
}
