//! Retry bookkeeping for a single line.

use std::{thread, time::Duration};

use crate::config::RetryPolicy;

/// Retry state scoped to one [`send`](super::DeliveryEngine::send) call.
#[derive(Clone, Debug)]
pub struct DeliveryAttempt {
    policy: RetryPolicy,
    retries: u32,
}

impl DeliveryAttempt {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    /// Retries spent so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Register a retryable failure.
    ///
    /// Returns the delay to wait before the next attempt, or `None` once the
    /// retry ceiling has been reached. The delay is computed from the
    /// incremented retry count, so the default policy yields 2s then 4s.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        self.retries += 1;
        Some(self.policy.delay_for(self.retries))
    }
}

/// Blocks the delivery path between attempts.
pub trait Sleep: Send {
    fn sleep(&self, delay: Duration);
}

/// Sleeps the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, delay: Duration) {
        thread::sleep(delay);
    }
}
