//! Retrying a transport with exponential backoff.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::{Transport, UploadError, UploadRequest, UploadResponse};

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    ///
    /// Defaults to 3.
    pub max_attempts: u32,

    /// Delay before the second attempt. Each further delay doubles.
    ///
    /// Defaults to 1 second.
    pub initial_backoff: Duration,

    /// Upper bound for a single delay.
    ///
    /// Defaults to 30 seconds.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// The delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Wraps a [`Transport`] and retries transient failures.
///
/// Only connection-level failures and `429`/`5xx` answers are retried; the
/// last error is returned once the attempts run out.
pub struct RetryTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        RetryTransport { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for RetryTransport<T> {
    fn send(&self, request: &UploadRequest) -> Result<UploadResponse, UploadError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.send(request) {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        "upload: attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
