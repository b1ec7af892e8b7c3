//! Retry wrapper
//!
//! Re-runs a whole monitoring sequence when it fails. The monitors keep no
//! state between invocations, so a retry simply builds fresh pattern tables
//! and waits for the start marker again.

use super::kernel::KernelReport;
use super::monitor::JobReport;
use super::outcome::ActionStatus;
use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// A finished invocation that may have failed
pub trait Attempt {
    /// The invocation failed and may be retried
    fn failed(&self) -> bool;
}

impl Attempt for JobReport {
    fn failed(&self) -> bool {
        self.status == ActionStatus::Failed
    }
}

impl Attempt for KernelReport {
    fn failed(&self) -> bool {
        self.status == ActionStatus::Failed
    }
}

/// Retry policy for whole monitoring sequences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Delay multiplier (exponential backoff)
    pub backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy making up to `max_attempts` attempts
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set delay before the first retry
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delay before retry number `retry` (0 = first retry)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return self.initial_delay;
        }

        let multiplier = self.backoff_multiplier
            .powi(i32::try_from(retry).unwrap_or(i32::MAX));
        let delay_secs = self.initial_delay.as_secs_f32() * multiplier;
        let capped = delay_secs.min(self.max_delay.as_secs_f32());

        Duration::from_secs_f32(capped)
    }

    /// Another attempt is allowed after `attempt` attempts
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

fn retryable(err: &MonitorError) -> bool {
    // a broken job definition fails the same way every time
    !matches!(err, MonitorError::Config(_) | MonitorError::InvalidMeasurement { .. })
}

/// Run `op` until it succeeds or the policy gives up.
///
/// `op` receives the attempt number, starting at 1. The result of the last
/// attempt is returned.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    T: Attempt,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        let result = op(attempt).await;
        let retry = match &result {
            Ok(outcome) => outcome.failed(),
            Err(e) => retryable(e),
        };

        if !retry || !policy.should_retry(attempt) {
            return result;
        }

        let delay = policy.delay_for_retry(attempt - 1);
        match &result {
            Ok(_) => warn!("Attempt {} failed, retrying in {:?}", attempt, delay),
            Err(e) => warn!("Attempt {} failed: {}, retrying in {:?}", attempt, e, delay),
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
        info!("Retry attempt {}/{}", attempt, policy.max_attempts);
    }
}
