//! Bounded retry with linear backoff

use std::future::Future;
use std::time::Duration;

use action_primitives::ExecCtx;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::FillError;

/// Attempts are capped; the wait grows by `step_ms` per attempt up to `cap_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub step_ms: u64,
    pub cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step_ms: 150,
            cap_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, step_ms: u64, cap_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            step_ms,
            cap_ms,
        }
    }

    /// Single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, 0, 0)
    }

    /// Wait before attempt `attempt + 1` (attempts are 1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let linear = self.step_ms.saturating_mul(attempt.max(1) as u64);
        Duration::from_millis(linear.min(self.cap_ms))
    }

    pub fn should_retry(&self, attempt: u32, err: &FillError) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, the
/// attempt cap is hit, or `exec` runs out of time. `op` receives the 1-based
/// attempt number.
pub async fn retry_step<T, F, Fut>(
    exec: &ExecCtx,
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, FillError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FillError>>,
{
    let mut attempt = 1;
    loop {
        if exec.is_cancelled() {
            return Err(FillError::Timeout(format!("{label}: cancelled")));
        }
        if exec.is_timeout() {
            return Err(FillError::Timeout(format!("{label}: run budget exhausted")));
        }
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(step = label, attempt, "step succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if policy.should_retry(attempt, &err) => {
                let wait = policy.backoff(attempt);
                debug!(step = label, attempt, wait_ms = wait.as_millis() as u64, "step failed, retrying: {}", err);
                sleep(wait).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(step = label, attempt, "step gave up: {}", err);
                return Err(err);
            }
        }
    }
}
