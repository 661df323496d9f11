//! Bounded polling, the only waiting primitive in the engine.
//!
//! Every wait has both an interval and an iteration cap; exhausting the cap
//! yields `None` so callers fall through to their next strategy.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::ExecCtx;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSpec {
    pub interval_ms: u64,
    pub max_iterations: u32,
}

impl Default for PollSpec {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            max_iterations: 30,
        }
    }
}

impl PollSpec {
    pub fn new(interval_ms: u64, max_iterations: u32) -> Self {
        Self {
            interval_ms,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Single probe, no waiting.
    pub fn once() -> Self {
        Self::new(0, 1)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on wall time spent sleeping.
    pub fn budget(&self) -> Duration {
        self.interval() * self.max_iterations.saturating_sub(1)
    }
}

/// Runs `probe` until it yields `Some`, at most `spec.max_iterations` times.
pub async fn poll_until<T, F, Fut>(spec: PollSpec, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let iterations = spec.max_iterations.max(1);
    for attempt in 0..iterations {
        if let Some(found) = probe().await {
            return Some(found);
        }
        if attempt + 1 < iterations {
            trace!(attempt, "poll probe empty; sleeping");
            tokio::time::sleep(spec.interval()).await;
        }
    }
    None
}

/// [`poll_until`] that also stops on cancellation or deadline of `ctx`,
/// without sleeping out the remaining iterations.
pub async fn poll_until_in<T, F, Fut>(ctx: &ExecCtx, spec: PollSpec, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let iterations = spec.max_iterations.max(1);
    for attempt in 0..iterations {
        if ctx.is_cancelled() || ctx.is_timeout() {
            trace!(attempt, "poll stopped: context no longer live");
            return None;
        }
        if let Some(found) = probe().await {
            return Some(found);
        }
        if attempt + 1 < iterations {
            tokio::select! {
                _ = ctx.cancel_token.cancelled() => return None,
                _ = tokio::time::sleep(spec.interval()) => {}
            }
        }
    }
    None
}

/// Bounded settle delay between interaction steps.
pub async fn settle(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
