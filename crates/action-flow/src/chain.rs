//! Fallback Chain Coordinator
//!
//! Each logical field owns an ordered list of independent strategies. The
//! chain tries them in order, retries a strategy only while its errors are
//! retryable, stops at the first success and records every attempt. A field
//! that exhausts its chain reports `committed = false`; it never raises.

use std::time::Instant;

use action_primitives::ExecCtx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listing_model::{CommitMethod, FieldCommitResult};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::FillError;
use crate::retry::RetryPolicy;

/// What a successful strategy reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Committed {
    pub detail: Option<String>,
}

impl Committed {
    pub fn with_detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
        }
    }
}

/// One way of committing a field.
#[async_trait]
pub trait FieldStrategy<C: Sync + ?Sized>: Send + Sync {
    fn name(&self) -> &str;

    fn method(&self) -> CommitMethod;

    async fn attempt(&self, ctx: &C) -> Result<Committed, FillError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: String,
    pub method: CommitMethod,
    pub attempt: u32,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainOutcome {
    pub field: String,
    pub committed: bool,
    /// Method of the winning strategy, or of the last one tried.
    pub method: CommitMethod,
    /// Winner's detail, or why a failed chain stopped early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub attempts: Vec<AttemptRecord>,
}

impl ChainOutcome {
    pub fn last_error(&self) -> Option<&str> {
        self.attempts.iter().rev().find_map(|a| a.error.as_deref())
    }

    pub fn to_result(&self) -> FieldCommitResult {
        let result = if self.committed {
            FieldCommitResult::committed(self.field.clone(), self.method)
        } else {
            FieldCommitResult::failed(
                self.field.clone(),
                self.method,
                self.detail
                    .as_deref()
                    .or(self.last_error())
                    .unwrap_or("no strategy available"),
            )
        };
        match (&self.detail, self.committed) {
            (Some(detail), true) => result.with_detail(detail.clone()),
            _ => result,
        }
    }
}

/// Failure detail of a chain the run's deadline cut short.
pub const BUDGET_EXHAUSTED: &str = "run budget exhausted";

struct Link<C: Sync + ?Sized> {
    strategy: Box<dyn FieldStrategy<C>>,
    retry: RetryPolicy,
}

pub struct FallbackChain<C: Sync + ?Sized> {
    field: String,
    links: Vec<Link<C>>,
}

impl<C: Sync + ?Sized> FallbackChain<C> {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            links: Vec::new(),
        }
    }

    /// Appends a strategy tried once.
    pub fn then(self, strategy: impl FieldStrategy<C> + 'static) -> Self {
        self.then_with_retry(strategy, RetryPolicy::once())
    }

    pub fn then_with_retry(mut self, strategy: impl FieldStrategy<C> + 'static, retry: RetryPolicy) -> Self {
        self.links.push(Link {
            strategy: Box::new(strategy),
            retry,
        });
        self
    }

    pub fn push_boxed(&mut self, strategy: Box<dyn FieldStrategy<C>>, retry: RetryPolicy) {
        self.links.push(Link { strategy, retry });
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.links.iter().map(|link| link.strategy.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub async fn run(&self, exec: &ExecCtx, ctx: &C) -> ChainOutcome {
        let mut attempts = Vec::new();
        let mut method = self
            .links
            .first()
            .map(|link| link.strategy.method())
            .unwrap_or(CommitMethod::Dom);

        let mut out_of_time = false;
        'links: for link in &self.links {
            let name = link.strategy.name();
            method = link.strategy.method();
            let mut attempt = 1;
            loop {
                if exec.is_cancelled() || exec.is_timeout() {
                    warn!(action_id = %exec.action_id, field = %self.field, "fallback chain stopped: run budget exhausted");
                    out_of_time = true;
                    break 'links;
                }
                let started_at = Utc::now();
                let clock = Instant::now();
                let result = link.strategy.attempt(ctx).await;
                let latency_ms = clock.elapsed().as_millis() as u64;

                match result {
                    Ok(committed) => {
                        attempts.push(AttemptRecord {
                            strategy: name.to_string(),
                            method,
                            attempt,
                            ok: true,
                            error: None,
                            error_kind: None,
                            started_at,
                            latency_ms,
                        });
                        info!(
                            action_id = %exec.action_id,
                            field = %self.field,
                            strategy = name,
                            method = method.name(),
                            attempt,
                            "field committed"
                        );
                        return ChainOutcome {
                            field: self.field.clone(),
                            committed: true,
                            method,
                            detail: committed.detail,
                            attempts,
                        };
                    }
                    Err(err) => {
                        attempts.push(AttemptRecord {
                            strategy: name.to_string(),
                            method,
                            attempt,
                            ok: false,
                            error: Some(err.to_string()),
                            error_kind: Some(err.kind().to_string()),
                            started_at,
                            latency_ms,
                        });
                        if link.retry.should_retry(attempt, &err) {
                            let wait = link.retry.backoff(attempt);
                            debug!(field = %self.field, strategy = name, attempt, "strategy failed, retrying: {}", err);
                            sleep(wait).await;
                            attempt += 1;
                            continue;
                        }
                        debug!(field = %self.field, strategy = name, attempt, "strategy exhausted: {}", err);
                        break;
                    }
                }
            }
        }

        warn!(
            action_id = %exec.action_id,
            field = %self.field,
            tried = attempts.len(),
            "every strategy failed for field"
        );
        let detail = out_of_time.then(|| {
            let last = attempts.iter().rev().find_map(|a| a.error.as_deref());
            match last {
                Some(err) => format!("{BUDGET_EXHAUSTED} after: {err}"),
                None => BUDGET_EXHAUSTED.to_string(),
            }
        });
        ChainOutcome {
            field: self.field.clone(),
            committed: false,
            method,
            detail,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listing_core_types::ContextRoute;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Scripted {
        name: &'static str,
        method: CommitMethod,
        fail_times: u32,
        error: FillError,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(name: &'static str, method: CommitMethod, fail_times: u32, error: FillError) -> Self {
            Self {
                name,
                method,
                fail_times,
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl FieldStrategy<str> for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn method(&self) -> CommitMethod {
            self.method
        }

        async fn attempt(&self, ctx: &str) -> Result<Committed, FillError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_times {
                Err(self.error.clone())
            } else {
                Ok(Committed::with_detail(format!("{} wrote {ctx}", self.name)))
            }
        }
    }

    fn exec() -> ExecCtx {
        ExecCtx::with_budget(ContextRoute::top("https://shop.test/"), Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn falls_through_to_remote_write() {
        let chain = FallbackChain::<str>::new("title")
            .then_with_retry(
                Scripted::new("dom", CommitMethod::Dom, u32::MAX, FillError::NotFound("title".into())),
                RetryPolicy::new(2, 50, 100),
            )
            .then(Scripted::new("remote", CommitMethod::RemoteWrite, 0, FillError::Internal(String::new())));

        let outcome = chain.run(&exec(), "Blue Mug").await;
        assert!(outcome.committed);
        assert_eq!(outcome.method, CommitMethod::RemoteWrite);
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(outcome.attempts[1].attempt, 2);
        assert_eq!(outcome.detail.as_deref(), Some("remote wrote Blue Mug"));

        let result = outcome.to_result();
        assert!(result.committed);
        assert_eq!(result.method, CommitMethod::RemoteWrite);
    }

    #[tokio::test]
    async fn non_retryable_moves_on_immediately() {
        let chain = FallbackChain::<str>::new("price")
            .then_with_retry(
                Scripted::new("dom", CommitMethod::Dom, u32::MAX, FillError::Internal("boom".into())),
                RetryPolicy::new(5, 10, 10),
            )
            .then(Scripted::new("dom-alt", CommitMethod::Dom, 0, FillError::Internal(String::new())));
        let outcome = chain.run(&exec(), "12.00").await;
        assert!(outcome.committed);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].error_kind.as_deref(), Some("internal"));
    }

    #[tokio::test]
    async fn exhausted_chain_reports_last_error() {
        let chain = FallbackChain::<str>::new("condition")
            .then(Scripted::new("dom", CommitMethod::Dom, u32::MAX, FillError::NotFound("select".into())))
            .then(Scripted::new(
                "remote",
                CommitMethod::RemoteWrite,
                u32::MAX,
                FillError::RemoteWriteFailed("rejected".into()),
            ));
        let outcome = chain.run(&exec(), "New").await;
        assert!(!outcome.committed);
        let result = outcome.to_result();
        assert!(!result.committed);
        assert_eq!(result.method, CommitMethod::RemoteWrite);
        assert!(result.detail.unwrap().contains("rejected"));
    }

    #[test]
    fn empty_chain_is_not_committed() {
        let chain = FallbackChain::<str>::new("images");
        let outcome = tokio_test::block_on(chain.run(&exec(), ""));
        assert!(!outcome.committed);
        assert_eq!(outcome.to_result().detail.as_deref(), Some("no strategy available"));
    }

    #[tokio::test]
    async fn spent_budget_is_named_in_the_result() {
        let spent = ExecCtx::with_budget(ContextRoute::top("https://shop.test/"), Duration::ZERO);
        let chain = FallbackChain::<str>::new("price")
            .then(Scripted::new("dom", CommitMethod::Dom, 0, FillError::Internal(String::new())));
        let outcome = chain.run(&spent, "12.00").await;
        assert!(!outcome.committed);
        assert!(outcome.attempts.is_empty());
        assert_eq!(outcome.to_result().detail.as_deref(), Some(BUDGET_EXHAUSTED));
    }
}
