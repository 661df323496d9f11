//! Builder agent
//!
//! Runs in the execution context that renders the variation builder. It
//! serves builder commands from the message bus, drives the builder under the
//! cross-context lock and leaves a timestamped `builder-done` flag in the
//! shared store for the requesting context.

use std::sync::Arc;
use std::time::Duration;

use action_locator::ElementLocator;
use action_primitives::{poll_until_in, DomPort, ExecCtx, FilePayload, PollSpec};
use listing_core_types::{now_epoch_ms, ContextId, ContextRoute, LockScope};
use listing_event_bus::{Envelope, RequestBus};
use listing_model::VariationSet;
use listing_state_center::{FlowLog, KvStore, StoreError};
use perceiver_surface::SurfaceDetector;
use serde::{Deserialize, Serialize};
use serde_json::json;
use surface_lock::{LockOwner, OwnerReach, SurfaceLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use variation_axes::AxisResolver;
use variation_builder::{BuilderController, BuilderJob, BuilderReport, BuilderRun, BuilderState, GridPricing};

use crate::config::EngineConfig;
use crate::errors::Result;

/// Store key suffix of the hand-off flag.
pub const HANDOFF_KEY: &str = "builder-done";

const INBOX_CAPACITY: usize = 8;

type Inbox = mpsc::Receiver<Envelope<BuilderCommand, BuilderReply>>;

/// Work order for the context that can see the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderRequest {
    pub scope: LockScope,
    pub variations: VariationSet,
    pub pricing: GridPricing,
    #[serde(default)]
    pub photos: Vec<FilePayload>,
    /// Flags written before this instant belong to an earlier run.
    pub requested_at_ms: i64,
}

impl BuilderRequest {
    pub fn job(&self) -> BuilderJob {
        BuilderJob {
            variations: self.variations.clone(),
            pricing: self.pricing.clone(),
            photos: self.photos.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BuilderCommand {
    Run(BuilderRequest),
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum BuilderReply {
    Report(Box<BuilderReport>),
    Pong,
}

pub type BuilderBus = RequestBus<BuilderCommand, BuilderReply>;

/// "Builder work completed" as left in the shared store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffFlag {
    pub success: bool,
    pub final_state: BuilderState,
    pub axes_selected: usize,
    pub values_entered: usize,
    pub saved: bool,
    pub context: ContextId,
    pub requested_at_ms: i64,
    pub finished_at_ms: i64,
}

impl HandoffFlag {
    pub fn from_report(report: &BuilderReport, context: &ContextId, requested_at_ms: i64) -> Self {
        Self {
            success: report.success,
            final_state: report.final_state,
            axes_selected: report.axes_selected,
            values_entered: report.values_entered,
            saved: report.saved,
            context: context.clone(),
            requested_at_ms,
            finished_at_ms: now_epoch_ms(),
        }
    }
}

pub async fn write_handoff(store: &dyn KvStore, scope: &LockScope, flag: &HandoffFlag) -> std::result::Result<(), StoreError> {
    store.set(&scope.key(HANDOFF_KEY), serde_json::to_value(flag)?).await
}

/// The flag for `scope` if it was written at or after `since_ms`.
pub async fn read_handoff(store: &dyn KvStore, scope: &LockScope, since_ms: i64) -> Option<HandoffFlag> {
    let stored = match store.get(&scope.key(HANDOFF_KEY)).await {
        Ok(Some(stored)) => stored,
        Ok(None) => return None,
        Err(err) => {
            debug!(scope = %scope, "hand-off flag unreadable: {}", err);
            return None;
        }
    };
    if stored.written_at_ms < since_ms {
        debug!(scope = %scope, written_at_ms = stored.written_at_ms, since_ms, "stale hand-off flag ignored");
        return None;
    }
    match serde_json::from_value::<HandoffFlag>(stored.value) {
        Ok(flag) if flag.requested_at_ms >= since_ms => Some(flag),
        Ok(_) => {
            debug!(scope = %scope, "hand-off flag from an earlier request ignored");
            None
        }
        Err(err) => {
            warn!(scope = %scope, "malformed hand-off flag: {}", err);
            None
        }
    }
}

/// Bounded wait for a fresh hand-off flag.
pub async fn wait_for_handoff(
    store: &dyn KvStore,
    exec: &ExecCtx,
    scope: &LockScope,
    since_ms: i64,
    spec: PollSpec,
) -> Option<HandoffFlag> {
    poll_until_in(exec, spec, || read_handoff(store, scope, since_ms)).await
}

pub struct BuilderAgent {
    route: ContextRoute,
    port: Arc<dyn DomPort>,
    controller: BuilderController,
    store: Arc<dyn KvStore>,
    log_capacity: usize,
    run_budget: Duration,
}

impl BuilderAgent {
    pub fn new(
        route: ContextRoute,
        port: Arc<dyn DomPort>,
        controller: BuilderController,
        store: Arc<dyn KvStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            route,
            port,
            controller,
            store,
            log_capacity: config.log_capacity,
            run_budget: config.run_budget(),
        }
    }

    /// Agent with its own locator, detector and lock tier over `store`.
    pub fn from_config(
        route: ContextRoute,
        port: Arc<dyn DomPort>,
        store: Arc<dyn KvStore>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let controller = BuilderController::new(
            config.builder.clone(),
            AxisResolver::new(config.resolver.clone()),
            Arc::new(SurfaceDetector::new(config.detector.clone())?),
            Arc::new(ElementLocator::default()),
            Arc::new(SurfaceLock::new(store.clone(), config.lock.clone())),
        );
        Ok(Self::new(route, port, controller, store, config))
    }

    pub fn context(&self) -> &ContextId {
        &self.route.context
    }

    /// Runs one builder request and leaves the hand-off flag behind.
    pub async fn handle(&self, request: &BuilderRequest) -> BuilderReport {
        let exec = ExecCtx::with_budget(self.route.clone(), self.run_budget);
        let log = FlowLog::new(self.store.clone(), request.scope.clone(), self.log_capacity);
        let run = BuilderRun {
            port: self.port.as_ref(),
            exec: &exec,
            owner: LockOwner::new(self.route.context.clone(), self.route.kind, OwnerReach::Direct),
            scope: request.scope.clone(),
            log: &log,
        };
        info!(context = %self.route.context, scope = %request.scope, "builder request accepted");
        let report = self.controller.run(&run, &request.job()).await;

        let flag = HandoffFlag::from_report(&report, &self.route.context, request.requested_at_ms);
        if let Err(err) = write_handoff(self.store.as_ref(), &request.scope, &flag).await {
            warn!(scope = %request.scope, "hand-off flag not written: {}", err);
        }
        log.append("builder.handoff", json!(flag)).await;
        report
    }

    /// Serves bus requests until `shutdown` fires or the bus drops the route.
    pub async fn serve(self, bus: Arc<BuilderBus>, shutdown: CancellationToken) {
        let inbox = bus.register(self.route.context.clone(), INBOX_CAPACITY);
        self.serve_inbox(bus, inbox, shutdown).await
    }

    /// Registers on the bus right away, then serves on a background task.
    pub fn spawn(self, bus: Arc<BuilderBus>, shutdown: CancellationToken) -> JoinHandle<()> {
        let inbox = bus.register(self.route.context.clone(), INBOX_CAPACITY);
        tokio::spawn(self.serve_inbox(bus, inbox, shutdown))
    }

    async fn serve_inbox(self, bus: Arc<BuilderBus>, mut inbox: Inbox, shutdown: CancellationToken) {
        info!(context = %self.route.context, "builder agent listening");
        loop {
            let envelope = tokio::select! {
                _ = shutdown.cancelled() => break,
                envelope = inbox.recv() => envelope,
            };
            let Some(envelope) = envelope else { break };
            let (from, command, responder) = envelope.split();
            let reply = match command {
                BuilderCommand::Ping => BuilderReply::Pong,
                BuilderCommand::Run(request) => {
                    debug!(from = %from, scope = %request.scope, "builder run requested");
                    BuilderReply::Report(Box::new(self.handle(&request).await))
                }
            };
            if !responder.send(reply) {
                debug!(from = %from, "requester stopped waiting; flag carries the result");
            }
        }
        bus.unregister(&self.route.context);
        info!(context = %self.route.context, "builder agent stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listing_state_center::InMemoryKvStore;

    fn scope() -> LockScope {
        LockScope("draft:42".into())
    }

    #[tokio::test]
    async fn fresh_flag_is_read_back() {
        let store = InMemoryKvStore::new();
        let report = BuilderReport {
            success: true,
            final_state: BuilderState::Done,
            axes_selected: 2,
            values_entered: 4,
            ..BuilderReport::default()
        };
        let since = now_epoch_ms();
        let flag = HandoffFlag::from_report(&report, &ContextId("frame".into()), since);
        write_handoff(store.as_ref(), &scope(), &flag).await.unwrap();

        let read = read_handoff(store.as_ref(), &scope(), since).await.unwrap();
        assert!(read.success);
        assert_eq!(read.values_entered, 4);
    }

    #[tokio::test]
    async fn stale_flag_is_ignored() {
        let store = InMemoryKvStore::new();
        let old = HandoffFlag::from_report(&BuilderReport::default(), &ContextId("frame".into()), 1_000);
        store.insert_at(&scope().key(HANDOFF_KEY), serde_json::to_value(&old).unwrap(), 2_000);

        assert!(read_handoff(store.as_ref(), &scope(), 5_000).await.is_none());
        assert!(read_handoff(store.as_ref(), &scope(), 1_000).await.is_some());
    }

    #[tokio::test]
    async fn waiting_gives_up_without_a_flag() {
        let store = InMemoryKvStore::new();
        let exec = ExecCtx::with_budget(ContextRoute::top("https://shop.test/sell"), Duration::from_secs(5));
        let found = wait_for_handoff(store.as_ref(), &exec, &scope(), 0, PollSpec::new(0, 3)).await;
        assert!(found.is_none());
    }

    #[test]
    fn commands_carry_a_tag() {
        let raw = serde_json::to_value(BuilderCommand::Ping).unwrap();
        assert_eq!(raw["command"], "ping");
    }
}
