//! Variation stage: open the builder when the plain form is showing, run it
//! here when this context can read it, otherwise hand it to the builder agent
//! over the bus and wait for the `builder-done` flag.

use action_flow::FallbackChain;
use action_locator::SemanticTarget;
use action_primitives::{poll_until_in, DomPort, ExecCtx, FilePayload};
use listing_core_types::{now_epoch_ms, ContextId, ContextRoute, LockScope};
use listing_model::{CommitMethod, FieldCommitResult, ProductListingDraft, VariationSet};
use listing_state_center::FlowLog;
use perceiver_surface::{Detection, Surface};
use serde_json::json;
use surface_lock::{LockOwner, OwnerReach};
use tracing::{debug, info, warn};
use variation_builder::{BuilderJob, BuilderReport, BuilderRun, GridPricing};

use super::{click_retry, ClickTarget, DelegateLink, Engine, FillReport};
use crate::agent::{wait_for_handoff, BuilderCommand, BuilderReply, BuilderRequest, HandoffFlag};

const FIELD: &str = "variations";

/// What came back from the other context.
struct Delegated {
    peer: ContextId,
    reply: Option<BuilderReport>,
    flag: Option<HandoffFlag>,
}

impl Delegated {
    fn success(&self) -> bool {
        match (&self.flag, &self.reply) {
            (Some(flag), _) => flag.success,
            (None, Some(reply)) => reply.success,
            (None, None) => false,
        }
    }
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn fill_variations(
        &self,
        port: &dyn DomPort,
        exec: &ExecCtx,
        route: &ContextRoute,
        scope: &LockScope,
        draft: &ProductListingDraft,
        report: &mut FillReport,
        log: &FlowLog,
    ) -> FieldCommitResult {
        let Some(variations) = draft.variations.clone() else {
            return FieldCommitResult::failed(FIELD, CommitMethod::Dom, "draft has no variation set");
        };
        let job = BuilderJob {
            photos: axis_photos(&variations),
            pricing: GridPricing {
                rule: self.config.pricing,
                fallback_price: draft.price,
                default_quantity: draft.quantity.unwrap_or(1),
            },
            variations,
        };

        let detection = self.open_builder(port, exec, log).await;
        let via_shell = detection.as_ref().map(|found| found.via_shell).unwrap_or(false);

        if !via_shell {
            let local = self.run_local(port, exec, route, scope, &job, log).await;
            if !local.needs_delegation {
                let result = builder_result(&local);
                report.builder = Some(local);
                return result;
            }
            debug!(scope = %scope, "builder unreadable from this context");
            report.builder = Some(local);
        }

        let Some(link) = self.delegate.as_ref() else {
            warn!(scope = %scope, "builder lives in another context and no builder agent is connected");
            return FieldCommitResult::failed(
                FIELD,
                CommitMethod::Dom,
                "builder lives in another context and no builder agent is connected",
            );
        };
        report.delegated = true;
        match self.delegate_builder(link, exec, route, scope, &job, log).await {
            Ok(delegated) => {
                let result = delegated_result(&delegated);
                if let Some(reply) = delegated.reply {
                    report.builder = Some(reply);
                }
                result
            }
            Err(detail) => FieldCommitResult::failed(FIELD, CommitMethod::Dom, detail),
        }
    }

    /// Detects the surface and clicks the open-builder control when the plain
    /// form is all there is or the detection is only a best guess.
    async fn open_builder(&self, port: &dyn DomPort, exec: &ExecCtx, log: &FlowLog) -> Option<Detection> {
        let detection = match self.detector.detect(port).await {
            Ok(found) => Some(found),
            Err(err) => {
                warn!(action_id = %exec.action_id, "surface detection failed: {}", err);
                None
            }
        };
        if detection
            .as_ref()
            .is_some_and(|found| found.surface != Surface::Plain && !found.ambiguous)
        {
            return detection;
        }

        let surface = self.surface(port, exec, None);
        let open = FallbackChain::new("variations.open").then_with_retry(
            ClickTarget::new(SemanticTarget::button(self.config.labels.open_builder.clone()), self.config.locate_poll),
            click_retry(&self.config),
        );
        let outcome = open.run(exec, &surface).await;
        log.append(
            "builder.open",
            json!({
                "clicked": outcome.committed,
                "detail": outcome.detail.as_deref().or(outcome.last_error()),
            }),
        )
        .await;
        if !outcome.committed {
            // The controller still detects on its own and reports why it stopped.
            return detection;
        }

        let detector = &self.detector;
        let opened = poll_until_in(exec, self.config.locate_poll, || async move {
            detector
                .detect(port)
                .await
                .ok()
                .filter(|found| found.surface != Surface::Plain)
        })
        .await;
        opened.or(detection)
    }

    async fn run_local(
        &self,
        port: &dyn DomPort,
        exec: &ExecCtx,
        route: &ContextRoute,
        scope: &LockScope,
        job: &BuilderJob,
        log: &FlowLog,
    ) -> BuilderReport {
        let run = BuilderRun {
            port,
            exec,
            owner: LockOwner::new(route.context.clone(), route.kind, OwnerReach::Direct),
            scope: scope.clone(),
            log,
        };
        self.builder.run(&run, job).await
    }

    async fn delegate_builder(
        &self,
        link: &DelegateLink,
        exec: &ExecCtx,
        route: &ContextRoute,
        scope: &LockScope,
        job: &BuilderJob,
        log: &FlowLog,
    ) -> Result<Delegated, String> {
        // Held as a delegating owner: the agent that can see the builder takes it over.
        let owner = LockOwner::new(route.context.clone(), route.kind, OwnerReach::Delegating);
        let lease = match self.lock.try_acquire(scope, &owner).await {
            Ok(lease) => Some(lease),
            Err(err) => {
                log.append("builder.lock", json!({ "acquired": false, "error": err.to_string() }))
                    .await;
                warn!(scope = %scope, "delegating without the lock: {}", err);
                None
            }
        };

        let outcome = self.request_builder(link, exec, route, scope, job, log).await;

        if let Some(lease) = lease {
            if let Err(err) = self.lock.release(&lease).await {
                warn!(scope = %scope, "delegation lease not released: {}", err);
            }
        }
        outcome
    }

    async fn request_builder(
        &self,
        link: &DelegateLink,
        exec: &ExecCtx,
        route: &ContextRoute,
        scope: &LockScope,
        job: &BuilderJob,
        log: &FlowLog,
    ) -> Result<Delegated, String> {
        let peer = link
            .peer
            .clone()
            .or_else(|| link.bus.any_peer(&route.context))
            .ok_or_else(|| "no builder agent registered on the bus".to_string())?;

        let started = now_epoch_ms();
        let request = BuilderRequest {
            scope: scope.clone(),
            variations: job.variations.clone(),
            pricing: job.pricing.clone(),
            photos: job.photos.clone(),
            requested_at_ms: started,
        };
        log.append("builder.request", json!({ "peer": peer, "requestedAt": started }))
            .await;
        info!(action_id = %exec.action_id, peer = %peer, scope = %scope, "builder handed to agent");

        let reply = match link
            .bus
            .request(&route.context, &peer, BuilderCommand::Run(request), self.config.bus_timeout())
            .await
        {
            Ok(Some(BuilderReply::Report(report))) => Some(*report),
            Ok(Some(BuilderReply::Pong)) => {
                warn!(peer = %peer, "agent answered a run request with pong");
                None
            }
            Ok(None) => {
                warn!(peer = %peer, "builder agent gave no response; waiting for the hand-off flag");
                None
            }
            Err(err) => {
                warn!(peer = %peer, "builder request failed: {}", err);
                None
            }
        };

        let flag = wait_for_handoff(self.store.as_ref(), exec, scope, started, self.config.handoff_poll).await;
        log.append(
            "builder.handoff.received",
            json!({
                "reply": reply.is_some(),
                "flag": flag,
            }),
        )
        .await;
        if reply.is_none() && flag.is_none() {
            return Err(format!("builder agent {peer} left no result"));
        }
        Ok(Delegated { peer, reply, flag })
    }
}

/// Axis value images, in axis order, without duplicates.
fn axis_photos(variations: &VariationSet) -> Vec<FilePayload> {
    let mut seen: Vec<&str> = Vec::new();
    let mut photos = Vec::new();
    for value in variations.axes.iter().flat_map(|axis| axis.values.iter()) {
        if let Some(url) = value.image.as_deref().filter(|url| !url.trim().is_empty()) {
            if !seen.contains(&url) {
                seen.push(url);
                photos.push(FilePayload::url(url));
            }
        }
    }
    photos
}

fn builder_result(report: &BuilderReport) -> FieldCommitResult {
    let detail = format!(
        "{} axes, {} values, grid {}/{}",
        report.axes_selected, report.values_entered, report.grid.filled_rows, report.grid.rows
    );
    if report.success {
        FieldCommitResult::committed(FIELD, CommitMethod::Dom).with_detail(detail)
    } else {
        let reason = report.failure.as_deref().unwrap_or("builder did not finish");
        FieldCommitResult::failed(FIELD, CommitMethod::Dom, format!("{reason}; {detail}"))
    }
}

fn delegated_result(delegated: &Delegated) -> FieldCommitResult {
    let detail = match (&delegated.flag, &delegated.reply) {
        (Some(flag), _) => format!(
            "{} axes, {} values via {}",
            flag.axes_selected, flag.values_entered, delegated.peer
        ),
        (None, Some(reply)) => format!(
            "{} axes, {} values via {} (no hand-off flag)",
            reply.axes_selected, reply.values_entered, delegated.peer
        ),
        (None, None) => format!("no result from {}", delegated.peer),
    };
    if delegated.success() {
        FieldCommitResult::committed(FIELD, CommitMethod::Dom).with_detail(detail)
    } else {
        FieldCommitResult::failed(FIELD, CommitMethod::Dom, detail)
    }
}
