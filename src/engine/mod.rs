//! Form-filling orchestration
//!
//! `Engine::fill_form` walks the fixed stage sequence (title, price,
//! quantity, condition, description, photos, variations, specifics, submit).
//! Every field is committed through its own fallback chain: DOM strategies
//! first, the structured remote write last. A failed field is recorded and
//! the run moves on; submission is always attempted.

mod report;
mod surface;
mod variations;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use action_flow::{FallbackChain, FieldStrategy, LocateAndCommit, LocateAndUpload, RetryPolicy};
use action_locator::{ElementLocator, SemanticTarget};
use action_primitives::{DomPort, ExecCtx, FilePayload, PollSpec};
use draft_remote::{DraftApi, HttpDraftApi, RemoteField, RemoteFieldWriter};
use listing_core_types::{ContextId, ContextRoute, DraftId, LockScope};
use listing_model::{CommitMethod, FieldCommitResult, ImageSource, ProductListingDraft};
use listing_state_center::{FileKvStore, FlowLog, KvStore};
use perceiver_surface::SurfaceDetector;
use serde_json::json;
use surface_lock::SurfaceLock;
use tracing::{info, warn};
use uuid::Uuid;
use variation_axes::AxisResolver;
use variation_builder::BuilderController;

use crate::agent::BuilderBus;
use crate::config::EngineConfig;
use crate::errors::Result;

pub use report::FillReport;
pub use surface::{ClickTarget, DraftSurface, FillSurface, RemoteWrite, SubmitListing};

/// Bus route to the context that can see the variation builder.
#[derive(Clone)]
pub struct DelegateLink {
    pub bus: Arc<BuilderBus>,
    /// Fixed peer; `None` asks the bus for any registered agent.
    pub peer: Option<ContextId>,
}

pub struct Engine {
    config: EngineConfig,
    locator: Arc<ElementLocator>,
    detector: Arc<SurfaceDetector>,
    lock: Arc<SurfaceLock>,
    store: Arc<dyn KvStore>,
    remote: Option<RemoteFieldWriter>,
    builder: BuilderController,
    delegate: Option<DelegateLink>,
}

impl Engine {
    pub fn new(config: EngineConfig, store: Arc<dyn KvStore>) -> Result<Self> {
        config.validate()?;
        let locator = Arc::new(ElementLocator::default());
        let detector = Arc::new(SurfaceDetector::new(config.detector.clone())?);
        let lock = Arc::new(SurfaceLock::new(store.clone(), config.lock.clone()));
        let builder = BuilderController::new(
            config.builder.clone(),
            AxisResolver::new(config.resolver.clone()),
            detector.clone(),
            locator.clone(),
            lock.clone(),
        );
        Ok(Self {
            config,
            locator,
            detector,
            lock,
            store,
            remote: None,
            builder,
            delegate: None,
        })
    }

    /// Engine over the file-backed store, with the HTTP draft client when a
    /// base url is configured.
    pub async fn from_config(config: EngineConfig) -> Result<Self> {
        let store: Arc<dyn KvStore> = Arc::new(FileKvStore::open(config.state_dir()?).await?);
        let remote = match &config.remote.base_url {
            Some(base) => {
                let api = HttpDraftApi::new(base, Duration::from_millis(config.remote.timeout_ms))?;
                Some(Arc::new(api) as Arc<dyn DraftApi>)
            }
            None => None,
        };
        let engine = Self::new(config, store)?;
        Ok(match remote {
            Some(api) => engine.with_remote(api),
            None => engine,
        })
    }

    pub fn with_remote(mut self, api: Arc<dyn DraftApi>) -> Self {
        self.remote = Some(RemoteFieldWriter::new(api));
        self
    }

    pub fn with_builder_agent(mut self, bus: Arc<BuilderBus>, peer: Option<ContextId>) -> Self {
        self.delegate = Some(DelegateLink { bus, peer });
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn lock(&self) -> &Arc<SurfaceLock> {
        &self.lock
    }

    pub fn locator(&self) -> &Arc<ElementLocator> {
        &self.locator
    }

    pub fn detector(&self) -> &Arc<SurfaceDetector> {
        &self.detector
    }

    pub(crate) fn remote(&self) -> Option<&RemoteFieldWriter> {
        self.remote.as_ref()
    }

    /// Borrowed view handed to field strategies.
    pub fn surface<'a>(&'a self, port: &'a dyn DomPort, exec: &'a ExecCtx, draft_id: Option<&'a DraftId>) -> FillSurface<'a> {
        FillSurface {
            port,
            locator: &self.locator,
            exec,
            tempo: &self.config.tempo,
            locate_poll: self.config.locate_poll,
            remote: self.remote.as_ref(),
            draft_id,
        }
    }

    /// Fills the listing form on `port` from `draft` and submits it.
    ///
    /// Only an invalid draft is an error. Field trouble lands in the report.
    pub async fn fill_form(&self, port: &dyn DomPort, route: ContextRoute, draft: &ProductListingDraft) -> Result<FillReport> {
        draft.validate()?;
        let exec = ExecCtx::with_budget(route.clone(), self.config.run_budget());
        let draft_id = draft.draft_id.as_ref();
        let scope = LockScope::resolve(draft_id, &route);
        let log = FlowLog::new(self.store.clone(), scope.clone(), self.config.log_capacity);
        let surface = self.surface(port, &exec, draft_id);
        let mut report = FillReport::new(Uuid::new_v4().to_string(), scope.clone(), draft.draft_id.clone());

        info!(action_id = %exec.action_id, scope = %scope, route = %route, "fill started");
        log.append(
            "fill.start",
            json!({
                "run": report.run_id,
                "context": route.context,
                "url": route.url,
                "variations": draft.has_variations(),
            }),
        )
        .await;

        let title = self.field_chain(
            "title",
            &surface,
            LocateAndCommit::new(SemanticTarget::TitleInput, draft.title.clone()),
            RemoteField::Title(draft.title.clone()),
        );
        self.commit(title, &surface, &mut report, &log).await;

        let price = self.field_chain(
            "price",
            &surface,
            LocateAndCommit::new(SemanticTarget::PriceInput, draft.price_text()),
            RemoteField::Price(draft.price),
        );
        self.commit(price, &surface, &mut report, &log).await;

        // Per-combination quantities belong to the builder grid.
        if let Some(quantity) = draft.quantity.filter(|_| !draft.has_variations()) {
            let chain = self.field_chain(
                "quantity",
                &surface,
                LocateAndCommit::new(SemanticTarget::QuantityInput, quantity.to_string()),
                RemoteField::Quantity(quantity),
            );
            self.commit(chain, &surface, &mut report, &log).await;
        }

        if let Some(condition) = draft.condition.as_deref().filter(|value| !value.trim().is_empty()) {
            let chain = self.field_chain(
                "condition",
                &surface,
                LocateAndCommit::new(SemanticTarget::ConditionSelect, condition),
                RemoteField::Condition(condition.to_string()),
            );
            self.commit(chain, &surface, &mut report, &log).await;
        }

        if !draft.description.trim().is_empty() {
            let chain = self.field_chain(
                "description",
                &surface,
                LocateAndCommit::new(SemanticTarget::DescriptionEditor, draft.description.clone()),
                RemoteField::Description(draft.description.clone()),
            );
            self.commit(chain, &surface, &mut report, &log).await;
        }

        if !draft.images.is_empty() {
            self.fill_images(draft, &surface, &mut report, &log).await;
        }

        if draft.has_variations() {
            let result = self.fill_variations(port, &exec, &route, &scope, draft, &mut report, &log).await;
            log.append(
                "field.variations",
                json!({ "committed": result.committed, "detail": result.detail }),
            )
            .await;
            report.push(result);
        }

        if !draft.specifics.is_empty() {
            self.fill_specifics(draft, &surface, &mut report, &log).await;
        }

        // Submission always gets a try, even when the fill spent its budget.
        let submit_exec = ExecCtx::with_budget(route.clone(), self.config.submit_budget());
        let submit_surface = self.surface(port, &submit_exec, draft_id);
        let clicked = Arc::new(AtomicBool::new(false));
        let submit = FallbackChain::new("submit")
            .then_with_retry(SubmitListing::new(clicked.clone(), self.reaction_poll()), self.config.retry);
        self.commit(submit, &submit_surface, &mut report, &log).await;
        report.submit_attempted = clicked.load(Ordering::SeqCst);

        let failed: Vec<String> = report.failed_fields().into_iter().map(str::to_string).collect();
        log.append(
            "fill.done",
            json!({
                "run": report.run_id,
                "summary": report.summary(),
                "submitAttempted": report.submit_attempted,
            }),
        )
        .await;
        if failed.is_empty() {
            info!(action_id = %exec.action_id, scope = %scope, "fill finished; every field committed");
        } else {
            warn!(action_id = %exec.action_id, scope = %scope, failed = ?failed, "fill finished with unconfirmed fields");
        }
        report.finished_at = chrono::Utc::now();
        report.log = log.entries().await;
        Ok(report)
    }

    /// Bounded wait for the page to react to a click.
    pub(crate) fn reaction_poll(&self) -> PollSpec {
        PollSpec::new(self.config.locate_poll.interval_ms, self.config.locate_poll.max_iterations.min(10))
    }

    /// DOM strategy first, then the remote write when a draft record is reachable.
    pub(crate) fn field_chain<'s>(
        &self,
        field: &str,
        surface: &FillSurface<'s>,
        dom: impl FieldStrategy<FillSurface<'s>> + 'static,
        remote: RemoteField,
    ) -> FallbackChain<FillSurface<'s>> {
        let chain = FallbackChain::new(field).then_with_retry(dom, self.config.retry);
        if surface.can_write_remote() {
            chain.then_with_retry(RemoteWrite::new(remote), self.config.retry)
        } else {
            chain
        }
    }

    async fn commit<'s>(
        &self,
        chain: FallbackChain<FillSurface<'s>>,
        surface: &FillSurface<'s>,
        report: &mut FillReport,
        log: &FlowLog,
    ) -> FieldCommitResult {
        let outcome = chain.run(surface.exec, surface).await;
        let result = report.push_chain(&outcome);
        log.append(
            &format!("field.{}", result.field),
            json!({
                "committed": result.committed,
                "method": result.method.name(),
                "detail": result.detail,
                "attempts": outcome.attempts.len(),
            }),
        )
        .await;
        result
    }

    async fn fill_images(&self, draft: &ProductListingDraft, surface: &FillSurface<'_>, report: &mut FillReport, log: &FlowLog) {
        let payloads: Vec<FilePayload> = draft
            .images
            .iter()
            .map(|image| match image {
                ImageSource::Url(url) => FilePayload::url(url.clone()),
                ImageSource::Inline(inline) => {
                    FilePayload::bytes(inline.file_name.clone(), inline.mime.clone(), inline.data.clone())
                }
            })
            .collect();
        let mut chain =
            FallbackChain::new("images").then_with_retry(LocateAndUpload::new(SemanticTarget::PhotoInput, payloads), self.config.retry);
        // Inline payloads have no url the draft record could point at.
        let urls = draft.image_urls();
        if !urls.is_empty() && surface.can_write_remote() {
            chain = chain.then_with_retry(RemoteWrite::new(RemoteField::Pictures(urls)), self.config.retry);
        }
        self.commit(chain, surface, report, log).await;
    }

    /// One chain per attribute, then an aggregate `specifics` result.
    async fn fill_specifics(&self, draft: &ProductListingDraft, surface: &FillSurface<'_>, report: &mut FillReport, log: &FlowLog) {
        let mut committed = 0;
        let mut missing = Vec::new();
        for (name, value) in &draft.specifics {
            if value.trim().is_empty() {
                continue;
            }
            let chain = self.field_chain(
                &format!("specifics.{name}"),
                surface,
                LocateAndCommit::new(SemanticTarget::AttributeField(name.clone()), value.clone()).typeahead(),
                RemoteField::Specific {
                    name: name.clone(),
                    value: value.clone(),
                },
            );
            if self.commit(chain, surface, report, log).await.committed {
                committed += 1;
            } else {
                missing.push(name.clone());
            }
        }
        let result = if missing.is_empty() {
            FieldCommitResult::committed("specifics", CommitMethod::Dom).with_detail(format!("{committed} attribute(s)"))
        } else {
            FieldCommitResult::failed("specifics", CommitMethod::Dom, format!("unconfirmed: {}", missing.join(", ")))
        };
        report.push(result);
    }
}

/// Retry policy for one-shot clicks outside field chains.
pub(crate) fn click_retry(config: &EngineConfig) -> RetryPolicy {
    RetryPolicy::new(config.retry.max_attempts.min(2), config.retry.step_ms, config.retry.cap_ms)
}
