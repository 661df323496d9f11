//! Variation builder flow.
//!
//! The controller walks the builder one state at a time, re-reading the page
//! before every decision. Each step is bounded by the configured retry policy
//! and poll specs; a failed optional step (continue, grid, identifiers,
//! photos) is recorded and skipped, a failed required step ends the run in
//! `Failed`. The surface lock is held for the whole run, renewed on every
//! transition and always released.

use std::sync::Arc;

use action_flow::{retry_step, FillError};
use action_locator::{ElementLocator, LocateScope, SemanticTarget};
use action_primitives::{
    click, click_when_enabled, commit_value, poll_until_in, recheck_toggle, upload_files, CommitMode,
    DocumentId, DomEvent, DomPort, ElementRef, ExecCtx, FilePayload, PollSpec,
};
use listing_core_types::{now_epoch_ms, LockScope};
use listing_model::{in_stock_skus, TargetAttributeSpec, VariationAxis, VariationSet, VariationSku};
use listing_state_center::FlowLog;
use perceiver_surface::{Detection, Surface, SurfaceDetector};
use serde_json::json;
use surface_lock::{LockLease, LockOwner, SurfaceLock};
use tracing::{debug, info, warn};
use variation_axes::{project_skus, AttributeTarget, AxisResolver, ContaminationFilter, ResolvedAxis};

use crate::config::BuilderConfig;
use crate::errors::BuilderError;
use crate::grid::{is_disallowed_identifier, plan_grid, GridPricing};
use crate::page::{norm, BuilderPage, Chip};
use crate::state::{BuilderReport, BuilderState, GridReport, RejectedValue, Transition};

/// What the builder should end up holding.
#[derive(Debug, Clone)]
pub struct BuilderJob {
    pub variations: VariationSet,
    pub pricing: GridPricing,
    pub photos: Vec<FilePayload>,
}

/// Where a run happens and who runs it.
pub struct BuilderRun<'a> {
    pub port: &'a dyn DomPort,
    pub exec: &'a ExecCtx,
    pub owner: LockOwner,
    pub scope: LockScope,
    pub log: &'a FlowLog,
}

pub struct BuilderController {
    config: BuilderConfig,
    resolver: AxisResolver,
    detector: Arc<SurfaceDetector>,
    locator: Arc<ElementLocator>,
    lock: Arc<SurfaceLock>,
}

impl BuilderController {
    pub fn new(
        config: BuilderConfig,
        resolver: AxisResolver,
        detector: Arc<SurfaceDetector>,
        locator: Arc<ElementLocator>,
        lock: Arc<SurfaceLock>,
    ) -> Self {
        Self {
            config,
            resolver,
            detector,
            locator,
            lock,
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn lock(&self) -> &Arc<SurfaceLock> {
        &self.lock
    }

    /// Runs the builder to `Done` or `Failed`. Never panics on page trouble;
    /// everything that went wrong is in the report.
    pub async fn run(&self, run: &BuilderRun<'_>, job: &BuilderJob) -> BuilderReport {
        let mut report = BuilderReport::default();
        info!(
            action_id = %run.exec.action_id,
            scope = %run.scope,
            axes = job.variations.axes.len(),
            skus = job.variations.skus.len(),
            "builder run started"
        );

        let mut lease = match self.acquire(run).await {
            Ok(lease) => lease,
            Err(err) => {
                self.fail(&mut report, run, err).await;
                return report;
            }
        };

        match self.drive(&mut report, run, job, &mut lease).await {
            Ok(()) => {
                self.enter(&mut report, run, BuilderState::Done, None).await;
                report.success =
                    report.axes_selected >= self.config.required_axes && report.values_entered > 0;
                run.log
                    .append(
                        "builder.done",
                        json!({
                            "success": report.success,
                            "axes": report.axes_selected,
                            "values": report.values_entered,
                            "grid": report.grid,
                            "saved": report.saved,
                        }),
                    )
                    .await;
                info!(success = report.success, saved = report.saved, "builder run finished");
            }
            Err(err) => self.fail(&mut report, run, err).await,
        }

        if let Err(err) = self.lock.release(&lease).await {
            warn!(scope = %run.scope, "builder lock not released: {}", err);
        }
        report
    }

    async fn acquire(&self, run: &BuilderRun<'_>) -> Result<LockLease, BuilderError> {
        let lock = &self.lock;
        let scope = &run.scope;
        let owner = &run.owner;
        let lease = retry_step(run.exec, self.config.retry, "builder.lock", move |_| async move {
            lock.try_acquire(scope, owner)
                .await
                .map_err(|err| FillError::from(BuilderError::Lock(err)))
        })
        .await
        .map_err(|err| BuilderError::step(BuilderState::Idle, err))?;
        run.log
            .append("builder.lock", json!({ "scope": scope.to_string(), "owner": owner }))
            .await;
        Ok(lease)
    }

    async fn enter(&self, report: &mut BuilderReport, run: &BuilderRun<'_>, to: BuilderState, axis: Option<&str>) {
        let from = report.final_state;
        report.transitions.push(Transition {
            from,
            to,
            axis: axis.map(str::to_string),
            at_ms: now_epoch_ms(),
        });
        report.final_state = to;
        debug!(action_id = %run.exec.action_id, %from, %to, axis = axis.unwrap_or(""), "builder transition");
        run.log
            .append("builder.state", json!({ "from": from, "to": to, "axis": axis }))
            .await;
    }

    /// Renews the lease, then records the transition. A store hiccup only
    /// warns; a record naming another owner ends the run.
    async fn advance(
        &self,
        report: &mut BuilderReport,
        run: &BuilderRun<'_>,
        lease: &mut LockLease,
        to: BuilderState,
        axis: Option<&str>,
    ) -> Result<(), BuilderError> {
        match self.lock.renew(lease).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(scope = %lease.scope, state = %to, "builder lock lost");
                return Err(BuilderError::LockLost(lease.scope.to_string()));
            }
            Err(err) => warn!(scope = %lease.scope, "builder lock not renewed: {}", err),
        }
        self.enter(report, run, to, axis).await;
        Ok(())
    }

    async fn fail(&self, report: &mut BuilderReport, run: &BuilderRun<'_>, err: BuilderError) {
        warn!(action_id = %run.exec.action_id, state = %report.final_state, "builder failed: {}", err);
        report.failure = Some(err.to_string());
        report.success = false;
        self.enter(report, run, BuilderState::Failed, None).await;
        run.log
            .append(
                "builder.failed",
                json!({ "error": err.to_string(), "retryable": err.is_retryable() }),
            )
            .await;
    }

    async fn detect(&self, run: &BuilderRun<'_>) -> Result<Detection, BuilderError> {
        let detector = &self.detector;
        let port = run.port;
        let found = poll_until_in(run.exec, self.config.step_poll, move || async move {
            match detector.detect(port).await {
                Ok(detection) if detection.surface == Surface::Plain => None,
                other => Some(other),
            }
        })
        .await;
        match found {
            Some(Ok(detection)) => Ok(detection),
            Some(Err(err)) => Err(BuilderError::NotDetected(err.to_string())),
            None => Err(BuilderError::NotDetected("page shows a plain form".to_string())),
        }
    }

    async fn drive(
        &self,
        report: &mut BuilderReport,
        run: &BuilderRun<'_>,
        job: &BuilderJob,
        lease: &mut LockLease,
    ) -> Result<(), BuilderError> {
        self.advance(report, run, lease, BuilderState::DetectSurface, None).await?;
        let detection = self.detect(run).await?;
        report.detection = Some(detection.clone());
        let doc_name = detection
            .document
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        if detection.via_shell {
            report.needs_delegation = true;
            run.log
                .append("builder.delegate", json!({ "document": doc_name }))
                .await;
            return Err(BuilderError::Unreachable(doc_name));
        }
        let documents = surface_documents(run.port, detection.document.as_ref()).await;
        run.log
            .append(
                "builder.detect",
                json!({
                    "surface": detection.surface,
                    "confidence": detection.confidence,
                    "ambiguous": detection.ambiguous,
                    "document": doc_name,
                }),
            )
            .await;

        let step = Step {
            config: &self.config,
            resolver: &self.resolver,
            locator: &self.locator,
            port: run.port,
            exec: run.exec,
            documents: &documents,
        };

        self.advance(report, run, lease, BuilderState::AlignAttributes, None).await?;
        let aligned = step.align_attributes(&job.variations.axes).await?;
        report.axes = aligned.resolved;
        report.removed_attributes = aligned.removed;
        report.axes_selected = aligned.selected.len();
        run.log
            .append(
                "builder.attributes",
                json!({
                    "selected": aligned.selected.iter().map(|axis| axis.target.name()).collect::<Vec<_>>(),
                    "removed": report.removed_attributes,
                }),
            )
            .await;

        let axes = aligned.selected;
        let filter = ContaminationFilter::for_names(axes.iter().map(|axis| axis.axis.name.as_str()));
        for (idx, axis) in axes.iter().enumerate() {
            let name = axis.target.name();

            self.advance(report, run, lease, BuilderState::SelectAxisChip, Some(name)).await?;
            step.select_axis(name)
                .await
                .map_err(|err| BuilderError::step(BuilderState::SelectAxisChip, err))?;

            let wanted = axis.values();
            self.advance(report, run, lease, BuilderState::ClearPresetValues, Some(name)).await?;
            match step.clear_presets(&wanted).await {
                Ok(0) => {}
                Ok(cleared) => debug!(axis = name, cleared, "preset values cleared"),
                Err(err) => warn!(axis = name, "preset values not cleared: {}", err),
            }

            self.advance(report, run, lease, BuilderState::EnterValues, Some(name)).await?;
            let (kept, rejected) = filter.partition(idx, &wanted);
            for value in rejected {
                if let Some(claimed_by) = filter.foreign_shape(idx, &value) {
                    info!(axis = name, value = %value, ?claimed_by, "value rejected: belongs to another axis");
                    report.rejected_values.push(RejectedValue {
                        axis: name.to_string(),
                        value,
                        claimed_by,
                    });
                }
            }
            let entered = step.enter_values(&kept).await;
            report.values_entered += entered;
            run.log
                .append(
                    "builder.values",
                    json!({ "axis": name, "wanted": kept.len(), "entered": entered }),
                )
                .await;
        }
        if report.values_entered == 0 {
            return Err(BuilderError::step(
                BuilderState::EnterValues,
                FillError::CommitUnverified("no variation value was entered".to_string()),
            ));
        }

        self.advance(report, run, lease, BuilderState::Continue, None).await?;
        let grid_ready = match step.continue_to_grid().await {
            Ok(()) => true,
            Err(err) => {
                warn!("pricing grid not reached: {}", err);
                false
            }
        };

        if grid_ready {
            self.advance(report, run, lease, BuilderState::FillPriceGrid, None).await?;
            let skus = project_skus(&in_stock_skus(&job.variations.skus), &axes);
            if let Err(err) = step.fill_grid(&skus, &job.pricing, &mut report.grid).await {
                warn!("pricing grid not filled: {}", err);
            }

            self.advance(report, run, lease, BuilderState::ClearDisallowedIdentifierFields, None).await?;
            match step.clear_identifiers().await {
                Ok(cleared) => report.grid.identifiers_cleared = cleared,
                Err(err) => warn!("identifier cells not checked: {}", err),
            }
            run.log.append("builder.grid", json!(report.grid)).await;
        }

        self.advance(report, run, lease, BuilderState::UploadPhotos, None).await?;
        if !job.photos.is_empty() {
            match step.upload_photos(&job.photos).await {
                Ok(uploaded) => report.photos_uploaded = uploaded,
                Err(err) => warn!("builder photos not uploaded: {}", err),
            }
        }

        self.advance(report, run, lease, BuilderState::SaveAndClose, None).await?;
        report.saved = step
            .save_and_close()
            .await
            .map_err(|err| BuilderError::step(BuilderState::SaveAndClose, err))?;
        run.log
            .append("builder.save", json!({ "closed": report.saved }))
            .await;
        Ok(())
    }
}

/// The detected document plus readable documents nested inside it.
async fn surface_documents(port: &dyn DomPort, root: Option<&DocumentId>) -> Vec<DocumentId> {
    let Some(root) = root else { return Vec::new() };
    let mut out = vec![root.clone()];
    let Ok(docs) = port.documents().await else { return out };
    loop {
        let before = out.len();
        for doc in &docs {
            let hosted = doc
                .host_element
                .as_ref()
                .is_some_and(|host| out.contains(&host.document));
            if hosted && doc.origin.is_readable() && !out.contains(&doc.id) {
                out.push(doc.id.clone());
            }
        }
        if out.len() == before {
            return out;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Area {
    Attributes,
    Values,
    Tabs,
}

struct Aligned {
    resolved: Vec<ResolvedAxis>,
    selected: Vec<ResolvedAxis>,
    removed: Vec<String>,
}

/// Page operations for one run, scoped to the builder's documents.
#[derive(Clone, Copy)]
struct Step<'a> {
    config: &'a BuilderConfig,
    resolver: &'a AxisResolver,
    locator: &'a ElementLocator,
    port: &'a dyn DomPort,
    exec: &'a ExecCtx,
    documents: &'a [DocumentId],
}

impl<'a> Step<'a> {
    async fn page(&self) -> Result<BuilderPage, FillError> {
        Ok(BuilderPage::read(self.port, self.documents).await?)
    }

    fn scope(&self) -> LocateScope {
        LocateScope {
            documents: self.documents.to_vec(),
            ..LocateScope::default()
        }
    }

    fn chips(&self, page: &BuilderPage, area: Area) -> Vec<Chip> {
        let labels = &self.config.labels;
        match area {
            Area::Attributes => page.chips(page.section(&labels.attributes_section).as_ref()),
            Area::Values => page.chips(page.values_panel(&labels.values_section).as_ref()),
            Area::Tabs => page.tabs(),
        }
    }

    fn area_root(&self, page: &BuilderPage, area: Area) -> Option<ElementRef> {
        let labels = &self.config.labels;
        match area {
            Area::Attributes => page.section(&labels.attributes_section),
            Area::Values => page.values_panel(&labels.values_section),
            Area::Tabs => None,
        }
    }

    /// Re-reads the page until `probe` finds something.
    async fn wait_for<T, F>(&self, probe: F) -> Option<T>
    where
        F: Fn(&BuilderPage) -> Option<T>,
    {
        let this = *self;
        let probe = &probe;
        poll_until_in(self.exec, self.config.step_poll, move || async move {
            let page = this.page().await.ok()?;
            probe(&page)
        })
        .await
    }

    async fn wait_chip(&self, area: Area, label: &str, selected: bool) -> bool {
        let this = *self;
        self.wait_for(move |page| {
            this.chips(page, area)
                .into_iter()
                .find(|chip| chip.is(label) && chip.selected == selected)
                .map(|_| ())
        })
        .await
        .is_some()
    }

    async fn wait_enabled(&self, el: &ElementRef, poll: PollSpec) -> bool {
        let port = self.port;
        poll_until_in(self.exec, poll, move || async move {
            match port.element(el).await {
                Ok(info) if info.is_actionable() => Some(()),
                _ => None,
            }
        })
        .await
        .is_some()
    }

    async fn click_chip(&self, chip: &Chip, area: Area, selected: bool) -> Result<(), FillError> {
        if chip.selected == selected {
            return Ok(());
        }
        click(self.port, self.exec, &chip.element).await?;
        if self.wait_chip(area, &chip.label, selected).await {
            Ok(())
        } else {
            Err(FillError::CommitUnverified(format!(
                "{} did not become {}",
                chip.label,
                if selected { "selected" } else { "unselected" }
            )))
        }
    }

    async fn set_chip(&self, area: Area, label: &str, selected: bool) -> Result<(), FillError> {
        let this = *self;
        retry_step(self.exec, self.config.retry, "builder.chip", move |_| async move {
            let page = this.page().await?;
            let chip = this
                .chips(&page, area)
                .into_iter()
                .find(|chip| chip.is(label))
                .ok_or_else(|| FillError::NotFound(format!("chip '{label}'")))?;
            this.click_chip(&chip, area, selected).await
        })
        .await
    }

    /// Commits `value` into the area's entry field and confirms it with Add
    /// (or Enter when the area has no Add control).
    async fn type_and_add(&self, input: &ElementRef, value: &str, area: Area) -> Result<(), FillError> {
        let outcome = commit_value(self.port, self.exec, input, value, CommitMode::Plain, &self.config.tempo).await;
        if !outcome.committed {
            return Err(FillError::CommitUnverified(
                outcome
                    .failure_detail()
                    .unwrap_or_else(|| format!("'{value}' not accepted")),
            ));
        }
        let page = self.page().await?;
        let root = self.area_root(&page, area);
        let add = page
            .button(root.as_ref(), &self.config.labels.add)
            .map(|info| info.element.clone());
        match add {
            Some(add) => click(self.port, self.exec, &add).await?,
            None => self.port.dispatch(input, DomEvent::KeyDown("Enter".to_string())).await?,
        }
        if self.wait_chip(area, value, true).await {
            Ok(())
        } else {
            Err(FillError::CommitUnverified(format!("'{value}' did not appear as a selected chip")))
        }
    }

    async fn create_attribute(&self, name: &str) -> Result<(), FillError> {
        let this = *self;
        retry_step(self.exec, self.config.retry, "builder.create_attribute", move |_| async move {
            let labels = &this.config.labels;
            let page = this.page().await?;
            let existing = this
                .chips(&page, Area::Attributes)
                .into_iter()
                .find(|chip| chip.is(name));
            if let Some(chip) = existing {
                return this.click_chip(&chip, Area::Attributes, true).await;
            }
            let section = page.section(&labels.attributes_section);
            let create = page
                .button(section.as_ref(), &labels.create_attribute)
                .map(|info| info.element.clone())
                .ok_or_else(|| FillError::NotFound("create attribute control".to_string()))?;
            click(this.port, this.exec, &create).await?;
            let input = this
                .wait_for(|page| {
                    let section = page.section(&labels.attributes_section);
                    page.text_entry(section.as_ref()).map(|info| info.element.clone())
                })
                .await
                .ok_or_else(|| FillError::NotFound("attribute name field".to_string()))?;
            this.type_and_add(&input, name, Area::Attributes).await
        })
        .await
    }

    async fn align_attributes(&self, axes: &[VariationAxis]) -> Result<Aligned, BuilderError> {
        let state = BuilderState::AlignAttributes;
        let page = self.page().await.map_err(|err| BuilderError::step(state, err))?;
        let chips = self.chips(&page, Area::Attributes);
        let available: Vec<TargetAttributeSpec> = chips
            .iter()
            .map(|chip| TargetAttributeSpec::named(chip.label.clone()))
            .collect();
        let resolved = self.resolver.resolve(axes, &available);
        if resolved.is_empty() {
            return Err(BuilderError::NoAxes);
        }

        // Leftovers go first so they cannot hold a slot the draft's axes need.
        let aliases = self.resolver.aliases();
        let wanted = |label: &str| resolved.iter().any(|axis| norm(axis.target.name()) == norm(label));
        let mut stale: Vec<&Chip> = chips
            .iter()
            .filter(|chip| chip.selected && (aliases.is_denied(&chip.label) || !wanted(&chip.label)))
            .collect();
        stale.sort_by_key(|chip| !aliases.is_denied(&chip.label));
        let mut removed = Vec::new();
        for chip in stale {
            match self.set_chip(Area::Attributes, &chip.label, false).await {
                Ok(()) => {
                    info!(attribute = %chip.label, "preselected attribute removed");
                    removed.push(chip.label.clone());
                }
                Err(err) => warn!(attribute = %chip.label, "preselected attribute kept: {}", err),
            }
        }

        let mut selected = Vec::new();
        for axis in &resolved {
            let name = axis.target.name();
            let outcome = match &axis.target {
                AttributeTarget::Existing { .. } => self.set_chip(Area::Attributes, name, true).await,
                AttributeTarget::Custom { .. } => self.create_attribute(name).await,
            };
            match outcome {
                Ok(()) => selected.push(axis.clone()),
                Err(err) => warn!(attribute = name, custom = axis.target.is_custom(), "attribute not added: {}", err),
            }
        }

        let page = self.page().await.map_err(|err| BuilderError::step(state, err))?;
        let chips = self.chips(&page, Area::Attributes);
        selected.retain(|axis| {
            chips
                .iter()
                .any(|chip| chip.is(axis.target.name()) && chip.selected)
        });
        if selected.is_empty() {
            return Err(BuilderError::step(
                state,
                FillError::CommitUnverified("no attribute ended up selected".to_string()),
            ));
        }
        Ok(Aligned {
            resolved,
            selected,
            removed,
        })
    }

    /// Opens the axis's values tab. Builders without tabs show one panel.
    async fn select_axis(&self, name: &str) -> Result<(), FillError> {
        if self.page().await?.tabs().is_empty() {
            debug!(axis = name, "no axis tabs; using the single values panel");
            return Ok(());
        }
        self.set_chip(Area::Tabs, name, true).await
    }

    async fn clear_presets(&self, wanted: &[String]) -> Result<usize, FillError> {
        let page = self.page().await?;
        let presets: Vec<String> = self
            .chips(&page, Area::Values)
            .into_iter()
            .filter(|chip| chip.selected && !wanted.iter().any(|value| chip.is(value)))
            .map(|chip| chip.label)
            .collect();
        for label in &presets {
            self.set_chip(Area::Values, label, false).await?;
        }
        Ok(presets.len())
    }

    async fn enter_value(&self, value: &str) -> Result<(), FillError> {
        let this = *self;
        retry_step(self.exec, self.config.retry, "builder.value", move |_| async move {
            let page = this.page().await?;
            let existing = this
                .chips(&page, Area::Values)
                .into_iter()
                .find(|chip| chip.is(value));
            if let Some(chip) = existing {
                return this.click_chip(&chip, Area::Values, true).await;
            }
            let panel = this.area_root(&page, Area::Values);
            let input = page
                .text_entry(panel.as_ref())
                .map(|info| info.element.clone())
                .ok_or_else(|| FillError::NotFound("value entry field".to_string()))?;
            this.type_and_add(&input, value, Area::Values).await
        })
        .await
    }

    async fn enter_values(&self, values: &[String]) -> usize {
        let mut entered = 0;
        for value in values {
            match self.enter_value(value).await {
                Ok(()) => entered += 1,
                Err(err) => warn!(value = %value, "value not entered: {}", err),
            }
        }
        entered
    }

    async fn continue_to_grid(&self) -> Result<(), FillError> {
        let labels = &self.config.labels;
        if self.page().await?.grid(labels).is_some() {
            return Ok(());
        }
        let target = SemanticTarget::button(labels.continue_labels.iter().cloned());
        let found = self
            .locator
            .locate_with_retry(self.port, self.exec, &target, &self.scope(), self.config.step_poll)
            .await?;
        click_when_enabled(self.port, self.exec, &found.element, self.config.step_poll).await?;
        self.wait_for(|page| page.grid(labels).map(|_| ()))
            .await
            .ok_or_else(|| FillError::Timeout("pricing grid did not render".to_string()))
    }

    async fn commit(&self, el: &ElementRef, value: &str) -> bool {
        let this = *self;
        retry_step(self.exec, self.config.retry, "builder.grid_cell", move |_| async move {
            let outcome = commit_value(this.port, this.exec, el, value, CommitMode::Plain, &this.config.tempo).await;
            if outcome.committed {
                Ok(())
            } else {
                Err(FillError::CommitUnverified(
                    outcome
                        .failure_detail()
                        .unwrap_or_else(|| format!("{el} reads {:?}", outcome.observed)),
                ))
            }
        })
        .await
        .is_ok()
    }

    async fn fill_grid(&self, skus: &[VariationSku], pricing: &GridPricing, report: &mut GridReport) -> Result<(), FillError> {
        let page = self.page().await?;
        let grid = page
            .grid(&self.config.labels)
            .ok_or_else(|| FillError::NotFound("pricing grid".to_string()))?;
        report.reached = true;
        report.rows = grid.rows.len();

        let plan = plan_grid(&grid.row_texts(), skus, pricing);
        for assignment in &plan {
            report.count(assignment.matched_by);
            let Some(price) = grid.input_at(assignment.row, grid.price_column) else {
                warn!(row = assignment.row, "grid row has no price field");
                continue;
            };
            let priced = self.commit(price, &assignment.price_text()).await;
            let stocked = match grid.input_at(assignment.row, grid.quantity_column) {
                Some(quantity) => self.commit(quantity, &assignment.quantity.to_string()).await,
                None => true,
            };
            debug!(
                row = assignment.row,
                matched_by = ?assignment.matched_by,
                price = %assignment.price_text(),
                quantity = assignment.quantity,
                priced,
                stocked,
                "grid row"
            );
            if priced && stocked {
                report.filled_rows += 1;
            }
        }
        info!(rows = report.rows, filled = report.filled_rows, fallback = report.fallback, "pricing grid filled");
        Ok(())
    }

    async fn clear_identifiers(&self) -> Result<usize, FillError> {
        let page = self.page().await?;
        let Some(grid) = page.grid(&self.config.labels) else {
            return Ok(0);
        };
        let mut cleared = 0;
        for row in &grid.rows {
            for column in &grid.identifier_columns {
                let Some(cell) = row.cells.get(*column) else { continue };
                let (Some(input), Some(value)) = (&cell.input, &cell.value) else { continue };
                if is_disallowed_identifier(value) && self.commit(input, "").await {
                    debug!(header = grid.headers.get(*column).map(String::as_str).unwrap_or(""), %value, "identifier cell cleared");
                    cleared += 1;
                }
            }
        }
        Ok(cleared)
    }

    async fn upload_photos(&self, photos: &[FilePayload]) -> Result<usize, FillError> {
        let page = self.page().await?;
        let input = page
            .file_input(None)
            .map(|info| info.element.clone())
            .ok_or_else(|| FillError::NotFound("builder photo field".to_string()))?;
        Ok(upload_files(self.port, self.exec, &input, photos).await?)
    }

    /// Clicks Save once it is enabled; returns whether the builder closed.
    async fn save_and_close(&self) -> Result<bool, FillError> {
        let page = self.page().await?;
        let save = page
            .button(None, &self.config.labels.save)
            .map(|info| info.element.clone())
            .ok_or_else(|| FillError::NotFound("save control".to_string()))?;

        if !self.wait_enabled(&save, self.config.save_poll).await {
            let toggles = page.checked_toggles(None);
            info!(toggles = toggles.len(), "save still disabled; re-checking toggles");
            for toggle in &toggles {
                recheck_toggle(self.port, self.exec, toggle, self.config.toggle_settle_ms).await?;
                if self.wait_enabled(&save, PollSpec::once()).await {
                    break;
                }
            }
            if !self.wait_enabled(&save, self.config.save_poll).await {
                return Err(FillError::CommitUnverified("save control stayed disabled".to_string()));
            }
        }

        click(self.port, self.exec, &save).await?;
        let port = self.port;
        let save = &save;
        let closed = poll_until_in(self.exec, self.config.step_poll, move || async move {
            match port.element(save).await {
                Ok(info) if info.visible => None,
                _ => Some(()),
            }
        })
        .await
        .is_some();
        if !closed {
            warn!("save clicked but the builder stayed open");
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::snapshot::{HookTrigger, NodeSnapshot, SnapshotDocument};
    use listing_core_types::{ContextId, ContextKind, ContextRoute, DraftId};
    use listing_model::{PricingRule, VariationSku};
    use listing_state_center::InMemoryKvStore;
    use perceiver_surface::DetectorConfig;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use surface_lock::{LockConfig, LockRecord, OwnerReach};

    fn chip(id: &str, label: &str, pressed: bool) -> NodeSnapshot {
        NodeSnapshot::new("button")
            .id(id)
            .attr("aria-pressed", if pressed { "true" } else { "false" })
            .text(label)
    }

    fn tab(axis: &str) -> NodeSnapshot {
        NodeSnapshot::new("button")
            .id(format!("tab-{axis}"))
            .attr("role", "tab")
            .attr("aria-selected", "false")
            .text(axis)
            .hidden()
    }

    fn panel(axis: &str, chips: Vec<NodeSnapshot>) -> NodeSnapshot {
        NodeSnapshot::new("div")
            .id(format!("panel-{axis}"))
            .attr("role", "tabpanel")
            .attr("aria-label", axis)
            .hidden()
            .children(chips)
            .child(
                NodeSnapshot::new("input")
                    .id(format!("entry-{axis}"))
                    .attr("placeholder", "Add your own"),
            )
            .child(NodeSnapshot::new("button").id(format!("add-{axis}")).text("Add"))
    }

    fn grid_row(size: &str, color: &str, upc: &str) -> NodeSnapshot {
        NodeSnapshot::new("tr").children([
            NodeSnapshot::new("td").text(size),
            NodeSnapshot::new("td").text(color),
            NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("aria-label", "UPC").value(upc)),
            NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("aria-label", "Price")),
            NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("aria-label", "Quantity")),
        ])
    }

    fn builder_page() -> SnapshotDocument {
        let doc = SnapshotDocument::single(
            "https://shop.test/lstng/msku",
            NodeSnapshot::new("body").child(
                NodeSnapshot::new("div").id("builder").attr("role", "dialog").children([
                    NodeSnapshot::new("h2").text("Create variations"),
                    NodeSnapshot::new("section").id("attributes").children([
                        NodeSnapshot::new("h3").text("Attributes"),
                        chip("chip-color", "Color", false),
                        chip("chip-size", "Size", false),
                        chip("chip-type", "Type", true),
                        NodeSnapshot::new("button").id("create-attr").text("Create your own"),
                    ]),
                    NodeSnapshot::new("h4").text("Options"),
                    NodeSnapshot::new("div")
                        .attr("role", "tablist")
                        .children([tab("Color"), tab("Size")]),
                    panel(
                        "Color",
                        vec![chip("v-red", "Red", false), chip("v-black", "Black", true)],
                    ),
                    panel("Size", vec![chip("v-s", "S", false), chip("v-m", "M", false)]),
                    NodeSnapshot::new("button").id("continue").text("Continue"),
                    NodeSnapshot::new("table").id("grid").hidden().children([
                        NodeSnapshot::new("tr").children(
                            ["Size", "Color", "UPC", "Price", "Quantity"].map(|h| NodeSnapshot::new("th").text(h)),
                        ),
                        grid_row("S", "Red", "3"),
                        grid_row("S", "Blue", "Does not apply"),
                        grid_row("M", "Red", "012345678905"),
                    ]),
                    NodeSnapshot::new("label").text("Apply to all listings").child(
                        NodeSnapshot::new("input")
                            .id("agree")
                            .attr("type", "checkbox")
                            .checked(true),
                    ),
                    NodeSnapshot::new("button")
                        .id("save")
                        .attr("disabled", "")
                        .text("Save and close"),
                ]),
            ),
        );

        doc.on("*", HookTrigger::Click, |state, el| {
            if let Some(pressed) = state.attr(el, "aria-pressed") {
                state.set_attr(el, "aria-pressed", if pressed == "true" { "false" } else { "true" });
            }
        });
        for axis in ["Color", "Size"] {
            let lower = axis.to_lowercase();
            doc.on(format!("chip-{lower}"), HookTrigger::Click, move |state, el| {
                let shown = state.attr(el, "aria-pressed").as_deref() == Some("true");
                if let Some(tab) = state.find(&format!("tab-{axis}")) {
                    state.set_hidden(&tab, !shown);
                }
            });
            doc.on(format!("tab-{axis}"), HookTrigger::Click, move |state, _| {
                for other in ["Color", "Size"] {
                    if let Some(tab) = state.find(&format!("tab-{other}")) {
                        state.set_attr(&tab, "aria-selected", if other == axis { "true" } else { "false" });
                    }
                    if let Some(panel) = state.find(&format!("panel-{other}")) {
                        state.set_hidden(&panel, other != axis);
                    }
                }
            });
            doc.on(format!("add-{axis}"), HookTrigger::Click, move |state, _| {
                let (Some(entry), Some(panel)) = (
                    state.find(&format!("entry-{axis}")),
                    state.find(&format!("panel-{axis}")),
                ) else {
                    return;
                };
                let value = state.model_value(&entry).unwrap_or_default();
                if value.is_empty() {
                    return;
                }
                state.append_child(
                    &panel,
                    NodeSnapshot::new("button").attr("aria-pressed", "true").text(value),
                );
                state.set_rendered_value(&entry, "");
            });
        }
        doc.on("continue", HookTrigger::Click, |state, _| {
            if let Some(grid) = state.find("grid") {
                state.set_hidden(&grid, false);
            }
        });
        doc.on("agree", HookTrigger::Change, |state, el| {
            let checked = state.is_checked(el).unwrap_or(false);
            if let Some(save) = state.find("save") {
                state.set_disabled(&save, !checked);
            }
        });
        doc.on("save", HookTrigger::Click, |state, _| {
            if let Some(builder) = state.find("builder") {
                state.set_hidden(&builder, true);
            }
        });
        doc
    }

    fn sku(size: &str, color: &str, price: f64, stock: u32) -> VariationSku {
        VariationSku {
            specifics: BTreeMap::from([
                ("Size".to_string(), size.to_string()),
                ("Colour".to_string(), color.to_string()),
                ("Scent".to_string(), "Rose".to_string()),
            ]),
            stock: Some(i64::from(stock)),
            price: Some(price),
            cost: None,
            sku: None,
        }
    }

    fn job() -> BuilderJob {
        BuilderJob {
            variations: VariationSet {
                has_variations: true,
                axes: vec![
                    VariationAxis::new("Colour", &["Red", "Blue", "XL"]),
                    VariationAxis::new("Size", &["S", "M"]),
                    VariationAxis::new("Scent", &["Rose", "Lavender"]),
                ],
                skus: vec![
                    sku("S", "Red", 10.0, 4),
                    sku("S", "Blue", 12.0, 2),
                    sku("M", "Red", 15.0, 1),
                    sku("M", "Blue", 18.0, 0),
                ],
            },
            pricing: GridPricing {
                rule: PricingRule::default(),
                fallback_price: 9.99,
                default_quantity: 1,
            },
            photos: Vec::new(),
        }
    }

    struct Harness {
        controller: BuilderController,
        exec: ExecCtx,
        log: FlowLog,
        scope: LockScope,
        store: Arc<InMemoryKvStore>,
        owner: LockOwner,
    }

    impl Harness {
        fn new() -> Self {
            let store = InMemoryKvStore::new();
            let scope = LockScope::for_draft(&DraftId("d-1".to_string()));
            let lock = SurfaceLock::new(store.clone(), LockConfig::default());
            let controller = BuilderController::new(
                BuilderConfig::immediate(),
                AxisResolver::default(),
                Arc::new(SurfaceDetector::new(DetectorConfig::default()).unwrap()),
                Arc::new(ElementLocator::default()),
                Arc::new(lock),
            );
            Self {
                controller,
                exec: ExecCtx::with_budget(ContextRoute::top("https://shop.test/lstng/msku"), Duration::from_secs(10)),
                log: FlowLog::new(store.clone(), scope.clone(), 200),
                scope,
                store,
                owner: LockOwner::new(ContextId::new(), ContextKind::TopDocument, OwnerReach::Direct),
            }
        }

        fn lock_key(&self) -> String {
            self.scope.key(&LockConfig::default().key)
        }


        async fn run(&self, port: &dyn DomPort, job: &BuilderJob) -> BuilderReport {
            let run = BuilderRun {
                port,
                exec: &self.exec,
                owner: self.owner.clone(),
                scope: self.scope.clone(),
                log: &self.log,
            };
            self.controller.run(&run, job).await
        }
    }

    fn stored_lock(store: &InMemoryKvStore, key: &str) -> Option<LockRecord> {
        store
            .peek(key)
            .and_then(|stored| serde_json::from_value(stored.value).ok())
    }

    fn price_of(doc: &SnapshotDocument, row: usize) -> Option<String> {
        doc.with_state(|state| {
            let inputs = state.find_by_attr("aria-label", Some("Price"));
            inputs.get(row).and_then(|input| state.model_value(input))
        })
    }

    #[tokio::test]
    async fn walks_the_builder_to_done() {
        let doc = builder_page();
        let harness = Harness::new();
        let report = harness.run(&doc, &job()).await;

        assert_eq!(report.final_state, BuilderState::Done, "failure: {:?}", report.failure);
        assert!(report.success);
        assert!(report.saved);
        assert_eq!(report.axes.len(), 2);
        assert_eq!(report.axes_selected, 2);
        assert_eq!(report.removed_attributes, vec!["Type".to_string()]);
        assert_eq!(report.values_entered, 4);
        assert_eq!(report.rejected_values.len(), 1);
        assert_eq!(report.rejected_values[0].value, "XL");

        assert_eq!(report.grid.rows, 3);
        assert_eq!(report.grid.exact, 3);
        assert_eq!(report.grid.filled_rows, 3);
        assert_eq!(report.grid.identifiers_cleared, 1);
        assert_eq!(price_of(&doc, 0).as_deref(), Some("10.00"));
        assert_eq!(price_of(&doc, 1).as_deref(), Some("12.00"));
        assert_eq!(price_of(&doc, 2).as_deref(), Some("15.00"));

        let path = report.path();
        assert_eq!(path.first(), Some(&BuilderState::Idle));
        assert!(path.contains(&BuilderState::ClearDisallowedIdentifierFields));
        assert_eq!(path.last(), Some(&BuilderState::Done));
    }

    #[tokio::test]
    async fn preset_values_are_cleared_and_typed_values_added() {
        let doc = builder_page();
        let report = Harness::new().run(&doc, &job()).await;
        assert!(report.success);
        doc.with_state(|state| {
            let black = state.find("v-black").unwrap();
            assert_eq!(state.attr(&black, "aria-pressed").as_deref(), Some("false"));
            let type_chip = state.find("chip-type").unwrap();
            assert_eq!(state.attr(&type_chip, "aria-pressed").as_deref(), Some("false"));
            let blue = state
                .find_by_attr("aria-pressed", Some("true"))
                .into_iter()
                .any(|el| state.own_text(&el).as_deref() == Some("Blue"));
            assert!(blue);
        });
    }

    #[tokio::test]
    async fn only_two_axes_reach_the_builder() {
        let doc = builder_page();
        let report = Harness::new().run(&doc, &job()).await;
        let names: Vec<&str> = report.axes.iter().map(|axis| axis.target.name()).collect();
        assert_eq!(names, vec!["Color", "Size"]);
        let created = doc
            .journal()
            .iter()
            .any(|entry| doc.with_state(|state| state.attr(&entry.element, "id")).as_deref() == Some("create-attr"));
        assert!(!created);
    }

    #[tokio::test]
    async fn lock_is_released_after_the_run() {
        let doc = builder_page();
        let harness = Harness::new();
        harness.run(&doc, &job()).await;
        assert!(harness.controller.lock().read(&harness.scope).await.unwrap().is_none());
        let steps: Vec<String> = harness.log.local_entries().into_iter().map(|entry| entry.step).collect();
        assert!(steps.contains(&"builder.lock".to_string()));
        assert!(steps.contains(&"builder.done".to_string()));
    }

    #[tokio::test]
    async fn plain_form_fails_detection() {
        let doc = SnapshotDocument::single(
            "https://shop.test/sell",
            NodeSnapshot::new("body").child(NodeSnapshot::new("input").attr("name", "title")),
        );
        let report = Harness::new().run(&doc, &job()).await;
        assert_eq!(report.final_state, BuilderState::Failed);
        assert!(!report.success);
        assert!(report.failure.as_deref().unwrap().contains("not found"));
        assert_eq!(report.path(), vec![BuilderState::Idle, BuilderState::DetectSurface, BuilderState::Failed]);
    }

    #[tokio::test]
    async fn contended_lock_fails_without_touching_the_page() {
        let doc = builder_page();
        let harness = Harness::new();
        let other = LockOwner::new(ContextId::new(), ContextKind::TopDocument, OwnerReach::Direct);
        let _held = harness.controller.lock().try_acquire(&harness.scope, &other).await.unwrap();
        let report = harness.run(&doc, &job()).await;
        assert_eq!(report.final_state, BuilderState::Failed);
        assert!(report.transitions.iter().all(|t| t.to != BuilderState::DetectSurface));
        assert!(doc.journal().is_empty());
    }

    #[tokio::test]
    async fn lease_is_renewed_through_a_long_run() {
        let doc = builder_page();
        let harness = Harness::new();
        let aged_at = now_epoch_ms() - 10 * 60_000;
        let seen_at_save = Arc::new(std::sync::Mutex::new(None::<LockRecord>));

        // Age the record as if the value steps had taken ten minutes.
        let (store, key) = (harness.store.clone(), harness.lock_key());
        doc.on("continue", HookTrigger::Click, move |_, _| {
            if let Some(record) = stored_lock(&store, &key) {
                let aged = LockRecord {
                    acquired_at_epoch_ms: aged_at,
                    ..record
                };
                store.insert_at(&key, serde_json::to_value(&aged).unwrap(), aged_at);
            }
        });
        let (store, key) = (harness.store.clone(), harness.lock_key());
        let seen = seen_at_save.clone();
        doc.on("save", HookTrigger::Click, move |_, _| {
            *seen.lock().unwrap() = stored_lock(&store, &key);
        });

        let report = harness.run(&doc, &job()).await;
        assert_eq!(report.final_state, BuilderState::Done, "failure: {:?}", report.failure);
        let at_save = seen_at_save.lock().unwrap().clone().expect("lock held while saving");
        assert_eq!(at_save.owner, harness.owner);
        assert!(at_save.acquired_at_epoch_ms > aged_at + 5 * 60_000);
        assert!(stored_lock(&harness.store, &harness.lock_key()).is_none());
    }

    #[tokio::test]
    async fn takeover_mid_run_stops_the_builder() {
        let doc = builder_page();
        let harness = Harness::new();
        let intruder = LockOwner::new(ContextId("intruder".to_string()), ContextKind::SubDocument, OwnerReach::Direct);

        let (store, key, scope) = (harness.store.clone(), harness.lock_key(), harness.scope.clone());
        let thief = intruder.clone();
        doc.on("continue", HookTrigger::Click, move |_, _| {
            let record = LockRecord {
                scope: scope.clone(),
                acquired_at_epoch_ms: now_epoch_ms(),
                owner: thief.clone(),
            };
            store.insert_at(&key, serde_json::to_value(&record).unwrap(), record.acquired_at_epoch_ms);
        });

        let report = harness.run(&doc, &job()).await;
        assert_eq!(report.final_state, BuilderState::Failed);
        assert!(report.failure.as_deref().unwrap().contains("taken over"));
        let path = report.path();
        assert!(path.contains(&BuilderState::Continue));
        assert!(!path.contains(&BuilderState::FillPriceGrid));
        assert!(!report.saved);
        let left = stored_lock(&harness.store, &harness.lock_key()).map(|record| record.owner);
        assert_eq!(left, Some(intruder));
    }
}
