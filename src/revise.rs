//! Revising a live listing
//!
//! Quantity, price, end, list-similar and toggle edits reuse the locator,
//! the value committer, the fallback chain and the remote writer. Edits that
//! leave a pending form behind are saved through the page's Save control.

use std::fmt;

use action_flow::{AttemptRecord, Committed, FallbackChain, FieldStrategy, FillError, FormSurface, LocateAndCommit};
use action_locator::{ControlKind, LocateScope, LocatorError, SemanticTarget, TargetSpec};
use action_primitives::{
    click_when_enabled, ensure_checked, poll_until_in, recheck_toggle, settle, DomPort, ElementRef, ExecCtx, PollSpec,
};
use async_trait::async_trait;
use draft_remote::RemoteField;
use listing_core_types::{ContextRoute, DraftId, LockScope};
use listing_model::{format_price, CommitMethod, FieldCommitResult};
use listing_state_center::{FlowLog, FlowLogEntry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use variation_builder::BuilderPage;

use crate::engine::{ClickTarget, Engine, FillSurface};
use crate::errors::{EngineError, Result};

/// One edit on an existing listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum ReviseAction {
    Quantity(u32),
    Price(f64),
    End,
    ListSimilar,
    /// Sets the toggle labelled `label` to `on`.
    Toggle { label: String, on: bool },
}

impl ReviseAction {
    pub fn name(&self) -> &'static str {
        match self {
            ReviseAction::Quantity(_) => "quantity",
            ReviseAction::Price(_) => "price",
            ReviseAction::End => "end",
            ReviseAction::ListSimilar => "list_similar",
            ReviseAction::Toggle { .. } => "toggle",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            ReviseAction::Price(price) if !price.is_finite() || *price <= 0.0 => {
                Err(EngineError::invalid(format!("price {price} out of range")))
            }
            ReviseAction::Toggle { label, .. } if label.trim().is_empty() => {
                Err(EngineError::invalid("toggle label is empty"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ReviseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviseAction::Quantity(quantity) => write!(f, "quantity={quantity}"),
            ReviseAction::Price(price) => write!(f, "price={}", format_price(*price)),
            ReviseAction::Toggle { label, on } => write!(f, "toggle {label:?}={on}"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviseReport {
    pub action: ReviseAction,
    pub result: FieldCommitResult,
    /// The edit reached the listing: saved on the page, or written remotely.
    pub saved: bool,
    pub attempts: Vec<AttemptRecord>,
    pub log: Vec<FlowLogEntry>,
}

impl Engine {
    /// Applies `action` to the listing shown on `port`.
    pub async fn revise_listing(
        &self,
        port: &dyn DomPort,
        route: ContextRoute,
        draft_id: Option<&DraftId>,
        action: &ReviseAction,
    ) -> Result<ReviseReport> {
        action.validate()?;
        let exec = ExecCtx::with_budget(route.clone(), self.config().run_budget());
        let scope = LockScope::resolve(draft_id, &route);
        let log = FlowLog::new(self.store().clone(), scope.clone(), self.config().log_capacity);
        let surface = self.surface(port, &exec, draft_id);
        let labels = &self.config().labels;
        let retry = self.config().retry;
        let enable_poll = self.config().locate_poll;

        info!(action_id = %exec.action_id, scope = %scope, action = %action, "revise started");
        log.append("revise.start", json!({ "action": action, "url": route.url })).await;

        let chain = match action {
            ReviseAction::Quantity(quantity) => self.field_chain(
                "quantity",
                &surface,
                LocateAndCommit::new(SemanticTarget::QuantityInput, quantity.to_string()),
                RemoteField::Quantity(*quantity),
            ),
            ReviseAction::Price(price) => self.field_chain(
                "price",
                &surface,
                LocateAndCommit::new(SemanticTarget::PriceInput, format_price(*price)),
                RemoteField::Price(*price),
            ),
            ReviseAction::End => self.field_chain(
                "end",
                &surface,
                EndListing {
                    end: labels.end_listing.clone(),
                    confirm: labels.confirm_end.clone(),
                    confirm_poll: self.reaction_poll(),
                },
                RemoteField::Ended(true),
            ),
            ReviseAction::ListSimilar => FallbackChain::new("list_similar").then_with_retry(
                OpenSimilar {
                    open: ClickTarget::new(SemanticTarget::button(labels.list_similar.clone()), enable_poll),
                    form_poll: self.config().locate_poll,
                },
                retry,
            ),
            ReviseAction::Toggle { label, on } => FallbackChain::new("toggle").then_with_retry(
                SetToggle {
                    label: label.clone(),
                    on: *on,
                    save: labels.save_changes.clone(),
                    save_poll: self.reaction_poll(),
                    settle_ms: self.config().tempo.after_set_ms,
                },
                retry,
            ),
        };

        let outcome = chain.run(&exec, &surface).await;
        let mut result = outcome.to_result();
        let saved = match (action, result.committed, result.method) {
            (_, false, _) => false,
            (_, true, CommitMethod::RemoteWrite) => true,
            // These strategies finish their own page flow.
            (ReviseAction::End | ReviseAction::ListSimilar | ReviseAction::Toggle { .. }, true, _) => true,
            (_, true, CommitMethod::Dom) => {
                let saved = save_changes(&surface, &labels.save_changes, enable_poll).await;
                if !saved {
                    result = result.with_detail("value set; no save control accepted the click");
                }
                saved
            }
        };

        log.append(
            &format!("revise.{}", action.name()),
            json!({
                "committed": result.committed,
                "method": result.method.name(),
                "saved": saved,
                "detail": result.detail,
            }),
        )
        .await;
        if result.committed {
            info!(action_id = %exec.action_id, action = %action, saved, "revise finished");
        } else {
            warn!(action_id = %exec.action_id, action = %action, detail = ?result.detail, "revise not applied");
        }

        Ok(ReviseReport {
            action: action.clone(),
            result,
            saved,
            attempts: outcome.attempts,
            log: log.entries().await,
        })
    }
}

/// A visible button labelled with one of `labels`, enabled or not.
async fn find_button(port: &dyn DomPort, labels: &[String]) -> Option<ElementRef> {
    match BuilderPage::read(port, &[]).await {
        Ok(page) => page.button(None, labels).map(|info| info.element.clone()),
        Err(err) => {
            debug!("page unreadable while looking for {:?}: {}", labels, err);
            None
        }
    }
}

async fn save_changes(surface: &FillSurface<'_>, labels: &[String], enable_poll: PollSpec) -> bool {
    let Some(save) = find_button(surface.port, labels).await else {
        debug!("no save control on the page");
        return false;
    };
    match click_when_enabled(surface.port, surface.exec, &save, enable_poll).await {
        Ok(()) => true,
        Err(err) => {
            warn!(element = %save, "save click failed: {}", err);
            false
        }
    }
}

/// Clicks End, then the confirmation when the page asks for one.
struct EndListing {
    end: Vec<String>,
    confirm: Vec<String>,
    confirm_poll: PollSpec,
}

#[async_trait]
impl<C: FormSurface + ?Sized> FieldStrategy<C> for EndListing {
    fn name(&self) -> &str {
        "dom:end"
    }

    fn method(&self) -> CommitMethod {
        CommitMethod::Dom
    }

    async fn attempt(&self, ctx: &C) -> std::result::Result<Committed, FillError> {
        let port = ctx.port();
        let Some(end) = find_button(port, &self.end).await else {
            return Err(FillError::NotFound("end listing control".into()));
        };
        click_when_enabled(port, ctx.exec(), &end, ctx.locate_poll()).await?;

        // The confirmation dialog often reuses the End label; skip the control just clicked.
        let confirm_labels = &self.confirm;
        let end = &end;
        let confirm = poll_until_in(ctx.exec(), self.confirm_poll, move || async move {
            find_button(port, confirm_labels).await.filter(|found| found != end)
        })
        .await;
        match confirm {
            Some(confirm) => {
                click_when_enabled(port, ctx.exec(), &confirm, ctx.locate_poll()).await?;
                Ok(Committed::with_detail("ended after confirmation"))
            }
            None => Ok(Committed::with_detail("ended without confirmation")),
        }
    }
}

/// Opens the "sell similar" form and waits for its title input.
struct OpenSimilar {
    open: ClickTarget,
    form_poll: PollSpec,
}

#[async_trait]
impl<C: FormSurface + ?Sized> FieldStrategy<C> for OpenSimilar {
    fn name(&self) -> &str {
        "dom:list_similar"
    }

    fn method(&self) -> CommitMethod {
        CommitMethod::Dom
    }

    async fn attempt(&self, ctx: &C) -> std::result::Result<Committed, FillError> {
        FieldStrategy::<C>::attempt(&self.open, ctx).await?;
        let locator = ctx.locator();
        let port = ctx.port();
        let scope = LocateScope::all();
        let scope = &scope;
        let ready = poll_until_in(ctx.exec(), self.form_poll, move || async move {
            match locator.locate(port, &SemanticTarget::TitleInput, scope).await {
                Ok(_) => Some(()),
                Err(LocatorError::ElementNotFound(_)) => None,
                Err(err) => {
                    debug!("similar form probe failed: {}", err);
                    None
                }
            }
        })
        .await;
        match ready {
            Some(()) => Ok(Committed::with_detail("similar listing form open")),
            None => Err(FillError::CommitUnverified("similar listing form never rendered".into())),
        }
    }
}

/// Brings a toggle to the wanted state and saves.
///
/// When Save stays disabled after the toggle already showed the wanted state,
/// the toggle is unchecked and checked again so the page registers a change.
struct SetToggle {
    label: String,
    on: bool,
    save: Vec<String>,
    save_poll: PollSpec,
    settle_ms: u64,
}

impl SetToggle {
    fn target(&self) -> SemanticTarget {
        SemanticTarget::Custom(
            TargetSpec::new(ControlKind::Toggle)
                .labels([self.label.clone()])
                .names([self.label.clone()]),
        )
    }

    async fn enabled_save(&self, port: &dyn DomPort, exec: &ExecCtx) -> Option<ElementRef> {
        let labels = &self.save;
        poll_until_in(exec, self.save_poll, move || async move {
            let save = find_button(port, labels).await?;
            match port.element(&save).await {
                Ok(info) if info.enabled => Some(save),
                _ => None,
            }
        })
        .await
    }
}

#[async_trait]
impl<C: FormSurface + ?Sized> FieldStrategy<C> for SetToggle {
    fn name(&self) -> &str {
        "dom:toggle"
    }

    fn method(&self) -> CommitMethod {
        CommitMethod::Dom
    }

    async fn attempt(&self, ctx: &C) -> std::result::Result<Committed, FillError> {
        let port = ctx.port();
        let exec = ctx.exec();
        let resolution = ctx
            .locator()
            .locate_with_retry(port, exec, &self.target(), &ctx.scope(), ctx.locate_poll())
            .await?;
        let toggle = resolution.element;
        let changed = ensure_checked(port, exec, &toggle, self.on).await?;
        settle(self.settle_ms).await;

        let mut rechecked = false;
        let save = match self.enabled_save(port, exec).await {
            Some(save) => save,
            None if self.on && !changed => {
                info!(action_id = %exec.action_id, element = %toggle, "save stayed disabled; re-checking toggle");
                recheck_toggle(port, exec, &toggle, self.settle_ms).await?;
                rechecked = true;
                self.enabled_save(port, exec)
                    .await
                    .ok_or_else(|| FillError::CommitUnverified("save stayed disabled after re-check".into()))?
            }
            None => return Err(FillError::CommitUnverified("save control never enabled".into())),
        };
        click_when_enabled(port, exec, &save, ctx.locate_poll()).await?;

        let detail = match (changed, rechecked) {
            (true, _) => "toggle changed and saved",
            (false, true) => "toggle re-checked and saved",
            (false, false) => "toggle already set; saved",
        };
        Ok(Committed::with_detail(detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_with_a_tag() {
        let raw = serde_json::to_value(ReviseAction::Quantity(3)).unwrap();
        assert_eq!(raw, json!({ "action": "quantity", "value": 3 }));

        let toggle: ReviseAction =
            serde_json::from_value(json!({ "action": "toggle", "value": { "label": "Best offer", "on": true } })).unwrap();
        assert_eq!(toggle.name(), "toggle");
    }

    #[test]
    fn rejects_non_positive_price() {
        assert!(ReviseAction::Price(0.0).validate().is_err());
        assert!(ReviseAction::Price(12.5).validate().is_ok());
        assert!(ReviseAction::End.validate().is_ok());
    }
}
