//! Value commit primitive.
//!
//! Makes a value stick in a control whose state lives in the page's UI
//! framework rather than in the control itself:
//!
//! 1. Activate: pointer/mouse down+up, click, focus
//! 2. Set through the native setter (bypasses per-instance interceptors)
//! 3. Notify: input, change
//! 4. Typeahead only: pick the matching suggestion or press Enter
//! 5. Deactivate: blur, focusout, click a neutral element
//! 6. Verify by reading the value back from the page's state model
//!
//! Deactivation runs even when an earlier step failed, so no control is left
//! focused with a half-applied edit.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    errors::ActionError,
    port::DomPort,
    primitives::{ensure_live, POINTER_SEQUENCE},
    types::{DomEvent, ElementInfo, ElementRef, ExecCtx, SetterKind},
    waiting::{poll_until_in, settle, PollSpec},
};

/// Settle delays between commit steps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitTempo {
    pub after_activate_ms: u64,
    pub after_set_ms: u64,
    pub after_deactivate_ms: u64,
    pub suggestion_poll: PollSpec,
}

impl Default for CommitTempo {
    fn default() -> Self {
        Self {
            after_activate_ms: 40,
            after_set_ms: 60,
            after_deactivate_ms: 80,
            suggestion_poll: PollSpec::new(50, 6),
        }
    }
}

impl CommitTempo {
    /// No delays; for snapshot pages that reconcile synchronously.
    pub fn immediate() -> Self {
        Self {
            after_activate_ms: 0,
            after_set_ms: 0,
            after_deactivate_ms: 0,
            suggestion_poll: PollSpec::new(0, 1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    Plain,
    /// Dropdown/typeahead control: a suggestion must be accepted after typing.
    Typeahead,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStage {
    Activate,
    Set,
    Notify,
    Suggest,
    Deactivate,
    Verify,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub stage: CommitStage,
    pub ok: bool,
    pub detail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub committed: bool,
    /// What the page's state model reported after deactivation.
    pub observed: Option<String>,
    pub steps: Vec<StepRecord>,
    pub latency_ms: u64,
}

impl CommitOutcome {
    /// Deactivation is the last interaction step of every run.
    pub fn ended_with_deactivation(&self) -> bool {
        self.steps
            .iter()
            .rev()
            .find(|step| step.stage != CommitStage::Verify)
            .map(|step| step.stage == CommitStage::Deactivate)
            .unwrap_or(false)
    }

    pub fn failure_detail(&self) -> Option<String> {
        self.steps
            .iter()
            .find(|step| !step.ok)
            .map(|step| match &step.detail {
                Some(detail) => format!("{:?}: {}", step.stage, detail),
                None => format!("{:?} failed", step.stage),
            })
    }
}

struct Steps(Vec<StepRecord>);

impl Steps {
    fn record(&mut self, stage: CommitStage, result: Result<(), ActionError>) -> Result<(), ActionError> {
        let detail = result.as_ref().err().map(ToString::to_string);
        self.0.push(StepRecord {
            stage,
            ok: result.is_ok(),
            detail,
        });
        result
    }

    fn note(&mut self, stage: CommitStage, ok: bool, detail: impl Into<String>) {
        self.0.push(StepRecord {
            stage,
            ok,
            detail: Some(detail.into()),
        });
    }
}

/// Commits `value` into `el` and reports whether the page accepted it.
pub async fn commit_value(
    port: &dyn DomPort,
    ctx: &ExecCtx,
    el: &ElementRef,
    value: &str,
    mode: CommitMode,
    tempo: &CommitTempo,
) -> CommitOutcome {
    let started = Instant::now();
    let mut steps = Steps(Vec::new());
    info!(
        action_id = %ctx.action_id,
        element = %el,
        mode = ?mode,
        "Committing value"
    );

    if let Err(err) = forward(port, ctx, el, value, mode, tempo, &mut steps).await {
        debug!(action_id = %ctx.action_id, error = %err, "commit sequence interrupted; deactivating");
    }

    let deactivated = deactivate(port, el).await;
    let _ = steps.record(CommitStage::Deactivate, deactivated);
    settle(tempo.after_deactivate_ms).await;

    let (committed, observed) = match verify(port, el, value).await {
        Ok((matched, observed)) => {
            if matched {
                steps.note(CommitStage::Verify, true, observed.clone());
            } else {
                steps.note(
                    CommitStage::Verify,
                    false,
                    format!("expected '{}', page holds '{}'", value, observed),
                );
            }
            (matched, Some(observed))
        }
        Err(err) => {
            let _ = steps.record(CommitStage::Verify, Err(err));
            (false, None)
        }
    };
    // A failed forward step means the observed value is not ours, even if it matches.
    let committed = committed && steps.0.iter().all(|step| step.ok);

    if !committed {
        warn!(action_id = %ctx.action_id, element = %el, observed = ?observed, "value not confirmed by page");
    }
    CommitOutcome {
        committed,
        observed,
        steps: steps.0,
        latency_ms: started.elapsed().as_millis() as u64,
    }
}

async fn forward(
    port: &dyn DomPort,
    ctx: &ExecCtx,
    el: &ElementRef,
    value: &str,
    mode: CommitMode,
    tempo: &CommitTempo,
    steps: &mut Steps,
) -> Result<(), ActionError> {
    steps.record(CommitStage::Activate, activate(port, ctx, el).await)?;
    settle(tempo.after_activate_ms).await;

    steps.record(
        CommitStage::Set,
        port.set_value(el, value, SetterKind::Native).await,
    )?;
    settle(tempo.after_set_ms).await;

    let notified = async {
        port.dispatch(el, DomEvent::Input).await?;
        port.dispatch(el, DomEvent::Change).await
    }
    .await;
    steps.record(CommitStage::Notify, notified)?;
    settle(tempo.after_set_ms).await;

    if mode == CommitMode::Typeahead {
        let accepted = accept_suggestion(port, ctx, el, value, tempo).await;
        steps.record(CommitStage::Suggest, accepted)?;
    }
    Ok(())
}

async fn activate(port: &dyn DomPort, ctx: &ExecCtx, el: &ElementRef) -> Result<(), ActionError> {
    ensure_live(ctx)?;
    let info = port.element(el).await?;
    if !info.enabled {
        return Err(ActionError::NotEnabled(el.to_string()));
    }
    for event in POINTER_SEQUENCE {
        port.dispatch(el, event).await?;
    }
    port.dispatch(el, DomEvent::Focus).await
}

/// Clicks a visible suggestion matching `value`; presses Enter when none shows up.
async fn accept_suggestion(
    port: &dyn DomPort,
    ctx: &ExecCtx,
    el: &ElementRef,
    value: &str,
    tempo: &CommitTempo,
) -> Result<(), ActionError> {
    let wanted = normalize(value);
    let wanted = wanted.as_str();
    let suggestion = poll_until_in(ctx, tempo.suggestion_poll, move || async move {
        let elements = port.elements(&el.document).await.ok()?;
        let options: Vec<&ElementInfo> = elements
            .iter()
            .filter(|info| info.visible && info.role() == Some("option"))
            .collect();
        options
            .iter()
            .find(|info| normalize(&info.text) == wanted)
            .or_else(|| options.iter().find(|info| normalize(&info.text).starts_with(wanted)))
            .map(|info| info.element.clone())
    })
    .await;

    match suggestion {
        Some(option) => {
            debug!(action_id = %ctx.action_id, option = %option, "accepting suggestion");
            for event in POINTER_SEQUENCE {
                port.dispatch(&option, event).await?;
            }
            Ok(())
        }
        None => {
            port.dispatch(el, DomEvent::KeyDown("Enter".into())).await?;
            port.dispatch(el, DomEvent::KeyUp("Enter".into())).await
        }
    }
}

/// Blur + focusout on the control, then a click somewhere neutral.
async fn deactivate(port: &dyn DomPort, el: &ElementRef) -> Result<(), ActionError> {
    let blur = port.dispatch(el, DomEvent::Blur).await;
    let focus_out = port.dispatch(el, DomEvent::FocusOut).await;
    let neutral = match port.neutral_element(&el.document).await {
        Ok(neutral) if &neutral != el => port.dispatch(&neutral, DomEvent::Click).await,
        Ok(_) => Ok(()),
        Err(err) => Err(err),
    };
    blur.and(focus_out).and(neutral)
}

async fn verify(port: &dyn DomPort, el: &ElementRef, expected: &str) -> Result<(bool, String), ActionError> {
    let observed = port.read_value(el).await?;
    if values_match(expected, &observed) {
        return Ok((true, observed));
    }
    // Selects report the option value; accept when its label is what we asked for.
    let info = port.element(el).await?;
    if info.is_tag("select") {
        let elements = port.elements(&el.document).await?;
        let label_matches = elements.iter().any(|opt| {
            opt.is_tag("option")
                && opt.parent.as_ref() == Some(el)
                && opt.attr("value") == Some(observed.as_str())
                && values_match(expected, &opt.text)
        });
        return Ok((label_matches, observed));
    }
    Ok((false, observed))
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn numeric(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() || cleaned.len() * 2 < text.trim().len() {
        return None;
    }
    cleaned.parse().ok()
}

/// Whitespace/case-insensitive comparison; numbers compare by value.
pub fn values_match(expected: &str, observed: &str) -> bool {
    if normalize(expected) == normalize(observed) {
        return true;
    }
    match (numeric(expected), numeric(observed)) {
        (Some(a), Some(b)) => (a - b).abs() < 0.005,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{HookTrigger, JournalEvent, NodeSnapshot, SnapshotDocument};
    use listing_core_types::ContextRoute;
    use std::time::Duration;

    fn ctx() -> ExecCtx {
        ExecCtx::with_budget(ContextRoute::top("https://shop.test/"), Duration::from_secs(5))
    }

    fn page() -> SnapshotDocument {
        SnapshotDocument::single(
            "https://shop.test/sell",
            NodeSnapshot::new("body").children([
                NodeSnapshot::new("input").id("title").managed(),
                NodeSnapshot::new("input").id("brand").attr("role", "combobox").managed(),
                NodeSnapshot::new("ul").attr("role", "listbox").id("brand-list").hidden(),
                NodeSnapshot::new("input").id("locked").attr("disabled", "").managed(),
            ]),
        )
    }

    fn last_dom_event(page: &SnapshotDocument, id: &str) -> Option<DomEvent> {
        let el = page.with_state(|s| s.find(id))?;
        page.journal()
            .into_iter()
            .filter(|entry| entry.element == el)
            .filter_map(|entry| match entry.event {
                JournalEvent::Dom(event) => Some(event),
                _ => None,
            })
            .last()
    }

    #[tokio::test]
    async fn plain_commit_reaches_state_model() {
        let page = page();
        let title = page.with_state(|s| s.find("title")).unwrap();
        let out = commit_value(&page, &ctx(), &title, "Red Shoe", CommitMode::Plain, &CommitTempo::immediate()).await;
        assert!(out.committed, "{:?}", out.steps);
        assert_eq!(out.observed.as_deref(), Some("Red Shoe"));
        assert!(out.ended_with_deactivation());
        assert_eq!(last_dom_event(&page, "title"), Some(DomEvent::FocusOut));
    }

    #[tokio::test]
    async fn failed_activation_still_deactivates() {
        let page = page();
        let locked = page.with_state(|s| s.find("locked")).unwrap();
        let out = commit_value(&page, &ctx(), &locked, "x", CommitMode::Plain, &CommitTempo::immediate()).await;
        assert!(!out.committed);
        assert!(!out.steps[0].ok);
        assert!(out.ended_with_deactivation());
        assert_eq!(last_dom_event(&page, "locked"), Some(DomEvent::FocusOut));
        assert!(page.with_state(|s| s.focused()).is_none());
    }

    #[tokio::test]
    async fn typeahead_clicks_matching_suggestion() {
        let page = page();
        page.on("brand", HookTrigger::Input, |state, _| {
            if let Some(list) = state.find("brand-list") {
                state.set_hidden(&list, false);
                state.append_child(
                    &list,
                    NodeSnapshot::new("li").attr("role", "option").id("opt-nike").text("Nike"),
                );
            }
        });
        let picked = std::sync::Arc::new(parking_lot::Mutex::new(false));
        let flag = picked.clone();
        page.on("opt-nike", HookTrigger::Click, move |_, _| *flag.lock() = true);

        let brand = page.with_state(|s| s.find("brand")).unwrap();
        let out = commit_value(&page, &ctx(), &brand, "nike", CommitMode::Typeahead, &CommitTempo::immediate()).await;
        assert!(*picked.lock());
        assert!(out.committed, "{:?}", out.steps);
        assert!(out.steps.iter().any(|s| s.stage == CommitStage::Suggest && s.ok));
    }

    #[tokio::test]
    async fn typeahead_without_suggestions_presses_enter() {
        let page = page();
        let brand = page.with_state(|s| s.find("brand")).unwrap();
        let out = commit_value(&page, &ctx(), &brand, "Acme", CommitMode::Typeahead, &CommitTempo::immediate()).await;
        assert!(out.committed);
        assert!(page
            .journal()
            .iter()
            .any(|entry| entry.event == JournalEvent::Dom(DomEvent::KeyDown("Enter".into()))));
    }

    #[test]
    fn numeric_values_compare_by_value() {
        assert!(values_match("12.50", "12.5"));
        assert!(values_match(" Red  Shoe ", "red shoe"));
        assert!(!values_match("12", "13"));
        assert!(!values_match("S", "M"));
    }
}
