//! Checkbox and switch handling.
//!
//! Some pages keep a dependent control (typically Save) disabled until their
//! own diffing sees the toggle change, even when the toggle is already in the
//! desired state. [`recheck_toggle`] forces a visible change by unchecking and
//! checking again. It is a heuristic for framework-internal diffing we cannot
//! inspect and should only run after the dependent control stayed disabled.

use tracing::{debug, info};

use crate::{
    errors::ActionError,
    port::DomPort,
    primitives::ensure_live,
    types::{ElementRef, ExecCtx},
    waiting::settle,
};

/// Brings the toggle to `checked`; returns `true` when a change was made.
pub async fn ensure_checked(
    port: &dyn DomPort,
    ctx: &ExecCtx,
    el: &ElementRef,
    checked: bool,
) -> Result<bool, ActionError> {
    ensure_live(ctx)?;
    let current = port.element(el).await?.checked.unwrap_or(false);
    if current == checked {
        debug!(action_id = %ctx.action_id, element = %el, checked, "toggle already in place");
        return Ok(false);
    }
    port.set_checked(el, checked).await?;
    Ok(true)
}

/// Unchecks then re-checks a toggle so the page registers a change.
pub async fn recheck_toggle(
    port: &dyn DomPort,
    ctx: &ExecCtx,
    el: &ElementRef,
    settle_ms: u64,
) -> Result<(), ActionError> {
    ensure_live(ctx)?;
    let current = port.element(el).await?.checked.unwrap_or(false);
    info!(action_id = %ctx.action_id, element = %el, was_checked = current, "re-checking toggle");
    if current {
        port.set_checked(el, false).await?;
        settle(settle_ms).await;
    }
    port.set_checked(el, true).await?;
    settle(settle_ms).await;
    let after = port.element(el).await?.checked.unwrap_or(false);
    if after {
        Ok(())
    } else {
        Err(ActionError::StaleElement(format!("{} did not stay checked", el)))
    }
}
