//! Click primitive - full pointer sequence on an actionable element

use crate::{
    errors::ActionError,
    port::DomPort,
    primitives::ensure_live,
    types::{DomEvent, ElementRef, ExecCtx},
    waiting::{poll_until_in, PollSpec},
};
use tracing::{debug, info};

/// Pointer events a real user produces before `click` fires.
pub const POINTER_SEQUENCE: [DomEvent; 5] = [
    DomEvent::PointerDown,
    DomEvent::MouseDown,
    DomEvent::PointerUp,
    DomEvent::MouseUp,
    DomEvent::Click,
];

/// Clicks `el` with the full pointer sequence.
///
/// Steps:
/// 1. Validate context
/// 2. Check element is visible and enabled
/// 3. Dispatch pointer/mouse down and up, then click
pub async fn click(port: &dyn DomPort, ctx: &ExecCtx, el: &ElementRef) -> Result<(), ActionError> {
    ensure_live(ctx)?;
    let info = port.element(el).await?;
    if !info.visible {
        return Err(ActionError::StaleElement(format!("{} is not visible", el)));
    }
    if !info.enabled {
        return Err(ActionError::NotEnabled(el.to_string()));
    }
    debug!(action_id = %ctx.action_id, element = %el, tag = %info.tag, "Executing click primitive");
    for event in POINTER_SEQUENCE {
        port.dispatch(el, event).await?;
    }
    Ok(())
}

/// Waits (bounded) for `el` to become enabled, then clicks it.
pub async fn click_when_enabled(
    port: &dyn DomPort,
    ctx: &ExecCtx,
    el: &ElementRef,
    spec: PollSpec,
) -> Result<(), ActionError> {
    let ready = poll_until_in(ctx, spec, move || async move {
        match port.element(el).await {
            Ok(info) if info.is_actionable() => Some(()),
            _ => None,
        }
    })
    .await;
    if ready.is_none() {
        info!(action_id = %ctx.action_id, element = %el, "element never became clickable");
        return Err(ActionError::NotEnabled(el.to_string()));
    }
    click(port, ctx, el).await
}
