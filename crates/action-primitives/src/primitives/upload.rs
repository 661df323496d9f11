//! File attachment primitive

use crate::{
    errors::ActionError,
    port::DomPort,
    primitives::ensure_live,
    types::{ElementRef, ExecCtx, FilePayload},
};
use tracing::{info, warn};

/// Attaches `files` in order; returns how many the input accepted.
pub async fn upload_files(
    port: &dyn DomPort,
    ctx: &ExecCtx,
    el: &ElementRef,
    files: &[FilePayload],
) -> Result<usize, ActionError> {
    ensure_live(ctx)?;
    if files.is_empty() {
        return Ok(0);
    }
    let accepted = port.attach_files(el, files).await?;
    if accepted < files.len() {
        warn!(
            action_id = %ctx.action_id,
            element = %el,
            accepted,
            offered = files.len(),
            "file input accepted fewer files than offered"
        );
    } else {
        info!(action_id = %ctx.action_id, element = %el, accepted, "files attached");
    }
    Ok(accepted)
}
