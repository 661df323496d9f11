//! Interaction primitives built on [`DomPort`](crate::DomPort)
//!
//! 1. click - pointer sequence on an actionable element
//! 2. commit - the full value commit sequence (activate, set, notify, deactivate, verify)
//! 3. toggle - checkbox/switch handling incl. the uncheck/recheck heuristic
//! 4. upload - file attachment

mod click;
mod commit;
mod toggle;
mod upload;

pub use click::*;
pub use commit::*;
pub use toggle::*;
pub use upload::*;

use crate::{errors::ActionError, types::ExecCtx};

/// Fails fast when the context was cancelled or ran out of time.
pub fn ensure_live(ctx: &ExecCtx) -> Result<(), ActionError> {
    if ctx.is_cancelled() {
        return Err(ActionError::Interrupted("Context cancelled".to_string()));
    }
    if ctx.is_timeout() {
        return Err(ActionError::WaitTimeout(
            "Context deadline exceeded".to_string(),
        ));
    }
    Ok(())
}
