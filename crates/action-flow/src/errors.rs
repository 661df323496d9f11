//! Fill error taxonomy

use action_locator::LocatorError;
use action_primitives::ActionError;
use listing_core_types::CoreError;
use thiserror::Error;

/// Why one field (or one builder step) did not commit.
///
/// Every variant is local to the field or stage that raised it; none aborts a run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FillError {
    /// Locator found no candidate
    #[error("Control not found: {0}")]
    NotFound(String),

    /// Value was set but reading it back did not confirm it
    #[error("Commit unverified: {0}")]
    CommitUnverified(String),

    /// Surface detection stayed below threshold after the broader search
    #[error("Surface ambiguous: {0}")]
    SurfaceAmbiguous(String),

    /// Another context holds the surface
    #[error("Surface lock contended: {0}")]
    LockContended(String),

    /// Structured remote write rejected for every payload shape
    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(String),

    /// Bounded wait or run budget exhausted
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FillError {
    /// Retrying the same strategy may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FillError::NotFound(_)
                | FillError::CommitUnverified(_)
                | FillError::LockContended(_)
                | FillError::Timeout(_)
        )
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            FillError::Internal(_) => 3,
            FillError::RemoteWriteFailed(_) | FillError::LockContended(_) => 2,
            FillError::CommitUnverified(_) | FillError::SurfaceAmbiguous(_) | FillError::Timeout(_) => 1,
            FillError::NotFound(_) => 0,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FillError::NotFound(_) => "not_found",
            FillError::CommitUnverified(_) => "commit_unverified",
            FillError::SurfaceAmbiguous(_) => "surface_ambiguous",
            FillError::LockContended(_) => "lock_contended",
            FillError::RemoteWriteFailed(_) => "remote_write_failed",
            FillError::Timeout(_) => "timeout",
            FillError::Internal(_) => "internal",
        }
    }
}

impl From<ActionError> for FillError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::StaleElement(msg) => FillError::NotFound(msg),
            ActionError::WaitTimeout(msg) | ActionError::Interrupted(msg) => FillError::Timeout(msg),
            ActionError::NotEnabled(msg) => FillError::CommitUnverified(format!("not enabled: {msg}")),
            other => FillError::Internal(other.to_string()),
        }
    }
}

impl From<LocatorError> for FillError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::ElementNotFound(msg) | LocatorError::InvalidTarget(msg) => FillError::NotFound(msg),
            LocatorError::Timeout(msg) => FillError::Timeout(msg),
            LocatorError::Port(err) => err.into(),
        }
    }
}

impl From<FillError> for CoreError {
    fn from(err: FillError) -> Self {
        CoreError::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_errors_map_to_taxonomy() {
        let err: FillError = LocatorError::ElementNotFound("title".into()).into();
        assert_eq!(err, FillError::NotFound("title".into()));
        assert!(err.is_retryable());

        let err: FillError = LocatorError::Port(ActionError::WaitTimeout("grid".into())).into();
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn remote_failures_are_not_retried_in_place() {
        assert!(!FillError::RemoteWriteFailed("400".into()).is_retryable());
        assert_eq!(FillError::RemoteWriteFailed("400".into()).severity(), 2);
    }
}
