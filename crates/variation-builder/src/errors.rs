use action_flow::FillError;
use listing_core_types::CoreError;
use surface_lock::LockError;
use thiserror::Error;

use crate::state::BuilderState;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("builder surface not found: {0}")]
    NotDetected(String),

    #[error("builder lives in an unreadable document {0}")]
    Unreachable(String),

    #[error("no usable variation axes")]
    NoAxes,

    #[error("builder lock: {0}")]
    Lock(#[from] LockError),

    #[error("builder lock on {0} was taken over mid-run")]
    LockLost(String),

    #[error("{state} failed: {source}")]
    Step {
        state: BuilderState,
        #[source]
        source: FillError,
    },
}

impl BuilderError {
    pub fn step(state: BuilderState, source: FillError) -> Self {
        BuilderError::Step { state, source }
    }

    /// Running the whole builder again may help.
    pub fn is_retryable(&self) -> bool {
        match self {
            BuilderError::NotDetected(_) => true,
            BuilderError::Lock(err) => err.is_retryable(),
            BuilderError::Step { source, .. } => source.is_retryable(),
            BuilderError::Unreachable(_) | BuilderError::NoAxes | BuilderError::LockLost(_) => false,
        }
    }
}

impl From<BuilderError> for FillError {
    fn from(err: BuilderError) -> Self {
        match err {
            BuilderError::NotDetected(detail) => FillError::SurfaceAmbiguous(detail),
            BuilderError::Lock(lock) if lock.is_contended() => FillError::LockContended(lock.to_string()),
            lost @ BuilderError::LockLost(_) => FillError::LockContended(lost.to_string()),
            BuilderError::Step { source, .. } => source,
            other => FillError::Internal(other.to_string()),
        }
    }
}

impl From<BuilderError> for CoreError {
    fn from(err: BuilderError) -> Self {
        CoreError::new(err.to_string())
    }
}
