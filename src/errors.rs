//! Error handling module
//!
//! Setup and I/O failures of the engine. Field-level trouble never shows up
//! here: it is reported per field in the fill report.

use action_primitives::ActionError;
use draft_remote::RemoteError;
use listing_event_bus::BusError;
use listing_model::DraftError;
use listing_state_center::StoreError;
use perceiver_surface::DetectError;
use surface_lock::LockError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid draft: {0}")]
    Draft(#[from] DraftError),

    #[error("page error: {0}")]
    Page(#[from] ActionError),

    #[error("surface detector: {0}")]
    Detector(#[from] DetectError),

    #[error("state store: {0}")]
    Store(#[from] StoreError),

    #[error("surface lock: {0}")]
    Lock(#[from] LockError),

    #[error("remote draft: {0}")]
    Remote(#[from] RemoteError),

    #[error("message bus: {0}")]
    Bus(#[from] BusError),

    #[error("{0}")]
    Invalid(String),
}

impl EngineError {
    /// Create configuration error
    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Config(message.into())
    }

    /// Create validation error for caller input
    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::Invalid(message.into())
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(err) => err.is_retryable(),
            EngineError::Lock(err) => err.is_retryable(),
            EngineError::Remote(err) => err.is_retryable(),
            EngineError::Bus(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
