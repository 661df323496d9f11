//! Error types for action primitives

use listing_core_types::CoreError;
use thiserror::Error;

/// Errors raised while talking to a document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Element reference no longer resolves (re-render or removal)
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// Document is unknown to the port
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Document content belongs to another origin and cannot be read
    #[error("Cross-origin document: {0}")]
    CrossOrigin(String),

    /// Element is not enabled for interaction
    #[error("Element not enabled: {0}")]
    NotEnabled(String),

    /// Element does not support the requested operation
    #[error("Unsupported on element: {0}")]
    Unsupported(String),

    /// Wait operation timed out
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Operation was cancelled or interrupted
    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    /// Page snapshot could not be parsed
    #[error("Invalid snapshot: {0}")]
    Snapshot(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::StaleElement(_) | ActionError::WaitTimeout(_) | ActionError::NotEnabled(_)
        )
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ActionError::Internal(_) | ActionError::Snapshot(_) => 3,
            ActionError::CrossOrigin(_) | ActionError::DocumentNotFound(_) => 2,
            ActionError::WaitTimeout(_) | ActionError::NotEnabled(_) => 1,
            _ => 0,
        }
    }
}

impl From<ActionError> for CoreError {
    fn from(err: ActionError) -> Self {
        CoreError::new(err.to_string())
    }
}
