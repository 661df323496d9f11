//! Error types for locator system

use action_primitives::ActionError;
use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// No strategy produced a visible, enabled candidate
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Target description cannot match anything
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Document port failure
    #[error("Document error: {0}")]
    Port(#[from] ActionError),

    /// Bounded wait ran out
    #[error("Resolution timeout: {0}")]
    Timeout(String),
}

impl LocatorError {
    /// Not-found is expected while the page is still rendering.
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::ElementNotFound(_) | LocatorError::Timeout(_) => true,
            LocatorError::Port(err) => err.is_retryable(),
            LocatorError::InvalidTarget(_) => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::InvalidTarget(_) => 3,
            LocatorError::Port(err) => err.severity(),
            LocatorError::Timeout(_) => 2,
            LocatorError::ElementNotFound(_) => 1,
        }
    }
}
