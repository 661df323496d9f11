use action_primitives::ActionError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error("document error: {0}")]
    Port(#[from] ActionError),

    #[error("invalid url pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DetectError>;
