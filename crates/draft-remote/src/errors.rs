use listing_core_types::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("draft {0} not found")]
    NotFound(String),

    /// The API refused this payload (4xx); another shape may pass.
    #[error("payload rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("draft api returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid draft api url: {0}")]
    Url(#[from] url::ParseError),

    #[error("draft payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Every payload shape for a field failed.
    #[error("no payload shape accepted for {field}: {last}")]
    Exhausted { field: String, last: String },
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

impl From<RemoteError> for CoreError {
    fn from(err: RemoteError) -> Self {
        CoreError::new(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
