use listing_core_types::{CoreError, LockScope};
use listing_state_center::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("scope {scope} held by context {holder} ({tier}, {age_ms}ms old)")]
    Contended {
        scope: LockScope,
        holder: String,
        tier: &'static str,
        age_ms: i64,
    },

    #[error("lock store error: {0}")]
    Store(#[from] StoreError),

    #[error("lock payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl LockError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LockError::Contended { .. } => true,
            LockError::Store(err) => err.is_retryable(),
            LockError::Payload(_) => false,
        }
    }

    pub fn is_contended(&self) -> bool {
        matches!(self, LockError::Contended { .. })
    }
}

impl From<LockError> for CoreError {
    fn from(err: LockError) -> Self {
        CoreError::new(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
