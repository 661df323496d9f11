//! Fallback orchestration for form fields
//!
//! Every logical field is committed through a declarative, ordered chain of
//! independent strategies (DOM manipulation first, structured remote writes
//! after). Failures stay local to their field and are recorded as attempts;
//! internal steps retry with bounded linear backoff.

pub mod chain;
pub mod dom;
pub mod errors;
pub mod retry;

pub use chain::{AttemptRecord, ChainOutcome, BUDGET_EXHAUSTED, Committed, FallbackChain, FieldStrategy};
pub use dom::{FormSurface, LocateAndCommit, LocateAndUpload};
pub use errors::FillError;
pub use retry::{retry_step, RetryPolicy};
