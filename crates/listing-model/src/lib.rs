//! Data model for listing drafts and their per-field outcomes.
//!
//! The draft is immutable input: helpers here return derived working copies and
//! never touch the caller's value.

pub mod draft;
pub mod result;
pub mod variations;

pub use draft::*;
pub use result::*;
pub use variations::*;
