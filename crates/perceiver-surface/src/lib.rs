//! Surface detection for the listing flow.
//!
//! Classifies reachable documents as the plain listing form, the variation
//! builder or the pricing grid from independent weighted signals, with a
//! dialog-shell shortcut for builders hosted in unreadable sub-documents.

pub mod detector;
pub mod errors;
pub mod models;

pub use detector::SurfaceDetector;
pub use errors::{DetectError, Result};
pub use models::*;
