//! ListingPilot library
//!
//! Fills a third-party marketplace listing form from a product draft:
//! per-field fallback chains, the variation builder (run here or handed to
//! the context that can see it) and edits on live listings.

pub mod agent;
pub mod config;
pub mod engine;
pub mod errors;
pub mod revise;

// Re-export commonly used types for external use
pub use agent::{BuilderAgent, BuilderBus, BuilderCommand, BuilderReply, BuilderRequest, HandoffFlag};
pub use config::EngineConfig;
pub use engine::{Engine, FillReport};
pub use errors::{EngineError, Result};
pub use revise::{ReviseAction, ReviseReport};
