//! Action primitives: the document port and the interactions built on it.
//!
//! - [`DomPort`]: query, dispatch and value access on a third-party page
//! - bounded polling ([`poll_until`]) used for every wait
//! - the value commit sequence, click, toggle and upload primitives
//! - [`snapshot::SnapshotDocument`]: a port over a captured page with a
//!   simulated UI-framework state model

pub mod errors;
pub mod port;
mod primitives;
pub mod snapshot;
pub mod types;
mod waiting;

pub use errors::*;
pub use port::*;
pub use primitives::*;
pub use types::*;
pub use waiting::*;
