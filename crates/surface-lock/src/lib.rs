//! Cross-context advisory lock for the variation builder surface.

pub mod errors;
pub mod guard;
pub mod model;

pub use errors::{LockError, Result};
pub use guard::SurfaceLock;
pub use model::{LockConfig, LockLease, LockOwner, LockRecord, OwnerReach};
