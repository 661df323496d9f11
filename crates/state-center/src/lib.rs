//! Persistent state shared between execution contexts.
//!
//! Execution contexts cannot share memory; everything they coordinate on
//! (locks, hand-off flags, the diagnostics log) lives behind [`KvStore`].

pub mod errors;
pub mod flow_log;
pub mod store;

pub use errors::StoreError;
pub use flow_log::{FlowLog, FlowLogEntry, DEFAULT_LOG_CAPACITY};
pub use store::{FileKvStore, InMemoryKvStore, KvStore, StoredValue};
pub use flow_log::load as load_flow_log;
