//! Remote draft port: `GET/PUT draft` plus a field writer that tolerates
//! unknown schemas by trying alternate payload shapes.

pub mod api;
pub mod errors;
pub mod writer;

pub use api::{merge, DraftApi, HttpDraftApi, InMemoryDraftApi};
pub use errors::RemoteError;
pub use writer::{lenient_eq, PayloadShape, RemoteField, RemoteFieldWriter, WriteOutcome};
