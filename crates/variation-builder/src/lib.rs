//! Variation builder automation.
//!
//! Drives the listing site's variation builder as an explicit state machine:
//! attributes are aligned with the draft's axes, each axis gets its values,
//! the pricing grid is filled row by row and the builder is saved. Every
//! transition is appended to the draft's flow log.

pub mod config;
pub mod controller;
pub mod errors;
pub mod grid;
pub mod page;
pub mod state;

pub use config::{BuilderConfig, BuilderLabels};
pub use controller::{BuilderController, BuilderJob, BuilderRun};
pub use errors::BuilderError;
pub use grid::{is_disallowed_identifier, is_identifier_header, plan_grid, GridPricing, RowAssignment, RowMatch};
pub use page::{BuilderPage, Chip, GridTable};
pub use state::{BuilderReport, BuilderState, GridReport, RejectedValue, Transition};
