//! Element location: semantic targets resolved by an ordered strategy cascade
//!
//! - attribute, accessible-label, placeholder, structural, label-proximity and
//!   text strategies, tried in that order
//! - candidates ranked by confidence, anchor proximity, ancestor distance and
//!   document order
//! - same-origin frames and shadow trees searched as one flattened tree
//! - remembered element signatures that refresh themselves on drift

pub mod errors;
pub mod flat;
pub mod memory;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use errors::*;
pub use flat::FlatDom;
pub use memory::{AnchorMemory, ElementSignature};
pub use resolver::*;
pub use strategies::*;
pub use types::*;
