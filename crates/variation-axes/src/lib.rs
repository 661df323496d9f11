//! Variation axis resolution.
//!
//! Source axes arrive noisy: positional suffixes, duplicate spellings, axes
//! that never vary, and more axes than the target form supports. The resolver
//! cleans them into at most two ranked axes and maps each one onto an
//! attribute the target offers, or onto a new custom attribute.

pub mod alias;
pub mod normalize;
pub mod resolver;
pub mod vocab;

pub use alias::{AliasKind, AliasTable};
pub use normalize::{axis_key, is_value_concatenation, normalize_axis_name, squash};
pub use resolver::{project_skus, AttributeTarget, AxisResolver, ResolvedAxis, ResolverConfig};
pub use vocab::{AxisShape, ContaminationFilter};
