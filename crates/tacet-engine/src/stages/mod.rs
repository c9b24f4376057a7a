//! Concrete refinement stages, outermost to innermost: point-pair
//! enumeration, occurrence-pair enumeration, the usage-point filter, path
//! reconstruction, and the context compatibility filter. The per-side and
//! joint oracle links live in [`crate::oracle`].

pub mod compat;
pub mod path_pairs;
pub mod points;
pub mod usage_filter;
pub mod usage_pairs;

pub use compat::CompatFilterBlock;
pub use path_pairs::PathPairIteration;
pub use points::PointIteration;
pub use usage_filter::UsagePointFilter;
pub use usage_pairs::UsagePairIteration;
