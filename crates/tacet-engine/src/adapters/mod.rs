//! Generic chain adapters: iteration over derived candidates, cheap
//! admissibility filtering, and per-side path validation. Concrete stages
//! plug domain logic into these through small delegate traits.

pub mod filter;
pub mod iterate;
pub mod single_path;

pub use filter::{FilterBlock, PairFilter};
pub use iterate::{BlockIteration, IterStep, IteratingBlock};
pub use single_path::{SidePathBlock, SideRefiner};
