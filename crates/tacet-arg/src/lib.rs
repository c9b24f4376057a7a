#![doc = include_str!("../README.md")]

//! Explored-state graph, paths, and path reconstruction.
//!
//! This crate defines the arena-backed explored-state DAG, immutable
//! execution paths with key sequences, exclusion sets for path diversity,
//! the backtracking reconstructor, and the usage/occurrence model shared
//! with the refinement engine.

pub mod cancel;
pub mod exclusion;
pub mod graph;
pub mod path;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;
pub mod reconstruct;
pub mod usage;
