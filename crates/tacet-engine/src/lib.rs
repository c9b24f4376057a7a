#![doc = include_str!("../README.md")]

//! Tacet refinement engine.
//!
//! This crate defines the precision/result model, the refinement block
//! abstraction with its control signals, the generic iterator/filter/
//! single-path adapters, the concrete refinement stages, and the root
//! CEGAR driver.

pub mod adapters;
pub mod block;
pub mod config;
pub mod driver;
pub mod error;
pub mod oracle;
pub mod precision;
pub mod result;
pub mod stages;
pub mod stats;
pub mod transfer;
