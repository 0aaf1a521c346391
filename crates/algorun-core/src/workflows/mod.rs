//! # Workflows Module
//!
//! High-level entry points that drive the engine through complete procedures.
//!
//! - **Pipeline** ([`pipeline`]) runs an ordered list of algorithm steps against one shared
//!   registry, one progress phase per step, stopping at the first failure.

pub mod pipeline;
