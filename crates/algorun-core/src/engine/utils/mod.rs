//! Helpers shared by algorithm bodies.

pub mod parallel;
