//! # Built-in Algorithms
//!
//! A small set of algorithms that exercise the engine end to end. Their numeric content
//! is deliberately simple.

pub mod create;
pub mod plus;
pub mod scale;

use crate::engine::factory::AlgorithmFactory;

pub use create::CreateWorkspace;
pub use plus::Plus;
pub use scale::Scale;

/// Registers every built-in algorithm with `factory`.
pub fn register_builtins(factory: &mut AlgorithmFactory) {
    factory.subscribe(|| Box::new(CreateWorkspace));
    factory.subscribe(|| Box::new(Scale));
    factory.subscribe(|| Box::new(Plus));
}
