use super::bag::PropertyBag;
use super::context::ExecutionContext;
use super::error::EngineError;
use super::property::PropertyError;
use crate::core::registry::WorkspaceRegistry;
use std::collections::BTreeMap;

/// A named, versioned operation over workspaces.
///
/// Implementations describe their properties in [`declare`](Algorithm::declare) and do
/// their work in [`exec`](Algorithm::exec), which always sees a single workspace per
/// property; running over workspace groups is handled by the engine.
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &'static str;

    fn version(&self) -> u32 {
        1
    }

    fn category(&self) -> &'static str {
        "General"
    }

    fn summary(&self) -> &'static str;

    fn declare(&self, bag: &mut PropertyBag) -> Result<(), PropertyError>;

    /// Cross-property checks, returning property name to message for each problem.
    ///
    /// Runs before any lock is taken. Under group fan-out it runs once per member with
    /// that member's properties bound.
    fn validate_inputs(
        &self,
        _bag: &PropertyBag,
        _registry: &WorkspaceRegistry,
    ) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError>;
}
