use crate::core::models::workspace::{Spectrum, Workspace};
use crate::core::registry::WorkspaceRegistry;
use crate::engine::algorithm::Algorithm;
use crate::engine::bag::PropertyBag;
use crate::engine::context::ExecutionContext;
use crate::engine::error::EngineError;
use crate::engine::property::{Direction, Property, PropertyError};
use std::collections::BTreeMap;

/// Adds two workspaces of the same shape spectrum by spectrum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plus;

fn shape(registry: &WorkspaceRegistry, name: &str) -> Option<(usize, usize)> {
    let handle = registry.retrieve(name).ok()?;
    let workspace = handle.read();
    Some((workspace.size(), workspace.bins()))
}

impl Algorithm for Plus {
    fn name(&self) -> &'static str {
        "Plus"
    }

    fn category(&self) -> &'static str {
        "Arithmetic"
    }

    fn summary(&self) -> &'static str {
        "Adds two workspaces of matching shape"
    }

    fn declare(&self, bag: &mut PropertyBag) -> Result<(), PropertyError> {
        bag.declare(Property::workspace("LHSWorkspace", Direction::Input))?;
        bag.declare(Property::workspace("RHSWorkspace", Direction::Input))?;
        bag.declare(Property::workspace("OutputWorkspace", Direction::Output))
    }

    fn validate_inputs(
        &self,
        bag: &PropertyBag,
        registry: &WorkspaceRegistry,
    ) -> BTreeMap<String, String> {
        let mut failures = BTreeMap::new();
        let (Ok(lhs), Ok(rhs)) = (
            bag.workspace_name("LHSWorkspace"),
            bag.workspace_name("RHSWorkspace"),
        ) else {
            return failures;
        };
        if let (Some(lhs_shape), Some(rhs_shape)) = (shape(registry, lhs), shape(registry, rhs)) {
            if lhs_shape != rhs_shape {
                failures.insert(
                    "RHSWorkspace".to_string(),
                    format!(
                        "shape {}x{} of '{rhs}' does not match {}x{} of '{lhs}'",
                        rhs_shape.0, rhs_shape.1, lhs_shape.0, lhs_shape.1
                    ),
                );
            }
        }
        failures
    }

    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        let sum = {
            let lhs = ctx.workspace("LHSWorkspace")?;
            let rhs = ctx.workspace("RHSWorkspace")?;
            if lhs.size() != rhs.size() {
                return Err(EngineError::Execution(format!(
                    "Cannot add workspaces with {} and {} spectra",
                    lhs.size(),
                    rhs.size()
                )));
            }
            let spectra = lhs
                .spectra()
                .iter()
                .zip(rhs.spectra())
                .map(|(l, r)| {
                    Spectrum::new(
                        l.number,
                        l.counts.iter().zip(&r.counts).map(|(a, b)| a + b).collect(),
                    )
                })
                .collect();
            Workspace::with_spectra(format!("{} + {}", lhs.title, rhs.title), spectra)
        };
        ctx.set_output("OutputWorkspace", sum)
    }
}
