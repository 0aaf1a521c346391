use crate::core::models::workspace::Workspace;
use crate::engine::algorithm::Algorithm;
use crate::engine::bag::PropertyBag;
use crate::engine::context::ExecutionContext;
use crate::engine::error::EngineError;
use crate::engine::property::{Direction, Property, PropertyError};
use crate::engine::validators::{BoundedValue, NonEmptyText};
use tracing::debug;

/// Creates a rectangular workspace filled with a constant.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateWorkspace;

impl Algorithm for CreateWorkspace {
    fn name(&self) -> &'static str {
        "CreateWorkspace"
    }

    fn category(&self) -> &'static str {
        "Utility"
    }

    fn summary(&self) -> &'static str {
        "Creates a workspace of constant counts"
    }

    fn declare(&self, bag: &mut PropertyBag) -> Result<(), PropertyError> {
        bag.declare(
            Property::workspace("OutputWorkspace", Direction::Output)
                .with_doc("Name of the workspace to create"),
        )?;
        bag.declare(
            Property::integer("NumberOfSpectra").with_validator(BoundedValue::at_least(1.0)),
        )?;
        bag.declare(
            Property::integer("BinsPerSpectrum").with_validator(BoundedValue::at_least(1.0)),
        )?;
        bag.declare(Property::float("Fill").with_default(0.0))?;
        bag.declare(
            Property::integer("FirstSpectrumNumber")
                .with_default(1_i64)
                .with_validator(BoundedValue::at_least(0.0)),
        )?;
        bag.declare(
            Property::text("Title")
                .optional()
                .with_validator(NonEmptyText),
        )
    }

    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        let bag = ctx.bag();
        let spectra = usize::try_from(bag.integer("NumberOfSpectra")?)
            .map_err(|_| EngineError::Execution("NumberOfSpectra is negative".to_string()))?;
        let bins = usize::try_from(bag.integer("BinsPerSpectrum")?)
            .map_err(|_| EngineError::Execution("BinsPerSpectrum is negative".to_string()))?;
        let first = u64::try_from(bag.integer("FirstSpectrumNumber")?)
            .map_err(|_| EngineError::Execution("FirstSpectrumNumber is negative".to_string()))?;
        let title = if bag.has_value("Title") {
            bag.text("Title")?
        } else {
            bag.workspace_name("OutputWorkspace")?
        };

        debug!(spectra, bins, "Creating workspace");
        let workspace = Workspace::filled(title, spectra, bins, bag.float("Fill")?, first);
        ctx.set_output("OutputWorkspace", workspace)
    }
}
