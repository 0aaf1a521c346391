use crate::core::index::IndexKind;
use crate::engine::algorithm::Algorithm;
use crate::engine::bag::PropertyBag;
use crate::engine::context::ExecutionContext;
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use crate::engine::property::{Direction, Property, PropertyError, PropertyValue};
use crate::engine::utils::parallel::map_indices;
use crate::engine::validators::ValidationTarget;
use tracing::{info, instrument};

/// Multiplies the counts of the selected spectra by a factor.
///
/// Runs in place when the output names the input; otherwise the input is copied first
/// and only the copy's selected spectra are scaled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scale;

fn finite(target: ValidationTarget<'_>) -> Option<String> {
    match target {
        ValidationTarget::Value(PropertyValue::Float(v)) if !v.is_finite() => {
            Some("factor must be finite".to_string())
        }
        _ => None,
    }
}

impl Algorithm for Scale {
    fn name(&self) -> &'static str {
        "Scale"
    }

    fn category(&self) -> &'static str {
        "Arithmetic"
    }

    fn summary(&self) -> &'static str {
        "Multiplies selected spectra by a constant factor"
    }

    fn declare(&self, bag: &mut PropertyBag) -> Result<(), PropertyError> {
        bag.declare_compound_workspace_input(
            "InputWorkspace",
            &[IndexKind::WorkspaceIndex, IndexKind::SpectrumNumber],
            "Workspace whose spectra are scaled",
        )?;
        bag.declare(Property::float("Factor").with_validator(finite))?;
        bag.declare(Property::workspace("OutputWorkspace", Direction::Output))
    }

    #[instrument(skip_all, name = "scale_algorithm")]
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        let factor = ctx.float("Factor")?;
        let threshold = ctx.config().parallel_threshold;
        let indices = ctx.indices("InputWorkspace")?;
        ctx.reporter().report(Progress::Message(format!(
            "Scaling {} spectra by {factor}",
            indices.len()
        )));

        let output = ctx.output_from_input("OutputWorkspace", "InputWorkspace")?;
        let scaled = {
            let source = &*output;
            map_indices(&indices, threshold, |position| {
                source
                    .spectrum(position)
                    .map(|s| s.counts.iter().map(|c| c * factor).collect::<Vec<f64>>())
                    .unwrap_or_default()
            })
        };
        for (position, counts) in indices.iter().zip(scaled) {
            if let Some(spectrum) = output.spectrum_mut(position) {
                spectrum.counts = counts;
            }
        }

        info!(spectra = indices.len(), factor, "Scaled spectra");
        Ok(())
    }
}
