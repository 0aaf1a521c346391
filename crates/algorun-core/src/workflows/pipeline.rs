use crate::core::index::{IndexKind, IndexSpecification};
use crate::core::registry::WorkspaceRegistry;
use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::factory::AlgorithmFactory;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::property::{PropertyRole, PropertyValue};
use crate::engine::runner::{Engine, Invocation};
use crate::engine::state::ExecutionReport;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, instrument};

/// Index settings for one compound property of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundIndices {
    pub kind: IndexKind,
    pub spec: IndexSpecification,
}

/// One algorithm invocation in a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    pub algorithm: String,
    pub version: Option<u32>,
    pub properties: BTreeMap<String, PropertyValue>,
    /// Keyed by compound property name; the dataset comes from `properties`.
    pub indices: BTreeMap<String, CompoundIndices>,
}

impl PipelineStep {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            version: None,
            properties: BTreeMap::new(),
            indices: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn with_indices(
        mut self,
        name: &str,
        kind: IndexKind,
        spec: impl Into<IndexSpecification>,
    ) -> Self {
        self.indices.insert(
            name.to_string(),
            CompoundIndices {
                kind,
                spec: spec.into(),
            },
        );
        self
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Step {step} ({algorithm}) failed: {source}")]
    Step {
        step: usize,
        algorithm: String,
        #[source]
        source: EngineError,
    },
}

impl PipelineError {
    fn step(step: usize, algorithm: &str, source: EngineError) -> Self {
        Self::Step {
            step,
            algorithm: algorithm.to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub reports: Vec<ExecutionReport>,
    pub duration: Duration,
}

/// Builds every step's invocation and applies its properties without running anything.
///
/// A compound property named without index settings selects every element, using the
/// first index kind it accepts. Step numbers in errors are 1-based.
pub fn prepare(
    factory: &AlgorithmFactory,
    steps: &[PipelineStep],
) -> Result<Vec<Invocation>, PipelineError> {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            build_invocation(factory, step)
                .map_err(|e| PipelineError::step(i + 1, &step.algorithm, e))
        })
        .collect()
}

fn build_invocation(
    factory: &AlgorithmFactory,
    step: &PipelineStep,
) -> Result<Invocation, EngineError> {
    let mut invocation = Invocation::initialized(factory.create(&step.algorithm, step.version)?)?;
    for (name, value) in &step.properties {
        let preferred_kind = match invocation.bag().property(name)?.role() {
            PropertyRole::CompoundWorkspace { allowed_kinds } => allowed_kinds.first().copied(),
            _ => None,
        };
        match (step.indices.get(name), preferred_kind) {
            (Some(indices), _) => invocation.set_compound(
                name,
                &value.to_string(),
                indices.kind,
                indices.spec.clone(),
            )?,
            (None, Some(kind)) => {
                invocation.set_compound(name, &value.to_string(), kind, IndexSpecification::all())?
            }
            (None, None) => invocation.set(name, value.clone())?,
        }
    }
    if let Some(orphan) = step
        .indices
        .keys()
        .find(|name| !step.properties.contains_key(*name))
    {
        return Err(EngineError::Execution(format!(
            "Index settings given for '{orphan}' but no workspace was named for it"
        )));
    }
    Ok(invocation)
}

#[instrument(skip_all, name = "pipeline_workflow", fields(steps = steps.len()))]
pub fn run(
    registry: &WorkspaceRegistry,
    factory: &AlgorithmFactory,
    steps: &[PipelineStep],
    config: &EngineConfig,
    reporter: &ProgressReporter,
) -> Result<PipelineResult, PipelineError> {
    let started = Instant::now();
    let invocations = prepare(factory, steps)?;
    let engine = Engine::new(registry, config, reporter);

    let mut reports = Vec::with_capacity(invocations.len());
    for (i, mut invocation) in invocations.into_iter().enumerate() {
        let step = i + 1;
        reporter.report(Progress::PhaseStart {
            name: format!("Step {step}: {}", invocation.name()),
        });
        info!(step, algorithm = invocation.name(), "Running pipeline step");

        let report = invocation
            .execute(&engine)
            .map_err(|e| PipelineError::step(step, invocation.name(), e))?;
        reporter.report(Progress::PhaseFinish);
        reports.push(report);
    }

    let duration = started.elapsed();
    info!(steps = reports.len(), ?duration, "Pipeline complete.");
    Ok(PipelineResult { reports, duration })
}
