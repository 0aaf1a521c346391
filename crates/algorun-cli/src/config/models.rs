use algorun::engine::config::EngineConfig;
use algorun::workflows::pipeline::PipelineStep;

/// A workspace created in the registry before the first step runs.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSeed {
    pub name: String,
    pub title: String,
    pub spectra: usize,
    pub bins: usize,
    pub fill: f64,
    pub first_spectrum_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSeed {
    pub name: String,
    pub members: Vec<String>,
    pub multiperiod: bool,
}

#[derive(Debug)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub workspaces: Vec<WorkspaceSeed>,
    pub groups: Vec<GroupSeed>,
    pub steps: Vec<PipelineStep>,
}
