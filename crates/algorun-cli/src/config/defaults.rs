use algorun::engine::config::EngineConfig;

/// Values used when neither the command line nor the pipeline file sets them.
pub struct DefaultsConfig {
    pub record_history: bool,
    pub group_separator: char,
    pub parallel_threshold: usize,
    pub fill: f64,
    pub first_spectrum_number: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            record_history: engine.record_history,
            group_separator: engine.group_separator,
            parallel_threshold: engine.parallel_threshold,
            fill: 0.0,
            first_spectrum_number: 1,
        }
    }
}
