use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Group separator {0:?} must not be whitespace or a digit")]
    InvalidSeparator(char),

    #[error("Parallel threshold must be at least 1, got {0}")]
    InvalidThreshold(usize),
}

pub const DEFAULT_GROUP_SEPARATOR: char = '_';
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 64;

/// Settings shared by every invocation an [`Engine`](super::runner::Engine) runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Whether successful executions append to output histories.
    pub record_history: bool,
    /// Joins name parts when naming fan-out outputs.
    pub group_separator: char,
    /// Index loops shorter than this run sequentially.
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            record_history: true,
            group_separator: DEFAULT_GROUP_SEPARATOR,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    record_history: Option<bool>,
    group_separator: Option<char>,
    parallel_threshold: Option<usize>,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_history(mut self, enabled: bool) -> Self {
        self.record_history = Some(enabled);
        self
    }
    pub fn group_separator(mut self, separator: char) -> Self {
        self.group_separator = Some(separator);
        self
    }
    pub fn parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = Some(threshold);
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let defaults = EngineConfig::default();

        let group_separator = self.group_separator.unwrap_or(defaults.group_separator);
        if group_separator.is_whitespace() || group_separator.is_ascii_digit() {
            return Err(ConfigError::InvalidSeparator(group_separator));
        }

        let parallel_threshold = self
            .parallel_threshold
            .unwrap_or(defaults.parallel_threshold);
        if parallel_threshold == 0 {
            return Err(ConfigError::InvalidThreshold(parallel_threshold));
        }

        Ok(EngineConfig {
            record_history: self.record_history.unwrap_or(defaults.record_history),
            group_separator,
            parallel_threshold,
        })
    }
}
