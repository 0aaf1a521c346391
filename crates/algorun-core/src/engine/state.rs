use super::group::DispatchMode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Lifecycle position of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionState {
    Uninitialized,
    Initialized,
    Running,
    Finished,
    Failed,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Uninitialized => "Uninitialized",
            ExecutionState::Initialized => "Initialized",
            ExecutionState::Running => "Running",
            ExecutionState::Finished => "Finished",
            ExecutionState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Outcome of the most recent execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultState {
    NotFinished,
    Success,
    Failed,
}

/// Summary of a successful execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub algorithm: String,
    pub version: u32,
    pub mode: DispatchMode,
    /// Number of times the algorithm body ran.
    pub shots: usize,
    /// Output property name to the workspace or group it produced.
    pub outputs: BTreeMap<String, String>,
    pub duration: Duration,
}
