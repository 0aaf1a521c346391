use super::config::ConfigError;
use super::property::PropertyError;
use super::state::ExecutionState;
use crate::core::index::IndexError;
use crate::core::registry::RegistryError;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The size of one group that took part in a fan-out decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupShape {
    pub property: String,
    pub group: String,
    pub size: usize,
}

impl fmt::Display for GroupShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' ({} members, property {})",
            self.group, self.size, self.property
        )
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Property name to message, for every property that failed validation.
    #[error("Invalid properties: {}", .0.iter().map(|(k, v)| format!("{k}: {v}")).join("; "))]
    ValidationFailure(BTreeMap<String, String>),

    #[error(
        "Workspace groups must all have the same size or exactly one member: {}",
        .groups.iter().join(", ")
    )]
    GroupSizeMismatch { groups: Vec<GroupShape> },

    #[error("[{member}, group member {}] {source}", .index + 1)]
    MemberExecutionFailure {
        index: usize,
        member: String,
        source: Box<EngineError>,
    },

    #[error("Cannot {action} an algorithm in state {state}")]
    InvalidState {
        action: &'static str,
        state: ExecutionState,
    },

    #[error("Workspace '{workspace}' {reason}")]
    LockViolation {
        workspace: String,
        reason: &'static str,
    },

    #[error("{0}")]
    Execution(String),

    #[error("Algorithm panicked: {0}")]
    Panicked(String),

    #[error("Unknown algorithm '{name}'{}", .version.map(|v| format!(" version {v}")).unwrap_or_default())]
    UnknownAlgorithm { name: String, version: Option<u32> },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The innermost error, looking through fan-out member wrappers.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::MemberExecutionFailure { source, .. } => source.root(),
            other => other,
        }
    }
}
