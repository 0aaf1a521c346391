use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// A single entry in a workspace's provenance log.
///
/// Records are created once per successful algorithm execution and never modified
/// after they have been appended to a [`WorkspaceHistory`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationRecord {
    /// Name of the algorithm that ran.
    pub name: String,
    /// Version of the algorithm that ran.
    pub version: u32,
    /// Unique identifier of the execution that produced this record.
    pub invocation_id: Uuid,
    /// UTC time at which the execution started.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time spent in the execution.
    pub duration: Duration,
    /// Rendered property values in declaration order.
    pub properties: Vec<(String, String)>,
}

impl InvocationRecord {
    /// Creates a record stamped with a fresh invocation id and the current time.
    pub fn new(name: impl Into<String>, version: u32, properties: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            version,
            invocation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            duration: Duration::ZERO,
            properties,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Looks up the rendered value of a property captured in this record.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Append-only, ordered log of the invocations that produced a workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkspaceHistory {
    records: Vec<InvocationRecord>,
}

impl WorkspaceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[InvocationRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&InvocationRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InvocationRecord> {
        self.records.iter()
    }

    /// Appends a record at the end of the log.
    pub fn push(&mut self, record: InvocationRecord) {
        self.records.push(record);
    }

    /// Appends every record of `other`, preserving its order.
    pub fn extend_from(&mut self, other: &WorkspaceHistory) {
        self.records.extend(other.records.iter().cloned());
    }
}
