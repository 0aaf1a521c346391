use crate::error::{CliError, Result};
use algorun::core::index::{IndexKind, IndexSpecification};
use algorun::engine::property::PropertyValue;
use algorun::workflows::pipeline::{CompoundIndices, PipelineStep};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub engine: Option<FileEngineConfig>,
    #[serde(default)]
    pub workspaces: Vec<FileWorkspace>,
    #[serde(default)]
    pub groups: Vec<FileGroup>,
    #[serde(default)]
    pub steps: Vec<FileStep>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileEngineConfig {
    pub record_history: Option<bool>,
    pub group_separator: Option<char>,
    pub parallel_threshold: Option<usize>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileWorkspace {
    pub name: String,
    pub spectra: usize,
    pub bins: usize,
    pub fill: Option<f64>,
    pub first_spectrum_number: Option<u64>,
    pub title: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileGroup {
    pub name: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub multiperiod: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileStep {
    pub algorithm: String,
    pub version: Option<u32>,
    #[serde(default)]
    pub properties: BTreeMap<String, FileValue>,
    #[serde(default)]
    pub indices: BTreeMap<String, FileIndices>,
}

/// A property value as written in TOML. Integers win over floats, so `2` is an integer
/// and `2.0` a float; the engine widens integers where a float is declared.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FileValue {
    Integer(i64),
    Float(f64),
    Text(String),
    IntegerList(Vec<i64>),
}

impl From<FileValue> for PropertyValue {
    fn from(value: FileValue) -> Self {
        match value {
            FileValue::Integer(v) => PropertyValue::Integer(v),
            FileValue::Float(v) => PropertyValue::Float(v),
            FileValue::Text(v) => PropertyValue::Text(v),
            FileValue::IntegerList(v) => PropertyValue::IntegerList(v),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileIndices {
    pub kind: String,
    #[serde(default = "FileIndexSpec::all")]
    pub spec: FileIndexSpec,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FileIndexSpec {
    Text(String),
    List(Vec<u64>),
}

impl FileIndexSpec {
    fn all() -> Self {
        FileIndexSpec::Text(String::new())
    }
}

impl From<FileIndexSpec> for IndexSpecification {
    fn from(spec: FileIndexSpec) -> Self {
        match spec {
            FileIndexSpec::Text(text) => IndexSpecification::Text(text),
            FileIndexSpec::List(values) => IndexSpecification::List(values),
        }
    }
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading pipeline from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}

impl FileStep {
    /// Converts into an engine step; the index kind is the only field checked here.
    pub fn into_step(self, number: usize) -> Result<PipelineStep> {
        let mut indices = BTreeMap::new();
        for (name, entry) in self.indices {
            let kind: IndexKind = entry.kind.parse().map_err(|e| {
                CliError::Config(format!("Step {number}, property '{name}': {e}"))
            })?;
            indices.insert(
                name,
                CompoundIndices {
                    kind,
                    spec: entry.spec.into(),
                },
            );
        }
        Ok(PipelineStep {
            algorithm: self.algorithm,
            version: self.version,
            properties: self
                .properties
                .into_iter()
                .map(|(name, value)| (name, value.into()))
                .collect(),
            indices,
        })
    }
}
