use super::algorithm::Algorithm;
use super::error::EngineError;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

pub type AlgorithmConstructor = fn() -> Box<dyn Algorithm>;

/// Descriptive information about one registered algorithm version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub name: &'static str,
    pub version: u32,
    pub category: &'static str,
    pub summary: &'static str,
}

/// Creates algorithms by name and version.
#[derive(Default)]
pub struct AlgorithmFactory {
    constructors: BTreeMap<(String, u32), (Registration, AlgorithmConstructor)>,
}

impl AlgorithmFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory with every built-in algorithm registered.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        crate::algorithms::register_builtins(&mut factory);
        factory
    }

    /// Registers `constructor` under the name and version of the algorithm it builds,
    /// replacing an earlier registration of the same pair.
    pub fn subscribe(&mut self, constructor: AlgorithmConstructor) -> Registration {
        let sample = constructor();
        let registration = Registration {
            name: sample.name(),
            version: sample.version(),
            category: sample.category(),
            summary: sample.summary(),
        };
        debug!(
            name = registration.name,
            version = registration.version,
            "Subscribed algorithm"
        );
        self.constructors.insert(
            (registration.name.to_string(), registration.version),
            (registration.clone(), constructor),
        );
        registration
    }

    /// Highest registered version of `name`.
    pub fn latest_version(&self, name: &str) -> Option<u32> {
        self.constructors
            .range((name.to_string(), 0)..=(name.to_string(), u32::MAX))
            .next_back()
            .map(|((_, version), _)| *version)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.latest_version(name).is_some()
    }

    /// Creates `name` at `version`, or at its latest version when none is given.
    pub fn create(&self, name: &str, version: Option<u32>) -> Result<Box<dyn Algorithm>, EngineError> {
        let unknown = || EngineError::UnknownAlgorithm {
            name: name.to_string(),
            version,
        };
        let version = match version {
            Some(v) => v,
            None => self.latest_version(name).ok_or_else(unknown)?,
        };
        self.constructors
            .get(&(name.to_string(), version))
            .map(|(_, constructor)| constructor())
            .ok_or_else(unknown)
    }

    /// Every registration, ordered by name then version.
    pub fn registrations(&self) -> Vec<Registration> {
        self.constructors
            .values()
            .map(|(registration, _)| registration.clone())
            .collect()
    }
}
