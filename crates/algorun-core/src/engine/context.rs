use super::bag::PropertyBag;
use super::config::EngineConfig;
use super::error::EngineError;
use super::lock::LockSet;
use super::progress::ProgressReporter;
use crate::core::index::{IndexSet, resolve};
use crate::core::models::workspace::Workspace;
use std::collections::BTreeMap;

/// Everything an algorithm body can touch during one shot.
///
/// Workspace data is reached only through the locks held for the shot; the context never
/// exposes the registry, so a body cannot lock a workspace a second time.
pub struct ExecutionContext<'a> {
    bag: &'a PropertyBag,
    locks: &'a mut LockSet,
    reporter: &'a ProgressReporter<'a>,
    config: &'a EngineConfig,
    outputs: BTreeMap<String, Workspace>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        bag: &'a PropertyBag,
        locks: &'a mut LockSet,
        reporter: &'a ProgressReporter<'a>,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            bag,
            locks,
            reporter,
            config,
            outputs: BTreeMap::new(),
        }
    }

    /// The property values bound for this shot.
    pub fn bag(&self) -> &'a PropertyBag {
        self.bag
    }

    pub fn reporter(&self) -> &'a ProgressReporter<'a> {
        self.reporter
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    pub fn integer(&self, name: &str) -> Result<i64, EngineError> {
        Ok(self.bag.integer(name)?)
    }

    pub fn float(&self, name: &str) -> Result<f64, EngineError> {
        Ok(self.bag.float(name)?)
    }

    pub fn text(&self, name: &str) -> Result<&'a str, EngineError> {
        Ok(self.bag.text(name)?)
    }

    /// Read access to the workspace bound to `property`.
    pub fn workspace(&self, property: &str) -> Result<&Workspace, EngineError> {
        let name = self.bag.workspace_name(property)?;
        self.locks.read(name)
    }

    /// Read access to every workspace behind `property`.
    ///
    /// A multiperiod group yields its members in group order; a single workspace yields
    /// itself.
    pub fn workspaces(&self, property: &str) -> Result<Vec<&Workspace>, EngineError> {
        let name = self.bag.workspace_name(property)?;
        self.locks.read_all(name)
    }

    /// Write access to every workspace behind `property`, members of a multiperiod group
    /// in group order.
    pub fn workspaces_mut(&mut self, property: &str) -> Result<Vec<&mut Workspace>, EngineError> {
        let bag = self.bag;
        self.locks.write_all(bag.workspace_name(property)?)
    }

    /// Write access to the workspace bound to `property`.
    ///
    /// If the body already staged a fresh output for `property`, that workspace is
    /// returned instead.
    pub fn workspace_mut(&mut self, property: &str) -> Result<&mut Workspace, EngineError> {
        let bag = self.bag;
        if let Some(staged) = self.outputs.get_mut(property) {
            return Ok(staged);
        }
        self.locks.write(bag.workspace_name(property)?)
    }

    /// Resolves the indices of a compound property against its workspace as it is now.
    pub fn indices(&self, property: &str) -> Result<IndexSet, EngineError> {
        let (kind, spec) = self.bag.index_selection(property)?;
        Ok(resolve(&spec, kind, self.workspace(property)?)?)
    }

    pub fn dataset_and_indices(
        &self,
        property: &str,
    ) -> Result<(&Workspace, IndexSet), EngineError> {
        let indices = self.indices(property)?;
        Ok((self.workspace(property)?, indices))
    }

    fn ensure_output(&self, property: &str) -> Result<(), EngineError> {
        let prop = self.bag.property(property)?;
        if prop.direction().is_output() {
            Ok(())
        } else {
            Err(EngineError::Execution(format!(
                "Property '{property}' is not an output"
            )))
        }
    }

    /// Stages a newly built workspace as the value of an output property.
    ///
    /// The workspace is registered under the output's name once the body succeeds. When
    /// that name is also an input, the staged data replaces the input's data in place and
    /// keeps its history.
    pub fn set_output(&mut self, property: &str, workspace: Workspace) -> Result<(), EngineError> {
        self.ensure_output(property)?;
        self.outputs.insert(property.to_string(), workspace);
        Ok(())
    }

    /// The workspace to write `output` into, starting from the data of `input`.
    ///
    /// When both properties name the same workspace this is the input itself, modified in
    /// place. Otherwise the input is copied and the copy is staged as the output.
    pub fn output_from_input(
        &mut self,
        output: &str,
        input: &str,
    ) -> Result<&mut Workspace, EngineError> {
        self.ensure_output(output)?;
        let bag = self.bag;
        let output_name = bag.workspace_name(output)?;
        let input_name = bag.workspace_name(input)?;

        if output_name == input_name {
            self.outputs.remove(output);
            return self.locks.write(output_name);
        }

        let copy = self.locks.read(input_name)?.clone();
        let slot = self
            .outputs
            .entry(output.to_string())
            .or_insert_with(Workspace::default);
        *slot = copy;
        Ok(slot)
    }

    pub(crate) fn into_outputs(self) -> BTreeMap<String, Workspace> {
        self.outputs
    }
}
