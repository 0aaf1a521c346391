use super::error::EngineError;
use super::property::{Direction, Property, PropertyError, PropertyKind, PropertyRole, PropertyValue};
use crate::core::index::{IndexKind, IndexSet, IndexSpecification, resolve};
use crate::core::registry::{WorkspaceHandle, WorkspaceRegistry};
use std::collections::HashMap;

const INDEX_KIND_SUFFIX: &str = "IndexType";
const INDEX_LIST_SUFFIX: &str = "List";

/// Names of the three slots that make up one compound workspace property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundHandle {
    pub workspace: String,
    pub index_kind: String,
    pub indices: String,
}

impl CompoundHandle {
    fn for_name(name: &str) -> Self {
        Self {
            workspace: name.to_string(),
            index_kind: format!("{name}{INDEX_KIND_SUFFIX}"),
            indices: format!("{name}{INDEX_LIST_SUFFIX}"),
        }
    }
}

/// The ordered set of properties an algorithm declares, with their current values.
#[derive(Debug, Clone, Default)]
pub struct PropertyBag {
    properties: Vec<Property>,
    positions: HashMap<String, usize>,
    /// Every name owned by a compound property, mapped to the compound's name.
    reserved: HashMap<String, String>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    fn check_free(&self, name: &str) -> Result<(), PropertyError> {
        if let Some(owner) = self.reserved.get(name) {
            return Err(PropertyError::ReservedName {
                name: name.to_string(),
                owner: owner.clone(),
            });
        }
        if self.positions.contains_key(name) {
            return Err(PropertyError::DuplicateProperty(name.to_string()));
        }
        Ok(())
    }

    fn push(&mut self, property: Property) {
        self.positions
            .insert(property.name().to_string(), self.properties.len());
        self.properties.push(property);
    }

    pub fn declare(&mut self, property: Property) -> Result<(), PropertyError> {
        self.check_free(property.name())?;
        self.push(property);
        Ok(())
    }

    /// Declares a workspace input together with its index-kind and index-list slots.
    ///
    /// The derived names are `<name>IndexType` and `<name>List`. All three names are
    /// reserved up front, so any collision fails here rather than at execution time.
    /// The first allowed kind is the preferred one and becomes the default.
    pub fn declare_compound_workspace_input(
        &mut self,
        name: &str,
        allowed_kinds: &[IndexKind],
        doc: &str,
    ) -> Result<CompoundHandle, PropertyError> {
        let handle = CompoundHandle::for_name(name);
        let Some(&preferred) = allowed_kinds.first() else {
            return Err(PropertyError::CompoundPropertyMisuse {
                name: name.to_string(),
                reason: "at least one index kind must be allowed".to_string(),
            });
        };
        for slot in [&handle.workspace, &handle.index_kind, &handle.indices] {
            self.check_free(slot)?;
        }

        self.push(
            Property::workspace(name, Direction::Input)
                .with_doc(doc)
                .with_role(PropertyRole::CompoundWorkspace {
                    allowed_kinds: allowed_kinds.to_vec(),
                }),
        );
        self.push(Property::satellite(
            &handle.index_kind,
            PropertyKind::IndexKind,
            PropertyValue::IndexKind(preferred),
            PropertyRole::CompoundIndexKind {
                owner: name.to_string(),
            },
        ));
        self.push(Property::satellite(
            &handle.indices,
            PropertyKind::IndexSpecification,
            PropertyValue::Indices(IndexSpecification::all()),
            PropertyRole::CompoundIndices {
                owner: name.to_string(),
            },
        ));
        for slot in [&handle.workspace, &handle.index_kind, &handle.indices] {
            self.reserved.insert(slot.clone(), name.to_string());
        }
        Ok(handle)
    }

    pub fn property(&self, name: &str) -> Result<&Property, PropertyError> {
        self.positions
            .get(name)
            .map(|&i| &self.properties[i])
            .ok_or_else(|| PropertyError::UnknownProperty(name.to_string()))
    }

    fn property_mut(&mut self, name: &str) -> Result<&mut Property, PropertyError> {
        match self.positions.get(name) {
            Some(&i) => Ok(&mut self.properties[i]),
            None => Err(PropertyError::UnknownProperty(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    /// Workspace-valued properties (plain and compound) in declaration order.
    pub fn workspace_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties
            .iter()
            .filter(|p| p.kind() == PropertyKind::Workspace)
    }

    /// Sets a plain property. Slots owned by a compound property are rejected.
    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<(), PropertyError> {
        let property = self.property_mut(name)?;
        if !property.role().is_plain() {
            return Err(PropertyError::CompoundPropertyMisuse {
                name: name.to_string(),
                reason: "use the compound setter to set the workspace and its indices together"
                    .to_string(),
            });
        }
        property.assign(value.into())
    }

    /// Resets a plain property to its default.
    pub fn unset(&mut self, name: &str) -> Result<(), PropertyError> {
        self.property_mut(name)?.clear();
        Ok(())
    }

    /// Populates the dataset, index kind and index specification of a compound property
    /// in one step.
    pub fn set_compound(
        &mut self,
        name: &str,
        dataset: &str,
        kind: IndexKind,
        spec: impl Into<IndexSpecification>,
    ) -> Result<(), PropertyError> {
        let handle = self.compound(name)?;
        let PropertyRole::CompoundWorkspace { allowed_kinds } = self.property(name)?.role() else {
            return Err(PropertyError::NotCompound(name.to_string()));
        };
        if !allowed_kinds.contains(&kind) {
            return Err(PropertyError::CompoundPropertyMisuse {
                name: name.to_string(),
                reason: format!("index kind {kind} is not accepted"),
            });
        }

        let spec = spec.into();
        self.property_mut(&handle.workspace)?
            .assign(PropertyValue::Workspace(dataset.to_string()))?;
        self.property_mut(&handle.index_kind)?
            .assign(PropertyValue::IndexKind(kind))?;
        self.property_mut(&handle.indices)?
            .assign(PropertyValue::Indices(spec))
    }

    /// Slot names of a compound property, or `NotCompound`.
    pub fn compound(&self, name: &str) -> Result<CompoundHandle, PropertyError> {
        match self.property(name)?.role() {
            PropertyRole::CompoundWorkspace { .. } => Ok(CompoundHandle::for_name(name)),
            _ => Err(PropertyError::NotCompound(name.to_string())),
        }
    }

    /// The current index kind and specification of a compound property.
    pub fn index_selection(
        &self,
        name: &str,
    ) -> Result<(IndexKind, IndexSpecification), PropertyError> {
        let handle = self.compound(name)?;
        let kind = match self.value(&handle.index_kind)? {
            PropertyValue::IndexKind(kind) => *kind,
            other => return Err(self.wrong_kind(&handle.index_kind, other)),
        };
        let spec = match self.value(&handle.indices)? {
            PropertyValue::Indices(spec) => spec.clone(),
            other => return Err(self.wrong_kind(&handle.indices, other)),
        };
        Ok((kind, spec))
    }

    /// Resolves a compound property against the dataset's current shape.
    ///
    /// Resolution happens at call time, so an index specification set before the dataset
    /// was (re)loaded is checked against what the dataset holds now. This takes a short
    /// read lock on the dataset and must not be called while the caller already holds a
    /// lock on it; inside an algorithm body use
    /// [`ExecutionContext::dataset_and_indices`](super::context::ExecutionContext::dataset_and_indices).
    pub fn get_dataset_and_indices(
        &self,
        name: &str,
        registry: &WorkspaceRegistry,
    ) -> Result<(WorkspaceHandle, IndexSet), EngineError> {
        let (kind, spec) = self.index_selection(name)?;
        let handle = registry.retrieve(self.workspace_name(name)?)?;
        let indices = {
            let workspace = handle.read();
            resolve(&spec, kind, &*workspace)?
        };
        Ok((handle, indices))
    }

    /// The value of a property, explicit or default.
    pub fn value(&self, name: &str) -> Result<&PropertyValue, PropertyError> {
        self.property(name)?
            .value()
            .ok_or_else(|| PropertyError::MissingValue(name.to_string()))
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.property(name).is_ok_and(|p| p.value().is_some())
    }

    fn wrong_kind(&self, name: &str, found: &PropertyValue) -> PropertyError {
        PropertyError::WrongPropertyKind {
            name: name.to_string(),
            expected: self
                .property(name)
                .map(Property::kind)
                .unwrap_or_else(|_| found.kind()),
            found: found.kind(),
        }
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: PropertyKind,
        extract: impl FnOnce(&'a PropertyValue) -> Option<T>,
    ) -> Result<T, PropertyError> {
        let value = self.value(name)?;
        extract(value).ok_or_else(|| PropertyError::WrongPropertyKind {
            name: name.to_string(),
            expected,
            found: value.kind(),
        })
    }

    pub fn integer(&self, name: &str) -> Result<i64, PropertyError> {
        self.typed(name, PropertyKind::Integer, |v| match v {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        })
    }

    pub fn float(&self, name: &str) -> Result<f64, PropertyError> {
        self.typed(name, PropertyKind::Float, |v| match v {
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        })
    }

    pub fn text(&self, name: &str) -> Result<&str, PropertyError> {
        self.typed(name, PropertyKind::Text, |v| match v {
            PropertyValue::Text(t) => Some(t.as_str()),
            _ => None,
        })
    }

    pub fn integer_list(&self, name: &str) -> Result<&[i64], PropertyError> {
        self.typed(name, PropertyKind::IntegerList, |v| match v {
            PropertyValue::IntegerList(values) => Some(values.as_slice()),
            _ => None,
        })
    }

    pub fn workspace_name(&self, name: &str) -> Result<&str, PropertyError> {
        self.typed(name, PropertyKind::Workspace, |v| match v {
            PropertyValue::Workspace(ws) => Some(ws.as_str()),
            _ => None,
        })
    }

    /// Replaces the workspace named by a workspace property, compound or not, leaving any
    /// index settings in place. Used to bind one group member per fan-out iteration.
    pub(crate) fn substitute_workspace(
        &mut self,
        name: &str,
        workspace: &str,
    ) -> Result<(), PropertyError> {
        let property = self.property_mut(name)?;
        if property.kind() != PropertyKind::Workspace {
            return Err(PropertyError::WrongPropertyKind {
                name: name.to_string(),
                expected: property.kind(),
                found: PropertyKind::Workspace,
            });
        }
        property.assign(PropertyValue::Workspace(workspace.to_string()))
    }

    /// `(name, rendered value)` for every property holding a value, in declaration order.
    pub fn render_values(&self) -> Vec<(String, String)> {
        self.properties
            .iter()
            .filter_map(|p| p.value().map(|v| (p.name().to_string(), v.to_string())))
            .collect()
    }
}
