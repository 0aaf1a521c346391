use super::validators::Validator;
use crate::core::index::{IndexKind, IndexSpecification};
use itertools::Itertools;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("Property '{0}' is not declared")]
    UnknownProperty(String),

    #[error("Property '{0}' is already declared")]
    DuplicateProperty(String),

    #[error("Property name '{name}' is reserved by compound property '{owner}'")]
    ReservedName { name: String, owner: String },

    #[error("Property '{name}' is part of a compound property: {reason}")]
    CompoundPropertyMisuse { name: String, reason: String },

    #[error("Property '{name}' holds {expected} values, not {found}")]
    WrongPropertyKind {
        name: String,
        expected: PropertyKind,
        found: PropertyKind,
    },

    #[error("Property '{0}' is not a compound workspace property")]
    NotCompound(String),

    #[error("Property '{0}' has no value")]
    MissingValue(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Input,
    Output,
    InOut,
}

impl Direction {
    /// Input and InOut properties are read by the algorithm body.
    pub fn is_input(self) -> bool {
        matches!(self, Direction::Input | Direction::InOut)
    }

    /// Output and InOut properties are written by the algorithm body.
    pub fn is_output(self) -> bool {
        matches!(self, Direction::Output | Direction::InOut)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropertyMode {
    Mandatory,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropertyKind {
    Workspace,
    Integer,
    Float,
    Text,
    IntegerList,
    IndexKind,
    IndexSpecification,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PropertyKind::Workspace => "workspace",
            PropertyKind::Integer => "integer",
            PropertyKind::Float => "float",
            PropertyKind::Text => "text",
            PropertyKind::IntegerList => "integer list",
            PropertyKind::IndexKind => "index kind",
            PropertyKind::IndexSpecification => "index specification",
        })
    }
}

/// The value held by a property slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PropertyValue {
    /// Name of a workspace or workspace group in the registry.
    Workspace(String),
    Integer(i64),
    Float(f64),
    Text(String),
    IntegerList(Vec<i64>),
    IndexKind(IndexKind),
    Indices(IndexSpecification),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Workspace(_) => PropertyKind::Workspace,
            PropertyValue::Integer(_) => PropertyKind::Integer,
            PropertyValue::Float(_) => PropertyKind::Float,
            PropertyValue::Text(_) => PropertyKind::Text,
            PropertyValue::IntegerList(_) => PropertyKind::IntegerList,
            PropertyValue::IndexKind(_) => PropertyKind::IndexKind,
            PropertyValue::Indices(_) => PropertyKind::IndexSpecification,
        }
    }

    /// Converts `self` into a value of `kind` where the conversion is lossless.
    pub(crate) fn coerce(self, kind: PropertyKind) -> Result<Self, Self> {
        match (self, kind) {
            (value, kind) if value.kind() == kind => Ok(value),
            (PropertyValue::Text(name), PropertyKind::Workspace) => {
                Ok(PropertyValue::Workspace(name))
            }
            (PropertyValue::Integer(v), PropertyKind::Float) => Ok(PropertyValue::Float(v as f64)),
            (PropertyValue::Text(text), PropertyKind::IndexSpecification) => {
                Ok(PropertyValue::Indices(IndexSpecification::Text(text)))
            }
            (value, _) => Err(value),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Workspace(name) | PropertyValue::Text(name) => f.write_str(name),
            PropertyValue::Integer(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::IntegerList(values) => write!(f, "{}", values.iter().join(",")),
            PropertyValue::IndexKind(kind) => write!(f, "{kind}"),
            PropertyValue::Indices(spec) => write!(f, "{spec}"),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<Vec<i64>> for PropertyValue {
    fn from(value: Vec<i64>) -> Self {
        PropertyValue::IntegerList(value)
    }
}

/// How a property relates to a compound workspace property, if at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyRole {
    Plain,
    /// The dataset slot of a compound property and the index kinds it accepts,
    /// preferred kind first.
    CompoundWorkspace { allowed_kinds: Vec<IndexKind> },
    /// The index-kind satellite of the named compound property.
    CompoundIndexKind { owner: String },
    /// The index-specification satellite of the named compound property.
    CompoundIndices { owner: String },
}

impl PropertyRole {
    pub fn is_plain(&self) -> bool {
        matches!(self, PropertyRole::Plain)
    }
}

/// A declared, typed and direction-tagged slot of a [`PropertyBag`](super::bag::PropertyBag).
#[derive(Clone)]
pub struct Property {
    name: String,
    kind: PropertyKind,
    direction: Direction,
    mode: PropertyMode,
    doc: String,
    default: Option<PropertyValue>,
    value: Option<PropertyValue>,
    validators: Vec<Arc<dyn Validator>>,
    role: PropertyRole,
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .field("mode", &self.mode)
            .field("value", &self.value())
            .field("validators", &self.validators.len())
            .field("role", &self.role)
            .finish()
    }
}

impl Property {
    fn with_kind(name: impl Into<String>, kind: PropertyKind, direction: Direction) -> Self {
        Self {
            name: name.into(),
            kind,
            direction,
            mode: PropertyMode::Mandatory,
            doc: String::new(),
            default: None,
            value: None,
            validators: Vec::new(),
            role: PropertyRole::Plain,
        }
    }

    /// A mandatory slot naming a workspace (or group) in the registry.
    pub fn workspace(name: impl Into<String>, direction: Direction) -> Self {
        Self::with_kind(name, PropertyKind::Workspace, direction)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::with_kind(name, PropertyKind::Integer, Direction::Input)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::with_kind(name, PropertyKind::Float, Direction::Input)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::with_kind(name, PropertyKind::Text, Direction::Input)
    }

    pub fn integer_list(name: impl Into<String>) -> Self {
        Self::with_kind(name, PropertyKind::IntegerList, Direction::Input)
    }

    pub(crate) fn satellite(
        name: impl Into<String>,
        kind: PropertyKind,
        default: PropertyValue,
        role: PropertyRole,
    ) -> Self {
        Self {
            mode: PropertyMode::Optional,
            default: Some(default),
            role,
            ..Self::with_kind(name, kind, Direction::Input)
        }
    }

    pub fn optional(mut self) -> Self {
        self.mode = PropertyMode::Optional;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn with_default(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub(crate) fn with_role(mut self, role: PropertyRole) -> Self {
        self.role = role;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn mode(&self) -> PropertyMode {
        self.mode
    }

    pub fn is_mandatory(&self) -> bool {
        self.mode == PropertyMode::Mandatory
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn role(&self) -> &PropertyRole {
        &self.role
    }

    pub fn validators(&self) -> &[Arc<dyn Validator>] {
        &self.validators
    }

    /// The explicitly set value, or the default when nothing was set.
    pub fn value(&self) -> Option<&PropertyValue> {
        self.value.as_ref().or(self.default.as_ref())
    }

    pub fn is_default(&self) -> bool {
        self.value.is_none()
    }

    pub(crate) fn assign(&mut self, value: PropertyValue) -> Result<(), PropertyError> {
        let value = value
            .coerce(self.kind)
            .map_err(|rejected| PropertyError::WrongPropertyKind {
                name: self.name.clone(),
                expected: self.kind,
                found: rejected.kind(),
            })?;
        self.value = Some(value);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_accepted_as_workspace_name() {
        let mut prop = Property::workspace("InputWorkspace", Direction::Input);
        prop.assign("ws0".into()).unwrap();
        assert_eq!(prop.value(), Some(&PropertyValue::Workspace("ws0".into())));
    }

    #[test]
    fn integer_is_widened_for_float_slots() {
        let mut prop = Property::float("Factor");
        prop.assign(3_i64.into()).unwrap();
        assert_eq!(prop.value(), Some(&PropertyValue::Float(3.0)));
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let mut prop = Property::integer("NumberOfSpectra");
        let err = prop.assign("ten".into()).unwrap_err();
        assert_eq!(
            err,
            PropertyError::WrongPropertyKind {
                name: "NumberOfSpectra".into(),
                expected: PropertyKind::Integer,
                found: PropertyKind::Text,
            }
        );
        assert!(prop.value().is_none());
    }

    #[test]
    fn default_is_reported_until_overridden() {
        let mut prop = Property::float("Fill").with_default(0.5);
        assert!(prop.is_default());
        assert_eq!(prop.value(), Some(&PropertyValue::Float(0.5)));

        prop.assign(2.0.into()).unwrap();
        assert!(!prop.is_default());
        prop.clear();
        assert_eq!(prop.value(), Some(&PropertyValue::Float(0.5)));
    }

    #[test]
    fn directions_classify_reads_and_writes() {
        assert!(Direction::Input.is_input() && !Direction::Input.is_output());
        assert!(!Direction::Output.is_input() && Direction::Output.is_output());
        assert!(Direction::InOut.is_input() && Direction::InOut.is_output());
    }

    #[test]
    fn values_render_for_history() {
        assert_eq!(PropertyValue::IntegerList(vec![1, 2, 3]).to_string(), "1,2,3");
        assert_eq!(PropertyValue::Float(1.5).to_string(), "1.5");
        assert_eq!(
            PropertyValue::IndexKind(IndexKind::SpectrumNumber).to_string(),
            "SpectrumNumber"
        );
    }
}
