use super::algorithm::Algorithm;
use super::bag::PropertyBag;
use super::error::EngineError;
use super::group::{DispatchMode, FanOutPlan, plan_fan_out};
use super::property::{Property, PropertyKind, PropertyValue};
use super::validators::ValidationTarget;
use crate::core::registry::{RegistryEntry, WorkspaceHandle, WorkspaceRegistry};
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::debug;

/// Checks an invocation before it may run and returns its dispatch plan.
///
/// Every problem is collected into one property-name to message map so a caller can
/// report all of them at once. No workspace lock is held when this returns; validators
/// take short read locks one workspace at a time.
pub(crate) fn validate(
    algorithm: &dyn Algorithm,
    bag: &PropertyBag,
    registry: &WorkspaceRegistry,
    separator: char,
) -> Result<FanOutPlan, EngineError> {
    let failures = check_properties(bag, registry);
    if !failures.is_empty() {
        debug!(count = failures.len(), "Property validation failed");
        return Err(EngineError::ValidationFailure(failures));
    }

    let plan = plan_fan_out(bag, registry, separator)?;

    let mut failures = BTreeMap::new();
    match plan.mode() {
        DispatchMode::Direct => failures = algorithm.validate_inputs(bag, registry),
        DispatchMode::GroupFanOut => {
            for iteration in 0..plan.size() {
                let member_bag = plan.member_bag(bag, iteration)?;
                let label = plan.member_label(iteration);
                for (property, message) in algorithm.validate_inputs(&member_bag, registry) {
                    failures
                        .entry(property)
                        .or_insert_with(|| format!("[{label}] {message}"));
                }
            }
        }
    }
    if !failures.is_empty() {
        debug!(count = failures.len(), "Cross-property validation failed");
        return Err(EngineError::ValidationFailure(failures));
    }
    Ok(plan)
}

fn check_properties(bag: &PropertyBag, registry: &WorkspaceRegistry) -> BTreeMap<String, String> {
    let mut failures = BTreeMap::new();
    for property in bag.properties() {
        let Some(value) = property.value() else {
            if property.is_mandatory() {
                failures.insert(
                    property.name().to_string(),
                    "Mandatory property is not set".to_string(),
                );
            }
            continue;
        };
        if let Some(message) = check_value(property, value, registry) {
            failures.insert(property.name().to_string(), message);
        }
    }
    failures
}

fn check_value(
    property: &Property,
    value: &PropertyValue,
    registry: &WorkspaceRegistry,
) -> Option<String> {
    match (property.kind(), value) {
        (PropertyKind::Workspace, PropertyValue::Workspace(name)) => {
            if !property.direction().is_input() {
                return None;
            }
            let members = match registry.lookup(name) {
                Ok(RegistryEntry::Workspace(handle)) => vec![handle],
                Ok(RegistryEntry::Group { group, .. }) => {
                    match group
                        .members()
                        .iter()
                        .map(|m| registry.retrieve(m))
                        .collect::<Result<Vec<_>, _>>()
                    {
                        Ok(handles) => handles,
                        Err(err) => return Some(err.to_string()),
                    }
                }
                Err(err) => return Some(err.to_string()),
            };
            check_workspaces(property, &members)
        }
        (PropertyKind::IndexSpecification, PropertyValue::Indices(spec)) => {
            spec.tokens().err().map(|err| err.to_string())
        }
        _ => property
            .validators()
            .iter()
            .find_map(|v| v.check(ValidationTarget::Value(value))),
    }
}

fn check_workspaces(property: &Property, members: &[WorkspaceHandle]) -> Option<String> {
    if property.validators().is_empty() {
        return None;
    }
    let messages: Vec<String> = members
        .iter()
        .filter_map(|handle| {
            let workspace = handle.read();
            property.validators().iter().find_map(|v| {
                v.check(ValidationTarget::Workspace {
                    name: handle.name(),
                    workspace: &workspace,
                })
            })
        })
        .collect();
    (!messages.is_empty()).then(|| messages.iter().join("; "))
}
