use super::bag::PropertyBag;
use super::error::{EngineError, GroupShape};
use super::naming::{NamingInput, OutputNaming, choose_naming, member_output_name};
use super::property::{Direction, PropertyError};
use crate::core::registry::{RegistryEntry, WorkspaceRegistry};
use serde::Serialize;
use tracing::debug;

/// Whether an invocation runs its body once or once per group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchMode {
    Direct,
    GroupFanOut,
}

/// An input property bound to an ordinary workspace group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBinding {
    pub property: String,
    pub group: String,
    pub members: Vec<String>,
}

impl GroupBinding {
    /// Member bound at `iteration`; a single-member group is broadcast to every iteration.
    pub fn member_for_iteration(&self, iteration: usize) -> &str {
        let position = if self.members.len() == 1 { 0 } else { iteration };
        self.members.get(position).map_or("", String::as_str)
    }
}

/// An output property that collects one member per iteration into a new group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputGroup {
    pub property: String,
    pub base: String,
    pub naming: OutputNaming,
}

/// The dispatch decision for one invocation, made once from the resolved properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutPlan {
    mode: DispatchMode,
    size: usize,
    separator: char,
    bindings: Vec<GroupBinding>,
    outputs: Vec<OutputGroup>,
}

impl FanOutPlan {
    pub fn direct() -> Self {
        Self {
            mode: DispatchMode::Direct,
            size: 1,
            separator: '_',
            bindings: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Number of shots the body will run.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bindings(&self) -> &[GroupBinding] {
        &self.bindings
    }

    pub fn outputs(&self) -> &[OutputGroup] {
        &self.outputs
    }

    fn naming_inputs(&self) -> Vec<NamingInput<'_>> {
        self.bindings
            .iter()
            .map(|b| NamingInput {
                group: &b.group,
                members: &b.members,
            })
            .collect()
    }

    /// Name of the workspace `output` produces at `iteration`.
    pub fn output_member_name(&self, output: &OutputGroup, iteration: usize) -> String {
        member_output_name(
            output.naming,
            &output.base,
            &self.naming_inputs(),
            iteration,
            self.separator,
        )
    }

    /// Identifies iteration `iteration` in error messages by its first bound member.
    pub fn member_label(&self, iteration: usize) -> String {
        self.bindings
            .first()
            .map(|b| b.member_for_iteration(iteration).to_string())
            .unwrap_or_else(|| format!("member {}", iteration + 1))
    }

    /// A copy of `bag` with every group replaced by its member at `iteration` and every
    /// output replaced by that iteration's output name. Scalars are left untouched.
    pub fn member_bag(
        &self,
        bag: &PropertyBag,
        iteration: usize,
    ) -> Result<PropertyBag, PropertyError> {
        let mut member = bag.clone();
        for binding in &self.bindings {
            member.substitute_workspace(&binding.property, binding.member_for_iteration(iteration))?;
        }
        for output in &self.outputs {
            member.substitute_workspace(&output.property, &self.output_member_name(output, iteration))?;
        }
        Ok(member)
    }
}

/// Decides between direct execution and group fan-out.
///
/// Any input or in-out property naming an ordinary (non-multiperiod) group selects
/// fan-out. All such groups must then have the same size `N >= 1`, or exactly one member,
/// which is broadcast; anything else is a [`EngineError::GroupSizeMismatch`] reported
/// before any member runs.
pub fn plan_fan_out(
    bag: &PropertyBag,
    registry: &WorkspaceRegistry,
    separator: char,
) -> Result<FanOutPlan, EngineError> {
    let mut bindings = Vec::new();
    for property in bag.workspace_properties() {
        if !property.direction().is_input() {
            continue;
        }
        let Some(value) = property.value() else {
            continue;
        };
        let group_name = value.to_string();
        if let RegistryEntry::Group { group, .. } = registry.lookup(&group_name)? {
            if !group.is_multiperiod() {
                bindings.push(GroupBinding {
                    property: property.name().to_string(),
                    group: group_name,
                    members: group.members().to_vec(),
                });
            }
        }
    }

    if bindings.is_empty() {
        return Ok(FanOutPlan {
            separator,
            ..FanOutPlan::direct()
        });
    }

    let size = bindings.iter().map(|b| b.members.len()).max().unwrap_or(0);
    let compatible = size > 0
        && bindings
            .iter()
            .all(|b| b.members.len() == size || b.members.len() == 1);
    if !compatible {
        return Err(EngineError::GroupSizeMismatch {
            groups: bindings
                .iter()
                .map(|b| GroupShape {
                    property: b.property.clone(),
                    group: b.group.clone(),
                    size: b.members.len(),
                })
                .collect(),
        });
    }

    let naming_inputs: Vec<_> = bindings
        .iter()
        .map(|b| NamingInput {
            group: &b.group,
            members: &b.members,
        })
        .collect();
    let outputs: Vec<_> = bag
        .workspace_properties()
        .filter(|p| p.direction() == Direction::Output)
        .filter_map(|p| {
            p.value().map(|value| {
                let base = value.to_string();
                OutputGroup {
                    property: p.name().to_string(),
                    naming: choose_naming(&base, &naming_inputs, size, separator),
                    base,
                }
            })
        })
        .collect();

    debug!(
        size,
        groups = bindings.len(),
        outputs = outputs.len(),
        "Planned group fan-out"
    );
    Ok(FanOutPlan {
        mode: DispatchMode::GroupFanOut,
        size,
        separator,
        bindings,
        outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::group::WorkspaceGroup;
    use crate::core::models::workspace::Workspace;
    use crate::engine::property::Property;

    fn add_group(registry: &WorkspaceRegistry, name: &str, members: &[&str]) {
        for member in members {
            registry
                .add_or_replace(member, Workspace::filled(*member, 1, 1, 0.0, 1))
                .unwrap();
        }
        registry
            .add_group(name, WorkspaceGroup::new(members.iter().copied()))
            .unwrap();
    }

    fn bag(lhs: &str, rhs: &str, out: &str) -> PropertyBag {
        let mut bag = PropertyBag::new();
        bag.declare(Property::workspace("LHSWorkspace", Direction::Input))
            .unwrap();
        bag.declare(Property::workspace("RHSWorkspace", Direction::Input))
            .unwrap();
        bag.declare(Property::float("Factor").with_default(2.0))
            .unwrap();
        bag.declare(Property::workspace("OutputWorkspace", Direction::Output))
            .unwrap();
        bag.set("LHSWorkspace", lhs).unwrap();
        bag.set("RHSWorkspace", rhs).unwrap();
        bag.set("OutputWorkspace", out).unwrap();
        bag
    }

    #[test]
    fn plain_workspaces_dispatch_directly() {
        let registry = WorkspaceRegistry::new();
        for name in ["a", "b"] {
            registry.add_or_replace(name, Workspace::new(name)).unwrap();
        }
        let plan = plan_fan_out(&bag("a", "b", "c"), &registry, '_').unwrap();
        assert_eq!(plan.mode(), DispatchMode::Direct);
        assert_eq!(plan.size(), 1);
    }

    #[test]
    fn multiperiod_group_is_not_broadcast() {
        let registry = WorkspaceRegistry::new();
        for name in ["p1", "p2", "b"] {
            registry.add_or_replace(name, Workspace::new(name)).unwrap();
        }
        registry
            .add_group("periods", WorkspaceGroup::multiperiod(["p1", "p2"]))
            .unwrap();
        let plan = plan_fan_out(&bag("periods", "b", "c"), &registry, '_').unwrap();
        assert_eq!(plan.mode(), DispatchMode::Direct);
    }

    #[test]
    fn equal_groups_fan_out_member_by_member() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1", "A_2", "A_3"]);
        add_group(&registry, "B", &["B_1", "B_2", "B_3"]);
        let plan = plan_fan_out(&bag("A", "B", "D"), &registry, '_').unwrap();
        assert_eq!(plan.mode(), DispatchMode::GroupFanOut);
        assert_eq!(plan.size(), 3);
        assert_eq!(plan.outputs()[0].naming, OutputNaming::NumericSuffix);

        let member = plan.member_bag(&bag("A", "B", "D"), 1).unwrap();
        assert_eq!(member.workspace_name("LHSWorkspace").unwrap(), "A_2");
        assert_eq!(member.workspace_name("RHSWorkspace").unwrap(), "B_2");
        assert_eq!(member.workspace_name("OutputWorkspace").unwrap(), "D_2");
        assert_eq!(member.float("Factor").unwrap(), 2.0);
        assert_eq!(plan.member_label(1), "A_2");
    }

    #[test]
    fn mismatched_sizes_are_rejected_with_every_shape() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1", "A_2", "A_3"]);
        add_group(&registry, "B", &["B_1", "B_2", "B_3", "B_4"]);
        let err = plan_fan_out(&bag("A", "B", "D"), &registry, '_').unwrap_err();
        let groups = match err {
            EngineError::GroupSizeMismatch { groups } => groups,
            other => panic!("expected a size mismatch, got {other}"),
        };
        let sizes: Vec<_> = groups.iter().map(|g| (g.group.as_str(), g.size)).collect();
        assert_eq!(sizes, [("A", 3), ("B", 4)]);
    }

    #[test]
    fn single_member_group_is_broadcast() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1", "A_2"]);
        add_group(&registry, "X", &["X_1"]);
        let plan = plan_fan_out(&bag("A", "X", "D"), &registry, '_').unwrap();
        assert_eq!(plan.size(), 2);

        let second = plan.member_bag(&bag("A", "X", "D"), 1).unwrap();
        assert_eq!(second.workspace_name("RHSWorkspace").unwrap(), "X_1");
        assert_eq!(second.workspace_name("OutputWorkspace").unwrap(), "D_2");
    }

    #[test]
    fn single_member_groups_pair_without_mismatch() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1"]);
        add_group(&registry, "B", &["B_1"]);
        let plan = plan_fan_out(&bag("A", "B", "D"), &registry, '_').unwrap();
        assert_eq!(plan.mode(), DispatchMode::GroupFanOut);
        assert_eq!(plan.size(), 1);
    }

    #[test]
    fn group_with_scalar_input_leaves_scalar_untouched() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1", "A_2"]);
        registry.add_or_replace("w", Workspace::new("w")).unwrap();
        let plan = plan_fan_out(&bag("A", "w", "D"), &registry, '_').unwrap();

        let member = plan.member_bag(&bag("A", "w", "D"), 0).unwrap();
        assert_eq!(member.workspace_name("RHSWorkspace").unwrap(), "w");
        assert_eq!(member.workspace_name("OutputWorkspace").unwrap(), "D_1");
    }

    #[test]
    fn empty_group_is_a_size_mismatch() {
        let registry = WorkspaceRegistry::new();
        registry.add_or_replace("w", Workspace::new("w")).unwrap();
        registry.add_group("E", WorkspaceGroup::default()).unwrap();
        let err = plan_fan_out(&bag("E", "w", "D"), &registry, '_').unwrap_err();
        assert!(matches!(err, EngineError::GroupSizeMismatch { .. }));
    }
}
