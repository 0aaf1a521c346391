use super::bag::PropertyBag;
use super::error::EngineError;
use crate::core::models::ids::WorkspaceId;
use crate::core::models::workspace::Workspace;
use crate::core::registry::{
    RegistryEntry, RegistryError, WorkspaceHandle, WorkspaceReadGuard, WorkspaceRegistry,
    WorkspaceWriteGuard,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::trace;

/// Access an invocation needs on one workspace. `Write` dominates `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AccessLevel {
    Read,
    Write,
}

/// One entry of a [`LockPlan`].
#[derive(Debug, Clone)]
pub struct LockRequest {
    handle: WorkspaceHandle,
    level: AccessLevel,
}

impl LockRequest {
    pub fn id(&self) -> WorkspaceId {
        self.handle.id()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn level(&self) -> AccessLevel {
        self.level
    }
}

/// The deduplicated set of locks one invocation needs, in acquisition order.
///
/// Each workspace identity appears once, at the highest level any property requires.
/// Requests are ordered by [`WorkspaceId`], a total order every invocation shares, so two
/// invocations acquiring overlapping plans can never wait on each other in a cycle.
#[derive(Debug, Clone, Default)]
pub struct LockPlan {
    requests: BTreeMap<WorkspaceId, LockRequest>,
    groups: BTreeMap<String, Vec<String>>,
}

impl LockPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a request, merging it with any existing request for the same identity.
    pub fn request(&mut self, handle: WorkspaceHandle, level: AccessLevel) {
        self.requests
            .entry(handle.id())
            .and_modify(|existing| existing.level = existing.level.max(level))
            .or_insert(LockRequest { handle, level });
    }

    /// Builds the plan for every workspace-valued property of `bag`.
    ///
    /// Inputs request `Read`, outputs and in-out properties request `Write`. Outputs that
    /// do not exist yet request nothing. A multiperiod group requests every member at the
    /// property's level and is remembered so the held set can resolve the group name to
    /// its members. An ordinary group cannot be locked as a whole and is an error here,
    /// since fan-out replaces it with one member per shot.
    pub fn for_bag(bag: &PropertyBag, registry: &WorkspaceRegistry) -> Result<Self, EngineError> {
        let mut plan = Self::new();
        for property in bag.workspace_properties() {
            let Some(value) = property.value() else {
                continue;
            };
            let name = value.to_string();
            let level = if property.direction().is_output() {
                AccessLevel::Write
            } else {
                AccessLevel::Read
            };

            match registry.lookup(&name) {
                Ok(RegistryEntry::Workspace(handle)) => plan.request(handle, level),
                Ok(RegistryEntry::Group { group, .. }) if group.is_multiperiod() => {
                    for member in group.members() {
                        plan.request(registry.retrieve(member)?, level);
                    }
                    plan.groups.insert(name, group.members().to_vec());
                }
                Ok(RegistryEntry::Group { .. }) if !property.direction().is_input() => {}
                Ok(RegistryEntry::Group { .. }) => {
                    return Err(EngineError::Internal(format!(
                        "property '{}' is bound to the ordinary group '{}' inside a single shot",
                        property.name(),
                        name
                    )));
                }
                Err(RegistryError::NotFound(_)) if !property.direction().is_input() => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(plan)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Requests in acquisition order.
    pub fn requests(&self) -> impl Iterator<Item = &LockRequest> {
        self.requests.values()
    }

    pub fn level_of(&self, name: &str) -> Option<AccessLevel> {
        self.requests()
            .find(|r| r.name() == name)
            .map(LockRequest::level)
    }

    /// Members of a multiperiod group the plan locks, in group order.
    pub fn members_of(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// Blocks until every lock in the plan is held.
    pub fn acquire(self) -> LockSet {
        let mut held = Vec::with_capacity(self.requests.len());
        for (id, request) in self.requests {
            trace!(workspace = request.name(), level = ?request.level, "Acquiring lock");
            let guard = match request.level {
                AccessLevel::Read => HeldGuard::Read(request.handle.read_owned()),
                AccessLevel::Write => HeldGuard::Write(request.handle.write_owned()),
            };
            held.push(HeldLock {
                id,
                name: request.handle.name().to_string(),
                guard,
            });
        }
        LockSet {
            held,
            groups: self.groups,
        }
    }
}

enum HeldGuard {
    Read(WorkspaceReadGuard),
    Write(WorkspaceWriteGuard),
}

struct HeldLock {
    id: WorkspaceId,
    name: String,
    guard: HeldGuard,
}

/// The locks held for one shot. Workspace data is reachable only through this set.
///
/// Every lock is released exactly once when the set is dropped, in reverse acquisition
/// order, whether the body returned normally, failed or panicked.
pub struct LockSet {
    held: Vec<HeldLock>,
    groups: BTreeMap<String, Vec<String>>,
}

impl LockSet {
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    fn find(&self, name: &str) -> Option<&HeldLock> {
        self.held.iter().find(|h| h.name == name)
    }

    /// Members of a locked multiperiod group, in group order.
    pub fn members(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    pub fn id_of(&self, name: &str) -> Option<WorkspaceId> {
        self.find(name).map(|h| h.id)
    }

    pub fn level_of(&self, name: &str) -> Option<AccessLevel> {
        self.find(name).map(|h| match h.guard {
            HeldGuard::Read(_) => AccessLevel::Read,
            HeldGuard::Write(_) => AccessLevel::Write,
        })
    }

    pub fn read(&self, name: &str) -> Result<&Workspace, EngineError> {
        match self.find(name) {
            Some(HeldLock {
                guard: HeldGuard::Read(guard),
                ..
            }) => Ok(&**guard),
            Some(HeldLock {
                guard: HeldGuard::Write(guard),
                ..
            }) => Ok(&**guard),
            None => Err(self.missing(name)),
        }
    }

    fn missing(&self, name: &str) -> EngineError {
        EngineError::LockViolation {
            workspace: name.to_string(),
            reason: if self.groups.contains_key(name) {
                "is a multiperiod group and is reached through its members"
            } else {
                "is not locked by this invocation"
            },
        }
    }

    /// Read access to `name`: the workspace itself, or every member of a multiperiod
    /// group in group order.
    pub fn read_all(&self, name: &str) -> Result<Vec<&Workspace>, EngineError> {
        match self.members(name) {
            Some(members) => members.iter().map(|m| self.read(m)).collect(),
            None => Ok(vec![self.read(name)?]),
        }
    }

    /// Write access to `name`: the workspace itself, or every member of a multiperiod
    /// group in group order.
    pub fn write_all(&mut self, name: &str) -> Result<Vec<&mut Workspace>, EngineError> {
        let Some(members) = self.groups.get(name) else {
            return Ok(vec![self.write(name)?]);
        };
        let mut by_name: BTreeMap<&str, &mut Workspace> = BTreeMap::new();
        for lock in self.held.iter_mut() {
            if !members.contains(&lock.name) {
                continue;
            }
            match &mut lock.guard {
                HeldGuard::Write(guard) => {
                    by_name.insert(lock.name.as_str(), &mut **guard);
                }
                HeldGuard::Read(_) => {
                    return Err(EngineError::LockViolation {
                        workspace: lock.name.clone(),
                        reason: "is only locked for reading",
                    });
                }
            }
        }
        members
            .iter()
            .map(|member| {
                by_name
                    .remove(member.as_str())
                    .ok_or_else(|| EngineError::LockViolation {
                        workspace: member.clone(),
                        reason: "is not locked by this invocation",
                    })
            })
            .collect()
    }

    pub fn write(&mut self, name: &str) -> Result<&mut Workspace, EngineError> {
        let Some(position) = self.held.iter().position(|h| h.name == name) else {
            return Err(self.missing(name));
        };
        match &mut self.held[position].guard {
            HeldGuard::Write(guard) => Ok(&mut **guard),
            HeldGuard::Read(_) => Err(EngineError::LockViolation {
                workspace: name.to_string(),
                reason: "is only locked for reading",
            }),
        }
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some(lock) = self.held.pop() {
            trace!(workspace = lock.name.as_str(), "Releasing lock");
            drop(lock);
        }
    }
}

/// Computes the lock plan for `bag`, acquires it and runs `body` with the held set.
///
/// The locks are released before this function returns or unwinds.
pub fn with_locks<T, F>(
    bag: &PropertyBag,
    registry: &WorkspaceRegistry,
    body: F,
) -> Result<T, EngineError>
where
    F: FnOnce(&mut LockSet) -> Result<T, EngineError>,
{
    let plan = LockPlan::for_bag(bag, registry)?;
    let mut locks = plan.acquire();
    body(&mut locks)
}
