use super::models::group::WorkspaceGroup;
use super::models::ids::WorkspaceId;
use super::models::workspace::Workspace;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use slotmap::SlotMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// The shared, lockable cell a workspace lives in.
pub type SharedWorkspace = Arc<RwLock<Workspace>>;

/// Owned read guard on a workspace cell, independent of any borrow of the handle.
pub type WorkspaceReadGuard = ArcRwLockReadGuard<RawRwLock, Workspace>;
/// Owned write guard on a workspace cell, independent of any borrow of the handle.
pub type WorkspaceWriteGuard = ArcRwLockWriteGuard<RawRwLock, Workspace>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Workspace '{0}' does not exist")]
    NotFound(String),

    #[error("'{0}' is a workspace group, not a workspace")]
    NotAWorkspace(String),

    #[error("'{0}' is a workspace, not a workspace group")]
    NotAGroup(String),

    #[error("Group '{group}' lists member '{member}', which does not exist")]
    MissingMember { group: String, member: String },

    #[error("Group '{group}' cannot contain the group '{member}'")]
    NestedGroup { group: String, member: String },

    #[error("Registry names must not be empty")]
    EmptyName,
}

/// A caller's view of a registered workspace.
///
/// Cloning or dropping a handle never touches the registry entry; removing the entry
/// from the registry leaves outstanding handles usable.
#[derive(Debug, Clone)]
pub struct WorkspaceHandle {
    id: WorkspaceId,
    name: String,
    cell: SharedWorkspace,
}

impl WorkspaceHandle {
    pub fn id(&self) -> WorkspaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until shared access is available.
    pub fn read(&self) -> RwLockReadGuard<'_, Workspace> {
        self.cell.read()
    }

    /// Blocks until exclusive access is available.
    pub fn write(&self) -> RwLockWriteGuard<'_, Workspace> {
        self.cell.write()
    }

    pub fn read_owned(&self) -> WorkspaceReadGuard {
        self.cell.read_arc()
    }

    pub fn write_owned(&self) -> WorkspaceWriteGuard {
        self.cell.write_arc()
    }

    pub fn try_write_owned(&self) -> Option<WorkspaceWriteGuard> {
        self.cell.try_write_arc()
    }

    /// Number of live references to the underlying cell, the registry's included.
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.cell)
    }

    /// True if both handles view the same cell.
    pub fn ptr_eq(&self, other: &WorkspaceHandle) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

/// What a registry name resolves to.
#[derive(Debug, Clone)]
pub enum RegistryEntry {
    Workspace(WorkspaceHandle),
    Group { name: String, group: WorkspaceGroup },
}

impl RegistryEntry {
    pub fn name(&self) -> &str {
        match self {
            RegistryEntry::Workspace(handle) => handle.name(),
            RegistryEntry::Group { name, .. } => name,
        }
    }

    pub fn as_group(&self) -> Option<&WorkspaceGroup> {
        match self {
            RegistryEntry::Group { group, .. } => Some(group),
            RegistryEntry::Workspace(_) => None,
        }
    }
}

#[derive(Debug)]
enum Slot {
    Workspace(SharedWorkspace),
    Group(WorkspaceGroup),
}

#[derive(Debug)]
struct Stored {
    name: String,
    slot: Slot,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: SlotMap<WorkspaceId, Stored>,
    names: BTreeMap<String, WorkspaceId>,
}

impl RegistryInner {
    fn get(&self, name: &str) -> Result<(WorkspaceId, &Stored), RegistryError> {
        self.names
            .get(name)
            .and_then(|&id| self.entries.get(id).map(|stored| (id, stored)))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn entry(&self, id: WorkspaceId, stored: &Stored) -> RegistryEntry {
        match &stored.slot {
            Slot::Workspace(cell) => RegistryEntry::Workspace(WorkspaceHandle {
                id,
                name: stored.name.clone(),
                cell: Arc::clone(cell),
            }),
            Slot::Group(group) => RegistryEntry::Group {
                name: stored.name.clone(),
                group: group.clone(),
            },
        }
    }

    fn remove(&mut self, name: &str) -> Option<Stored> {
        let id = self.names.remove(name)?;
        let stored = self.entries.remove(id)?;
        if matches!(stored.slot, Slot::Workspace(_)) {
            for other in self.entries.values_mut() {
                if let Slot::Group(group) = &mut other.slot {
                    group.remove_member(name);
                }
            }
        }
        Some(stored)
    }

    fn insert(&mut self, name: &str, slot: Slot) -> WorkspaceId {
        let id = self.entries.insert(Stored {
            name: name.to_string(),
            slot,
        });
        self.names.insert(name.to_string(), id);
        id
    }
}

/// Process-wide store mapping names to workspaces and workspace groups.
///
/// Entries live in a slot-map arena; every method takes `&self` and holds the internal
/// lock only for the duration of the call, never while a workspace cell is locked.
#[derive(Debug, Default)]
pub struct WorkspaceRegistry {
    inner: RwLock<RegistryInner>,
}

impl WorkspaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.inner.read().names.contains_key(name)
    }

    /// Resolves a name to either a workspace handle or a copy of a group.
    pub fn lookup(&self, name: &str) -> Result<RegistryEntry, RegistryError> {
        let inner = self.inner.read();
        let (id, stored) = inner.get(name)?;
        Ok(inner.entry(id, stored))
    }

    pub fn retrieve(&self, name: &str) -> Result<WorkspaceHandle, RegistryError> {
        match self.lookup(name)? {
            RegistryEntry::Workspace(handle) => Ok(handle),
            RegistryEntry::Group { .. } => Err(RegistryError::NotAWorkspace(name.to_string())),
        }
    }

    pub fn retrieve_group(&self, name: &str) -> Result<WorkspaceGroup, RegistryError> {
        match self.lookup(name)? {
            RegistryEntry::Group { group, .. } => Ok(group),
            RegistryEntry::Workspace(_) => Err(RegistryError::NotAGroup(name.to_string())),
        }
    }

    /// Registers `workspace` under `name`, replacing whatever was registered there.
    ///
    /// A replaced workspace keeps its group memberships; a replaced group is dropped.
    pub fn add_or_replace(
        &self,
        name: &str,
        workspace: Workspace,
    ) -> Result<WorkspaceHandle, RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let cell: SharedWorkspace = Arc::new(RwLock::new(workspace));
        let mut inner = self.inner.write();

        let previous = inner.names.remove(name);
        let replaced = previous.and_then(|id| inner.entries.remove(id)).is_some();
        let id = inner.insert(name, Slot::Workspace(Arc::clone(&cell)));
        debug!(name, replaced, "Registered workspace");

        Ok(WorkspaceHandle {
            id,
            name: name.to_string(),
            cell,
        })
    }

    /// Registers a group after checking that every member is a registered workspace.
    pub fn add_group(&self, name: &str, group: WorkspaceGroup) -> Result<(), RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let mut inner = self.inner.write();

        for member in group.members() {
            if member == name {
                return Err(RegistryError::NestedGroup {
                    group: name.to_string(),
                    member: member.clone(),
                });
            }
            match inner.get(member) {
                Ok((_, Stored { slot: Slot::Workspace(_), .. })) => {}
                Ok(_) => {
                    return Err(RegistryError::NestedGroup {
                        group: name.to_string(),
                        member: member.clone(),
                    });
                }
                Err(_) => {
                    return Err(RegistryError::MissingMember {
                        group: name.to_string(),
                        member: member.clone(),
                    });
                }
            }
        }

        inner.remove(name);
        debug!(name, members = group.len(), "Registered workspace group");
        inner.insert(name, Slot::Group(group));
        Ok(())
    }

    /// Removes an entry. A removed workspace is also dropped from every group listing it.
    pub fn remove(&self, name: &str) -> Result<RegistryEntry, RegistryError> {
        let mut inner = self.inner.write();
        let (id, stored) = inner.get(name)?;
        let entry = inner.entry(id, stored);
        inner.remove(name);
        debug!(name, "Removed registry entry");
        Ok(entry)
    }

    pub fn all_names(&self) -> BTreeSet<String> {
        self.inner.read().names.keys().cloned().collect()
    }

    /// Every entry in name order.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        let inner = self.inner.read();
        inner
            .names
            .values()
            .filter_map(|&id| inner.entries.get(id).map(|stored| inner.entry(id, stored)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}
