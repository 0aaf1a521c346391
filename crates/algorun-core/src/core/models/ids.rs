use slotmap::new_key_type;

new_key_type! {
    /// Stable identity of a registry entry (a workspace or a workspace group).
    ///
    /// Keys order by insertion slot, which gives the lock coordinator a total
    /// acquisition order shared by every invocation.
    pub struct WorkspaceId;
}
