use crate::core::models::history::{InvocationRecord, WorkspaceHistory};
use crate::core::models::workspace::Workspace;

/// How an output relates to the inputs of the invocation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOrigin {
    /// The output is one of the inputs, modified where it lives.
    InPlace,
    /// The output is a newly produced workspace.
    Fresh,
}

/// Concatenates the given histories in order.
///
/// Callers pass each distinct input once; records are not deduplicated.
pub fn merged_history<'a, I>(inputs: I) -> WorkspaceHistory
where
    I: IntoIterator<Item = &'a WorkspaceHistory>,
{
    inputs
        .into_iter()
        .fold(WorkspaceHistory::new(), |mut merged, history| {
            merged.extend_from(history);
            merged
        })
}

/// Records a successful invocation on one of its outputs.
///
/// An in-place output keeps its own history and gains `record`; a fresh output gets the
/// inputs' histories in declaration order followed by `record`.
pub fn propagate(
    output: &mut Workspace,
    origin: OutputOrigin,
    inputs: &[&WorkspaceHistory],
    record: InvocationRecord,
) {
    match origin {
        OutputOrigin::InPlace => output.history_mut().push(record),
        OutputOrigin::Fresh => {
            let mut history = merged_history(inputs.iter().copied());
            history.push(record);
            output.set_history(history);
        }
    }
}
