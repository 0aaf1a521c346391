use super::IndexError;
use super::set::IndexSet;
use super::spec::{IndexKind, IndexSpecification, IndexToken};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// The view of a dataset that index resolution needs: its size and the spectrum
/// number carried at each position.
pub trait SpectrumLabels {
    fn size(&self) -> usize;

    fn spectrum_number(&self, position: usize) -> Option<u64>;

    /// Reverse lookup of a spectrum number. Linear in the dataset size.
    fn position_of(&self, label: u64) -> Option<usize> {
        (0..self.size()).find(|&p| self.spectrum_number(p) == Some(label))
    }
}

/// Resolves `spec` against the current shape of `dataset`.
///
/// An empty specification selects every position. Workspace indices are used as
/// positions directly; spectrum numbers are mapped through the dataset's labels. The
/// result preserves the order in which values were specified.
///
/// # Errors
///
/// Fails on malformed syntax, reversed ranges, out-of-range positions, unknown spectrum
/// numbers and values given more than once. Errors name the value as the user wrote it.
pub fn resolve<D>(
    spec: &IndexSpecification,
    kind: IndexKind,
    dataset: &D,
) -> Result<IndexSet, IndexError>
where
    D: SpectrumLabels + ?Sized,
{
    let size = dataset.size();
    let Some(tokens) = spec.tokens()? else {
        return Ok(IndexSet::full(size));
    };

    let positions = match kind {
        IndexKind::WorkspaceIndex => positions_from_indices(&tokens, size)?,
        IndexKind::SpectrumNumber => positions_from_labels(&tokens, dataset)?,
    };

    trace!(%kind, count = positions.len(), size, "Resolved index specification");
    Ok(IndexSet::from_unique(positions, size))
}

fn positions_from_indices(tokens: &[IndexToken], size: usize) -> Result<Vec<usize>, IndexError> {
    // Range bounds are checked before expansion so a huge range fails without allocating.
    if let Some(value) = tokens
        .iter()
        .map(|token| token.max_value())
        .find(|&v| v >= size as u64)
    {
        return Err(IndexError::IndexOutOfRange { value, size });
    }

    let mut seen = HashSet::new();
    let mut positions = Vec::new();
    for value in tokens.iter().copied().flat_map(IndexToken::values) {
        if !seen.insert(value) {
            return Err(IndexError::DuplicateIndex { value });
        }
        positions.push(value as usize);
    }
    Ok(positions)
}

fn positions_from_labels<D>(tokens: &[IndexToken], dataset: &D) -> Result<Vec<usize>, IndexError>
where
    D: SpectrumLabels + ?Sized,
{
    let lookup: HashMap<u64, usize> = (0..dataset.size())
        .filter_map(|p| dataset.spectrum_number(p).map(|label| (label, p)))
        .collect();

    let mut seen = HashSet::new();
    let mut positions = Vec::new();
    for label in tokens.iter().copied().flat_map(IndexToken::values) {
        let position = *lookup
            .get(&label)
            .ok_or(IndexError::UnknownSpectrumLabel { label })?;
        if !seen.insert(position) {
            return Err(IndexError::DuplicateIndex { value: label });
        }
        positions.push(position);
    }
    Ok(positions)
}
