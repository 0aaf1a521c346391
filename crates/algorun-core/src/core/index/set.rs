use super::IndexError;
use super::spec::{IndexToken, parse_tokens};
use std::collections::HashSet;
use std::str::FromStr;

/// Most positions a set parsed without a dataset may hold.
pub const MAX_UNBOUNDED_POSITIONS: usize = 1 << 20;

/// Resolved, validated positions into one dataset.
///
/// Positions keep the order in which they were specified, are unique and are all
/// smaller than the dataset size the set was bound to. Contiguity is computed once at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSet {
    positions: Vec<usize>,
    dataset_size: usize,
    bounds: Option<(usize, usize)>,
}

impl IndexSet {
    /// Binds `positions` to a dataset of `dataset_size` elements.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IndexOutOfRange`] for a position `>= dataset_size` and
    /// [`IndexError::DuplicateIndex`] for a repeated position.
    pub fn new(positions: Vec<usize>, dataset_size: usize) -> Result<Self, IndexError> {
        let mut seen = HashSet::with_capacity(positions.len());
        for &position in &positions {
            if position >= dataset_size {
                return Err(IndexError::IndexOutOfRange {
                    value: position as u64,
                    size: dataset_size,
                });
            }
            if !seen.insert(position) {
                return Err(IndexError::DuplicateIndex {
                    value: position as u64,
                });
            }
        }
        Ok(Self::from_unique(positions, dataset_size))
    }

    /// Every position of a dataset, in order.
    pub fn full(dataset_size: usize) -> Self {
        Self::from_unique((0..dataset_size).collect(), dataset_size)
    }

    pub(crate) fn from_unique(positions: Vec<usize>, dataset_size: usize) -> Self {
        let bounds = positions
            .iter()
            .copied()
            .fold(None, |acc: Option<(usize, usize)>, p| match acc {
                None => Some((p, p)),
                Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
            });
        Self {
            positions,
            dataset_size,
            bounds,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Size of the dataset this set was resolved against.
    pub fn dataset_size(&self) -> usize {
        self.dataset_size
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.positions
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.positions.iter().copied()
    }

    pub fn to_sorted_vec(&self) -> Vec<usize> {
        let mut sorted = self.positions.clone();
        sorted.sort_unstable();
        sorted
    }

    pub fn contains(&self, position: usize) -> bool {
        self.positions.contains(&position)
    }

    pub fn min(&self) -> Option<usize> {
        self.bounds.map(|(lo, _)| lo)
    }

    pub fn max(&self) -> Option<usize> {
        self.bounds.map(|(_, hi)| hi)
    }

    /// True iff the positions form exactly the unbroken run `[min, max]`.
    ///
    /// Positions are unique, so the run is unbroken exactly when its span equals the
    /// number of positions.
    pub fn is_contiguous(&self) -> bool {
        match self.bounds {
            Some((lo, hi)) => hi - lo == self.positions.len() - 1,
            None => false,
        }
    }
}

impl<'a> IntoIterator for &'a IndexSet {
    type Item = usize;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, usize>>;

    fn into_iter(self) -> Self::IntoIter {
        self.positions.iter().copied()
    }
}

/// Parses a set of workspace indices that is not bound to any dataset.
///
/// Syntax and duplicates are checked, and the set may hold at most
/// [`MAX_UNBOUNDED_POSITIONS`] positions. An empty string yields an empty set because
/// "all" has no meaning without a dataset.
impl FromStr for IndexSet {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = parse_tokens(s)?;
        let mut expanded: u64 = 0;
        for token in &tokens {
            let count = match *token {
                IndexToken::Single(_) => 1,
                IndexToken::Range(lo, hi) => (hi - lo).saturating_add(1),
            };
            expanded = expanded.saturating_add(count);
            if expanded > MAX_UNBOUNDED_POSITIONS as u64 {
                return Err(IndexError::InvalidRangeSyntax {
                    token: match *token {
                        IndexToken::Single(v) => v.to_string(),
                        IndexToken::Range(lo, hi) => format!("{lo}-{hi}"),
                    },
                    reason: "selects more indices than a set without a workspace can hold",
                });
            }
        }

        let mut positions = Vec::new();
        let mut seen = HashSet::new();
        for value in tokens.into_iter().flat_map(IndexToken::values) {
            let position = usize::try_from(value).map_err(|_| IndexError::IndexOutOfRange {
                value,
                size: usize::MAX,
            })?;
            if !seen.insert(position) {
                return Err(IndexError::DuplicateIndex { value });
            }
            positions.push(position);
        }
        Ok(Self::from_unique(positions, usize::MAX))
    }
}

impl TryFrom<&str> for IndexSet {
    type Error = IndexError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_specification_is_not_contiguous() {
        let set = IndexSet::try_from("4,6,10-20,1000").unwrap();
        assert!(!set.is_contiguous());
        assert_eq!(set.len(), 14);
        assert_eq!(set.min(), Some(4));
        assert_eq!(set.max(), Some(1000));
    }

    #[test]
    fn single_range_is_contiguous() {
        let set: IndexSet = "10-20".parse().unwrap();
        assert!(set.is_contiguous());
        assert_eq!(set.to_sorted_vec(), (10..=20).collect::<Vec<_>>());
    }

    #[test]
    fn unordered_but_gapless_positions_are_contiguous() {
        let set = IndexSet::new(vec![5, 3, 4], 10).unwrap();
        assert!(set.is_contiguous());
        assert_eq!(set.as_slice(), [5, 3, 4]);
        assert_eq!(set.to_sorted_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn single_position_is_contiguous_and_empty_set_is_not() {
        assert!(IndexSet::new(vec![7], 8).unwrap().is_contiguous());
        assert!(!IndexSet::new(vec![], 8).unwrap().is_contiguous());
    }

    #[test]
    fn out_of_range_position_is_rejected_not_clamped() {
        let err = IndexSet::new(vec![0, 10], 10).unwrap_err();
        assert_eq!(err, IndexError::IndexOutOfRange { value: 10, size: 10 });
    }

    #[test]
    fn duplicate_position_is_rejected() {
        let err = IndexSet::new(vec![1, 2, 1], 10).unwrap_err();
        assert_eq!(err, IndexError::DuplicateIndex { value: 1 });

        let err = "1-5,3".parse::<IndexSet>().unwrap_err();
        assert_eq!(err, IndexError::DuplicateIndex { value: 3 });
    }

    #[test]
    fn extreme_bounds_do_not_look_contiguous() {
        let top = usize::MAX;
        let set = IndexSet::from_unique(vec![0, top], usize::MAX);
        assert!(!set.is_contiguous());

        let set = IndexSet::from_unique(vec![top - 1, top], usize::MAX);
        assert!(set.is_contiguous());
    }

    #[test]
    fn huge_unbounded_range_is_rejected_before_expanding() {
        let err = "0-18446744073709551615".parse::<IndexSet>().unwrap_err();
        assert!(matches!(
            err,
            IndexError::InvalidRangeSyntax { ref token, .. } if token == "0-18446744073709551615"
        ));

        let err = "0-1048575,2000000".parse::<IndexSet>().unwrap_err();
        assert!(matches!(
            err,
            IndexError::InvalidRangeSyntax { ref token, .. } if token == "2000000"
        ));

        let set = "0-1048575".parse::<IndexSet>().unwrap();
        assert_eq!(set.len(), MAX_UNBOUNDED_POSITIONS);
        assert!(set.is_contiguous());
    }

    #[test]
    fn full_set_covers_every_position() {
        let set = IndexSet::full(4);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert!(set.is_contiguous());
        assert_eq!(set.dataset_size(), 4);
        assert!(IndexSet::full(0).is_empty());
    }
}
