use crate::core::index::IndexSet;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Evaluates `f` at every position of `indices` and returns the results in index order.
///
/// Sets with at least `threshold` positions are spread over the rayon pool when the
/// `parallel` feature is enabled. `f` sees one position at a time and must not share
/// mutable state across positions; callers merge the returned values themselves.
pub fn map_indices<T, F>(indices: &IndexSet, threshold: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if indices.len() < threshold {
        return indices.iter().map(f).collect();
    }

    #[cfg(not(feature = "parallel"))]
    let results: Vec<T> = indices.iter().map(f).collect();

    #[cfg(feature = "parallel")]
    let results: Vec<T> = indices.as_slice().par_iter().map(|&p| f(p)).collect();

    results
}
