//! # Index Module
//!
//! Turns user-facing index specifications (`"4,6,10-20,1000"`, explicit lists) into
//! validated, dataset-bound [`IndexSet`]s.
//!
//! - [`spec`] - The textual grammar, [`IndexKind`] and [`IndexSpecification`]
//! - [`set`] - The immutable resolved [`IndexSet`]
//! - [`resolve`] - Resolution of a specification against a dataset's size and labels

pub mod resolve;
pub mod set;
pub mod spec;

pub use resolve::{SpectrumLabels, resolve};
pub use set::{IndexSet, MAX_UNBOUNDED_POSITIONS};
pub use spec::{IndexKind, IndexSpecification, IndexToken};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Index {value} is out of range for a workspace with {size} spectra")]
    IndexOutOfRange { value: u64, size: usize },

    #[error("Index {value} is specified more than once")]
    DuplicateIndex { value: u64 },

    #[error("Invalid index token '{token}': {reason}")]
    InvalidRangeSyntax { token: String, reason: &'static str },

    #[error("Spectrum number {label} does not exist in the workspace")]
    UnknownSpectrumLabel { label: u64 },

    #[error("Unknown index kind '{0}'. Expected 'WorkspaceIndex' or 'SpectrumNumber'")]
    UnknownKind(String),
}
