//! # Core Module
//!
//! Stateless building blocks shared by every layer of the crate: the dataset models,
//! the registry that maps names to them, and the index machinery that selects parts of
//! a dataset.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Workspaces, spectra, workspace groups and the
//!   append-only invocation history attached to each workspace
//! - **Registry** ([`registry`]) - A thread-safe slot-map arena resolving names to
//!   lockable workspace cells and to groups
//! - **Indices** ([`index`]) - The index-specification grammar and its resolution into
//!   validated [`IndexSet`](index::IndexSet)s bound to a concrete dataset
//!
//! Nothing in this module takes workspace locks on its own; the lock protocol lives in
//! [`engine::lock`](crate::engine::lock).

pub mod index;
pub mod models;
pub mod registry;
