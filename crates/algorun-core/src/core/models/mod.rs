//! # Core Models Module
//!
//! Data structures describing the datasets the engine operates on.
//!
//! - [`workspace`] - Mutable datasets made of labelled spectra
//! - [`group`] - Ordered collections of workspace names used for fan-out
//! - [`history`] - Append-only provenance logs attached to workspaces
//! - [`ids`] - Stable identities of registry entries

pub mod group;
pub mod history;
pub mod ids;
pub mod workspace;
