//! # algorun Core Library
//!
//! An execution core for named, versioned algorithms operating on shared, mutable,
//! in-memory workspaces.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same layering throughout, so that each concern can be tested on
//! its own.
//!
//! - **[`core`]: The Foundation.** Workspace and group data models, the workspace registry
//!   with its per-workspace reader/writer cells, and index specification parsing and
//!   resolution.
//!
//! - **[`engine`]: The Logic Core.** Declares and validates algorithm properties, computes
//!   and acquires deadlock-free lock plans, fans invocations out over workspace groups,
//!   records provenance history and drives each invocation through its lifecycle.
//!
//! - **[`algorithms`]: Built-ins.** A small set of algorithms registered with the default
//!   factory, written against the same public API third-party algorithms use.
//!
//! - **[`workflows`]: The Public API.** Ties everything together to run ordered pipelines
//!   of algorithm steps against one registry.

pub mod algorithms;
pub mod core;
pub mod engine;
pub mod workflows;
