//! # Engine Module
//!
//! The stateful machinery that runs algorithms over workspaces held in a
//! [`WorkspaceRegistry`](crate::core::registry::WorkspaceRegistry).
//!
//! ## Overview
//!
//! An [`Invocation`](runner::Invocation) walks one algorithm through its lifecycle:
//! properties are declared into a [`PropertyBag`](bag::PropertyBag), validated, and then
//! executed either directly or once per member of the workspace groups bound to its
//! inputs. Every execution ("shot") first computes and acquires a deduplicated lock plan,
//! runs the body against the locked data, and records the invocation in the history of
//! each output before the locks are released.
//!
//! ## Architecture
//!
//! - **Properties** ([`property`], [`bag`], [`validators`]) - Typed, direction-tagged
//!   slots, compound workspace-plus-indices properties and per-property checks
//! - **Locking** ([`lock`]) - Lock plans, held lock sets and guaranteed release
//! - **Group Fan-out** ([`group`], [`naming`]) - Dispatch decisions, group shape checks and
//!   output member naming
//! - **History** ([`history`]) - Propagation of provenance from inputs to outputs
//! - **Execution** ([`runner`], [`context`], [`state`], [`algorithm`], [`factory`]) - The
//!   lifecycle state machine, the body's view of a shot and algorithm construction
//! - **Configuration and Reporting** ([`config`], [`progress`], [`error`])

pub mod algorithm;
pub mod bag;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod group;
pub mod history;
pub mod lock;
pub mod naming;
pub mod progress;
pub mod property;
pub mod runner;
pub mod state;
pub mod utils;
pub(crate) mod validation;
pub mod validators;
