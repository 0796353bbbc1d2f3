// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Reweave Graph Foundation
//!
//! Data model for the recurrent dataflow engine: nodes with time-indexed
//! tensor buffers, links as pure name relations, weights with init/solver
//! strategies, and the authoritative `GraphStore` with referential-integrity
//! pruning.
//!
//! This crate holds no scheduling logic. The execution engine
//! (`reweave-engine`) discovers layers, drives passes, and owns every status
//! transition beyond buffer (re)initialization.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod link;
pub mod node;
pub mod store;
pub mod strategies;
pub mod weight;

pub use error::{Result, ReweaveError};
pub use link::Link;
pub use node::{Node, NodeId, NodeRole, NodeStatus};
pub use store::GraphStore;
pub use strategies::{ActivationKind, ErrorTerm, IntegrationKind, LossKind, WeightGradTerm};
pub use weight::{SolverKind, Weight, WeightInit};
