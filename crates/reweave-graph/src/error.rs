// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types shared by the graph store and the execution engine.
//!
//! Structural recoverables (duplicate names on add, dangling references) are
//! handled in place by the store — skipped with a `warn!` or auto-pruned —
//! and never surface as error values. Everything here aborts the current
//! call; a failure is contained at the owning network's boundary and must
//! never take sibling networks down with it.

use crate::node::NodeId;

/// Error types for reweave operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReweaveError {
    /// A node name failed to resolve mid-pass. Usually means the graph was
    /// mutated underneath a cached layer plan.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("link not found: {0}")]
    LinkNotFound(String),

    #[error("weight not found: {0}")]
    WeightNotFound(String),

    /// A discovery loop kept producing work past its ceiling without reaching
    /// a legitimate termination condition. The model is considered broken.
    #[error("scheduling deadlock: {direction} discovery ran {passes_run} passes (ceiling {ceiling})")]
    SchedulingDeadlock {
        direction: &'static str,
        passes_run: usize,
        ceiling: usize,
    },

    /// A bounded search exhausted its operation budget (e.g. circuit
    /// enumeration on a pathologically dense graph).
    #[error("iteration ceiling hit during {what} (limit {limit})")]
    IterationCeiling { what: &'static str, limit: usize },

    /// Supplied tensor shape disagrees with the batch/memory/node-count
    /// contract. The call is aborted before any state is touched.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    /// The graph has no initialized node buffers to infer sizes from.
    #[error("graph has no nodes with initialized buffers")]
    UninitializedGraph,

    /// An edge referenced by a cached plan no longer certifies as feedback.
    #[error("edge ({0}, {1}) is not a registered feedback pair")]
    UnregisteredFeedback(NodeId, NodeId),

    /// The bounded worker pool could not be constructed.
    #[error("worker pool setup failed: {0}")]
    WorkerPool(String),
}

pub type Result<T> = core::result::Result<T, ReweaveError>;
