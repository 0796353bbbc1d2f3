// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-pass operation structures and the layer-plan cache.
//!
//! An `Operation` pairs one written node with its argument list. The same
//! shape serves both directions: forward ops read source outputs and write
//! the sink; backward ops read downstream errors and write the node being
//! corrected. Plans are ephemeral per pass unless the caller asks for them
//! to be cached against a repeated identical topology.

use ndarray::Array2;

use reweave_graph::strategies::{ActivationKind, IntegrationKind};

/// One argument of an operation: the node read, the scaling weight, and the
/// slot displacement relative to the pass's time step (0 for plain and bias
/// arguments, +1 for forward feedback reads, -1 for backward feedback
/// reads).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpArg {
    pub source: String,
    pub weight: String,
    pub offset: i8,
}

/// One scheduled computation: every argument feeding `sink` this pass.
/// Strategy kinds are resolved at discovery so execution never consults the
/// node again for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub sink: String,
    pub integration: IntegrationKind,
    pub activation: ActivationKind,
    pub args: Vec<OpArg>,
}

/// One scheduling pass worth of operations, strategy-grouped and
/// name-ordered for deterministic execution.
pub type Layer = Vec<Operation>;

/// The full layer sequence of one pass over the graph.
#[derive(Debug, Clone, Default)]
pub struct LayerPlan {
    pub layers: Vec<Layer>,
}

/// Cached plans, one per direction. Dropped by `Network::clear_cache` and
/// stale the moment topology changes.
#[derive(Debug, Clone, Default)]
pub struct PlanCache {
    pub forward: Option<LayerPlan>,
    pub backward: Option<LayerPlan>,
}

/// Read one buffer cell with pad semantics: displaced slots that fall off
/// either end of the window read as zero, which is exactly the truncation
/// contract at the window edges.
#[inline(always)]
pub(crate) fn slot_read(buf: &Array2<f32>, batch_row: usize, col: isize) -> f32 {
    if col < 0 || col as usize >= buf.ncols() {
        0.0
    } else {
        buf[[batch_row, col as usize]]
    }
}
