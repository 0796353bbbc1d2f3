// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node identity, lifecycle status, and time-indexed tensor buffers.
//!
//! Every node carries five buffers shaped `[batch, memory + 1]`. Column 0 is
//! the most recent time slot and the final column is a zeroed pad that
//! absorbs recurrent look-ahead/look-behind reads at the window edge, so the
//! executors never bounds-check feedback offsets in the hot loop.

use core::fmt;

use ndarray::Array2;

use crate::strategies::{ActivationKind, IntegrationKind};

/// Stable node identifier, assigned by the graph store at insertion.
///
/// The feedback-pair registry is keyed on these so membership tests are O(1)
/// integer-pair lookups rather than string comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Functional role of a node within the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Receives pinned value/dt tensors; never scheduled.
    Input,
    Hidden,
    /// Terminal node; receives injected error from the loss aggregator.
    Output,
    /// Constant-1 contributor; excluded from cycle detection and never
    /// corrected.
    Bias,
    /// Marked feedback endpoint; canonicalized as the delayed logical source
    /// of any cycle it closes.
    Recursive,
}

/// Lifecycle status, mutated only by the scheduler and the executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// Buffers allocated, current slot not yet computed.
    Initialized,
    /// Forward value for the current slot is final.
    Activated,
    /// Error for the current slot is final and readable by upstream sources.
    Corrected,
    /// Dormant; contributes nothing and is never scheduled.
    Deactivated,
}

/// A single computation node with time-indexed state.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub id: NodeId,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub activation: ActivationKind,
    pub integration: IntegrationKind,

    /// Activated value per `[batch, slot]`.
    pub output: Array2<f32>,
    /// Net (integrated) input per `[batch, slot]`.
    pub input: Array2<f32>,
    /// Error signal w.r.t. the net input per `[batch, slot]`.
    pub error: Array2<f32>,
    /// Activation gradient at the net input per `[batch, slot]`.
    pub derivative: Array2<f32>,
    /// Per-step time delta, pinned by the window drivers.
    pub dt: Array2<f32>,
}

impl Node {
    /// Create a node with empty buffers. `init_buffers` must run before any
    /// pass touches it; the store calls it from `init_nodes`.
    pub fn new(
        name: impl Into<String>,
        role: NodeRole,
        activation: ActivationKind,
        integration: IntegrationKind,
    ) -> Self {
        Self {
            name: name.into(),
            id: NodeId(u32::MAX), // reassigned by the store on add
            role,
            status: NodeStatus::Initialized,
            activation,
            integration,
            output: Array2::zeros((0, 0)),
            input: Array2::zeros((0, 0)),
            error: Array2::zeros((0, 0)),
            derivative: Array2::zeros((0, 0)),
            dt: Array2::zeros((0, 0)),
        }
    }

    /// (Re)allocate all buffers to `[batch, memory + 1]` zeros and reset the
    /// lifecycle status for a fresh window.
    ///
    /// Bias nodes come up `Activated` with a constant-1 output; deactivated
    /// nodes stay dormant; everything else returns to `Initialized`.
    pub fn init_buffers(&mut self, batch: usize, memory: usize) {
        let shape = (batch, memory + 1);
        self.output = Array2::zeros(shape);
        self.input = Array2::zeros(shape);
        self.error = Array2::zeros(shape);
        self.derivative = Array2::zeros(shape);
        self.dt = Array2::zeros(shape);

        if self.status == NodeStatus::Deactivated {
            return;
        }
        if self.role == NodeRole::Bias {
            self.output.fill(1.0);
            self.status = NodeStatus::Activated;
        } else {
            self.status = NodeStatus::Initialized;
        }
    }

    /// Batch dimension of the allocated buffers (0 before `init_buffers`).
    pub fn batch_size(&self) -> usize {
        self.output.nrows()
    }

    /// Number of time slots including the pad column (0 before
    /// `init_buffers`).
    pub fn window_len(&self) -> usize {
        self.output.ncols()
    }

    /// Whether this node takes part in scheduling at all.
    pub fn is_active(&self) -> bool {
        self.status != NodeStatus::Deactivated
    }

    /// Zero every time slot without reallocating. Statuses follow the same
    /// rules as `init_buffers`.
    pub fn reset_time(&mut self) {
        self.output.fill(0.0);
        self.input.fill(0.0);
        self.error.fill(0.0);
        self.derivative.fill(0.0);
        self.dt.fill(0.0);
        if self.status != NodeStatus::Deactivated {
            if self.role == NodeRole::Bias {
                self.output.fill(1.0);
                self.status = NodeStatus::Activated;
            } else {
                self.status = NodeStatus::Initialized;
            }
        }
    }
}
