// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Weights: a named scalar plus its initialization and solver strategies.
//!
//! The solver variant may hold internal state (momentum velocity); that
//! state belongs to the weight and is reset together with the value by
//! `initialize`.

use rand::Rng;

/// Initialization strategy, run by `GraphStore::init_weights`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightInit {
    Constant(f32),
    Zero,
    /// Uniform sample in `[low, high]`.
    Uniform { low: f32, high: f32 },
}

impl WeightInit {
    pub fn sample(&self) -> f32 {
        match *self {
            WeightInit::Constant(v) => v,
            WeightInit::Zero => 0.0,
            WeightInit::Uniform { low, high } => rand::thread_rng().gen_range(low..=high),
        }
    }
}

/// Per-weight update rule, consuming one aggregated gradient per update
/// phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolverKind {
    Sgd {
        learning_rate: f32,
    },
    /// Classical momentum; `velocity` is carried across updates.
    Momentum {
        learning_rate: f32,
        momentum: f32,
        velocity: f32,
    },
}

impl SolverKind {
    /// Apply one aggregated gradient, mutating `value` in place.
    pub fn apply(&mut self, value: &mut f32, gradient: f32) {
        match self {
            SolverKind::Sgd { learning_rate } => {
                *value -= *learning_rate * gradient;
            }
            SolverKind::Momentum {
                learning_rate,
                momentum,
                velocity,
            } => {
                *velocity = *momentum * *velocity - *learning_rate * gradient;
                *value += *velocity;
            }
        }
    }

    /// Drop any internal state (momentum velocity).
    pub fn reset(&mut self) {
        if let SolverKind::Momentum { velocity, .. } = self {
            *velocity = 0.0;
        }
    }
}

/// A named scalar weight owned by the graph store and referenced by name
/// from links.
#[derive(Debug, Clone, PartialEq)]
pub struct Weight {
    pub name: String,
    pub value: f32,
    pub init: WeightInit,
    pub solver: SolverKind,
}

impl Weight {
    pub fn new(name: impl Into<String>, init: WeightInit, solver: SolverKind) -> Self {
        let value = match init {
            WeightInit::Constant(v) => v,
            _ => 0.0,
        };
        Self {
            name: name.into(),
            value,
            init,
            solver,
        }
    }

    /// Re-sample the value from the init strategy and clear solver state.
    pub fn initialize(&mut self) {
        self.value = self.init.sample();
        self.solver.reset();
    }
}
