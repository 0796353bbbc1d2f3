// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Integration strategies: the per-node capability set that reduces weighted
//! source contributions into a net input, and the matching hand-written
//! partials used by the backward executor and the weight updater.
//!
//! Terms passed to `net_input` are already `weight × source_output`, one per
//! incoming argument, in the deterministic argument order fixed by the
//! scheduler.

/// Closed set of integration rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntegrationKind {
    /// Σ wᵢsᵢ
    WeightedSum,
    /// Σ wᵢsᵢ / fan-in
    MeanSum,
    /// Π wᵢsᵢ
    Product,
    /// max wᵢsᵢ
    Max,
    /// dt · Σ wᵢsᵢ — explicit-Euler style accumulation over the step delta.
    TimeScaledSum,
}

/// Inputs to the error-contribution partial: everything the backward
/// executor knows about one (source, sink) pair at one slot.
#[derive(Debug, Clone, Copy)]
pub struct ErrorTerm {
    /// Sink's finalized error (w.r.t. its net input).
    pub sink_error: f32,
    pub weight: f32,
    /// Source output at the slot the forward pass actually read.
    pub source_output: f32,
    /// Sink's net input at its own slot.
    pub sink_input: f32,
    /// Incoming link count of the sink.
    pub fan_in: usize,
    /// Step delta at the sink's slot.
    pub dt: f32,
}

/// Inputs to the weight-gradient partial for one link at one slot.
#[derive(Debug, Clone, Copy)]
pub struct WeightGradTerm {
    pub sink_error: f32,
    pub source_output: f32,
    pub weight: f32,
    pub source_input: f32,
    pub sink_input: f32,
    pub fan_in: usize,
    pub dt: f32,
}

/// Tolerance for identifying the winning term of a `Max` integration.
const MAX_TIE_EPS: f32 = 1e-12;

#[inline(always)]
fn safe_div(num: f32, den: f32) -> f32 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

impl IntegrationKind {
    /// Reduce pre-weighted terms into a net input.
    #[inline(always)]
    pub fn net_input(&self, terms: &[f32], fan_in: usize, dt: f32) -> f32 {
        match self {
            IntegrationKind::WeightedSum => terms.iter().sum(),
            IntegrationKind::MeanSum => {
                let sum: f32 = terms.iter().sum();
                if fan_in == 0 {
                    sum
                } else {
                    sum / fan_in as f32
                }
            }
            IntegrationKind::Product => terms.iter().product(),
            IntegrationKind::Max => terms.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            IntegrationKind::TimeScaledSum => dt * terms.iter().sum::<f32>(),
        }
    }

    /// ∂(sink net input)/∂(source output) × sink error — the amount of sink
    /// error this one argument hands back to its source.
    #[inline(always)]
    pub fn error_contribution(&self, t: &ErrorTerm) -> f32 {
        match self {
            IntegrationKind::WeightedSum => t.sink_error * t.weight,
            IntegrationKind::MeanSum => {
                if t.fan_in == 0 {
                    t.sink_error * t.weight
                } else {
                    t.sink_error * t.weight / t.fan_in as f32
                }
            }
            // Π wⱼsⱼ differentiated by sᵢ is the full product divided by sᵢ.
            IntegrationKind::Product => t.sink_error * safe_div(t.sink_input, t.source_output),
            IntegrationKind::Max => {
                if (t.weight * t.source_output - t.sink_input).abs() <= MAX_TIE_EPS {
                    t.sink_error * t.weight
                } else {
                    0.0
                }
            }
            IntegrationKind::TimeScaledSum => t.sink_error * t.weight * t.dt,
        }
    }

    /// ∂(sink net input)/∂(weight) × sink error — one link's contribution to
    /// its weight's aggregated gradient.
    #[inline(always)]
    pub fn weight_gradient(&self, t: &WeightGradTerm) -> f32 {
        match self {
            IntegrationKind::WeightedSum => t.sink_error * t.source_output,
            IntegrationKind::MeanSum => {
                if t.fan_in == 0 {
                    t.sink_error * t.source_output
                } else {
                    t.sink_error * t.source_output / t.fan_in as f32
                }
            }
            IntegrationKind::Product => t.sink_error * safe_div(t.sink_input, t.weight),
            IntegrationKind::Max => {
                if (t.weight * t.source_output - t.sink_input).abs() <= MAX_TIE_EPS {
                    t.sink_error * t.source_output
                } else {
                    0.0
                }
            }
            IntegrationKind::TimeScaledSum => t.sink_error * t.source_output * t.dt,
        }
    }
}
