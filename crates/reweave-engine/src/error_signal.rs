// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Error Aggregator
//!
//! Turns expected outputs across a time window into per-sample loss and
//! injected output-node error. Expectation-side indices run earliest to
//! latest; execution-side slots run latest to earliest; this module owns
//! the reverse-indexing between the two.
//!
//! A loss that comes out not-a-number is replaced by a large sentinel so
//! downstream ranking/selection over a population stays well-ordered
//! instead of propagating NaN.

use ndarray::{Array2, Array3};
use tracing::warn;

use reweave_graph::error::{Result, ReweaveError};
use reweave_graph::node::NodeStatus;
use reweave_graph::store::GraphStore;
use reweave_graph::strategies::LossKind;

/// Stand-in loss for NaN results; large enough to rank a broken model last
/// while staying comfortably finite under summation.
pub const NAN_LOSS_SENTINEL: f32 = 1e12;

/// Accumulate loss and inject error gradients over `steps` window
/// positions.
///
/// `expected` is `[steps, batch, outputs]` on the expectation side
/// (earliest first); returns the `[steps, batch]` loss matrix summed across
/// output nodes, in expectation-side order. After all steps every named
/// output node transitions to `Corrected`.
pub fn aggregate_error(
    store: &mut GraphStore,
    expected: &Array3<f32>,
    output_node_names: &[String],
    steps: usize,
    loss: LossKind,
) -> Result<Array2<f32>> {
    let (batch, memory) = store.batch_and_memory_sizes()?;
    if steps == 0 || steps > memory + 1 {
        return Err(ReweaveError::DimensionMismatch {
            what: "error aggregation steps",
            expected: format!("1..={}", memory + 1),
            actual: steps.to_string(),
        });
    }
    let want = (steps, batch, output_node_names.len());
    if expected.dim() != want {
        return Err(ReweaveError::DimensionMismatch {
            what: "expected value tensor",
            expected: format!("{:?}", want),
            actual: format!("{:?}", expected.dim()),
        });
    }
    // Fail on unresolved names before touching any buffer.
    for name in output_node_names {
        store.node(name)?;
    }

    let mut losses = Array2::<f32>::zeros((steps, batch));

    for k in 0..steps {
        // Expectation index k (earliest first) lands on execution slot
        // steps-1-k (latest first).
        let slot = steps - 1 - k;
        for (i, name) in output_node_names.iter().enumerate() {
            let node = store.node_mut(name)?;
            for b in 0..batch {
                let output = node.output[[b, slot]];
                let target = expected[[k, b, i]];

                let mut sample_loss = loss.loss(output, target);
                if !sample_loss.is_finite() {
                    warn!(
                        node = %name, step = k,
                        "non-finite loss; substituting sentinel"
                    );
                    sample_loss = NAN_LOSS_SENTINEL;
                }
                losses[[k, b]] += sample_loss;

                node.error[[b, slot]] +=
                    loss.gradient(output, target) * node.derivative[[b, slot]];
            }
        }
    }

    for name in output_node_names {
        store.node_mut(name)?.status = NodeStatus::Corrected;
    }
    Ok(losses)
}
