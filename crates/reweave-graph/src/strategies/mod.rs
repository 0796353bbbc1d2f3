// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-node and per-pass computation strategies.
//!
//! Strategies are closed sets of tagged `Copy` variants, selected at graph
//! build time and resolved once per layer group. The executors dispatch on a
//! plain enum match in the per-element loop; there are no trait objects on
//! the hot path.

pub mod activation;
pub mod integration;
pub mod loss;

pub use activation::ActivationKind;
pub use integration::{ErrorTerm, IntegrationKind, WeightGradTerm};
pub use loss::LossKind;
