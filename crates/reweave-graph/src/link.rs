// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Links: pure name relations between two nodes and one weight.
//!
//! A link owns nothing. Several links may reference the same weight name —
//! that is how weight sharing works, and why gradient aggregation sums per
//! weight name rather than per link.

/// Directed edge from `source` to `sink`, scaled by the weight named
/// `weight`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub source: String,
    pub sink: String,
    pub weight: String,
}

impl Link {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        sink: impl Into<String>,
        weight: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            sink: sink.into(),
            weight: weight.into(),
        }
    }
}
