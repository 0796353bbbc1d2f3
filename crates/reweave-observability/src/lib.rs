// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Reweave Observability
//!
//! Unified tracing initialization. `RUST_LOG` wins when set; otherwise the
//! supplied default level filters the console output.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with a console layer.
///
/// Returns whether this call installed the subscriber; `false` means one
/// was already active (normal when tests share a process), which is not an
/// error.
pub fn init_tracing(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()
        .is_ok()
}

/// Initialize with the `info` default.
pub fn init_tracing_default() -> bool {
    init_tracing("info")
}
