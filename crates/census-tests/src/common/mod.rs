// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Common Test Utilities
//!
//! Shared fixtures and helpers for the integration suites.
//!
//! ## Architecture
//!
//! - **Isolation**: every test builds its own store, bus and registry
//! - **Determinism**: sweep time stamps come from fixed clocks, never from
//!   the wall clock, unless a test needs real time
//! - **Reusability**: sweeps are described once with builders and replayed
//!   through the reconciler or the processor

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod harness;
pub mod mocks;

// Re-exports for convenience
pub use assertions::*;
pub use builders::*;
pub use fixtures::*;
pub use harness::*;
pub use mocks::*;

use std::sync::Once;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Initialize test logging. Call this at the start of each test module.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("warn,census=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Generate a unique test ID for resource isolation.
pub fn unique_test_id() -> String {
    format!(
        "test_{}_{}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

/// Create a temporary directory for test data.
pub fn temp_test_dir(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temp directory")
}
