// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # census Integration Tests
//!
//! Integration tests for the census registry together with the fixtures,
//! builders, mocks and harness they share.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: Pre-built applications, endpoints and discoverers
//!   - `builders`: Sweep and registration builders
//!   - `assertions`: Record and event assertions
//!   - `mocks`: Contending store, recording and failing listeners, failing bus
//!   - `harness`: A fully wired registry with an event tap
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p census-tests
//!
//! # Run specific test suite
//! cargo test -p census-tests --test integration_merge
//! cargo test -p census-tests --test integration_reconcile
//! cargo test -p census-tests --test integration_concurrency
//! cargo test -p census-tests --test integration_twins
//! cargo test -p census-tests --test integration_notifier
//! cargo test -p census-tests --test integration_config
//! ```
//!
//! ## Test Categories
//!
//! ### Merge Tests (`integration_merge.rs`)
//! - Working set union is order independent and idempotent
//! - Identity ignores metadata, security and letter case
//!
//! ### Reconcile Tests (`integration_reconcile.rs`)
//! - Sweeps create, refresh, lose and find records
//! - Sweep buffering over the processor
//! - Register-only sweeps and ownership takeover
//!
//! ### Concurrency Tests (`integration_concurrency.rs`)
//! - Lost write races converge without lost updates
//! - Concurrent sweeps of different discoverers
//!
//! ### Twin Tests (`integration_twins.rs`)
//! - Activation, update, connection state and deactivation
//!
//! ### Notifier Tests (`integration_notifier.rs`)
//! - Listener registration, isolation and bus publication
//!
//! ### Config Tests (`integration_config.rs`)
//! - Loading, overrides and validation of service configuration
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use census_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = TestRegistry::new();
//!     let sweep = SweepBuilder::new("d1").application("urn:plant:press", &["opc.tcp://press:4840"]);
//!     harness.reconcile(&sweep).await.unwrap();
//!     assert_eq!(harness.take_events().len(), 2);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::builders::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use crate::common::init_test_logging;
}
