// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # census-store
//!
//! Document persistence for the census registry.
//!
//! This crate provides the store contract the registry writes through and an
//! in-memory implementation of it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        census-registry                           │
//! │        (optimistic write loop, reconciler, twin registry)        │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ Collection<T: Versioned>
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  DocumentStore (trait object)                    │
//! │   find · add (Conflict) · replace (StaleVersion) · delete · query │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//!                                 ▼
//!                      MemoryDocumentStore
//!              (BTreeMap per collection, etag per doc)
//! ```
//!
//! ## Features
//!
//! - **Etags**: every applied write issues a fresh [`GenerationId`](census_core::GenerationId)
//! - **Outcomes as values**: races are reported through [`WriteOutcome`]
//! - **Paged queries**: id-ordered pages with opaque continuation tokens
//! - **Statistics**: lock-free counters with snapshots

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod collection;
pub mod continuation;
pub mod memory;
pub mod traits;

pub use collection::{Collection, Versioned};
pub use memory::MemoryDocumentStore;
pub use traits::{
    Document, DocumentStore, Predicate, QueryFilter, StoreConfig, StoreStats, StoreStatsInner,
    WriteOutcome,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
