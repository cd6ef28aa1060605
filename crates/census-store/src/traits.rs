// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Document store traits and interfaces.
//!
//! This module defines the abstraction the registry persists through: a
//! collection-scoped JSON document store with per-document etags.
//!
//! # Design Principles
//!
//! - **Optimistic concurrency**: every document carries an etag
//!   ([`GenerationId`]); `replace` and `delete` only apply when the presented
//!   etag is current.
//! - **Outcomes are values**: a lost race is reported as a [`WriteOutcome`],
//!   never as an error. `Err` means the store itself failed.
//! - **Lock-free statistics**: all counters are atomics.
//! - **Paged queries**: results are ordered by id and resumed with an opaque
//!   continuation token.
//!
//! # Example
//!
//! ```rust,ignore
//! use census_store::{DocumentStore, MemoryDocumentStore, WriteOutcome};
//!
//! let store = MemoryDocumentStore::default();
//! let WriteOutcome::Written(doc) = store.add("apps", "a1", json!({"x": 1})).await? else {
//!     unreachable!()
//! };
//!
//! // A second writer presenting the old etag loses.
//! store.replace("apps", "a1", &doc.etag, json!({"x": 2})).await?;
//! assert!(store.replace("apps", "a1", &doc.etag, json!({"x": 3})).await?.is_stale_version());
//! ```

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use census_core::error::StoreResult;
use census_core::types::{GenerationId, Page};

// =============================================================================
// Store Configuration
// =============================================================================

/// Configuration for document stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Page size used when the caller does not ask for one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Largest page a query may return.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_page_size() -> usize {
    100
}

fn default_max_page_size() -> usize {
    1000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl StoreConfig {
    /// Small pages, for exercising continuation in tests.
    pub fn for_testing() -> Self {
        Self {
            default_page_size: 2,
            max_page_size: 10,
        }
    }

    /// Clamps a requested page size into `[1, max_page_size]`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

// =============================================================================
// Documents
// =============================================================================

/// A stored JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id, unique within its collection.
    pub id: String,
    /// Current etag.
    pub etag: GenerationId,
    /// Document body.
    pub value: Value,
}

/// Result of a conditional write.
///
/// Only `Written` changed the store. The other variants report why the write
/// did not apply; callers re-read and decide.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T = Document> {
    /// The write applied. Carries the stored state (for deletes, the removed state).
    Written(T),
    /// `add` found the id already taken.
    Conflict,
    /// The presented etag is no longer current.
    StaleVersion,
    /// The target document does not exist.
    NotFound,
}

impl<T> WriteOutcome<T> {
    /// Returns `true` if the write applied.
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }

    /// Returns `true` if the presented etag was stale.
    pub fn is_stale_version(&self) -> bool {
        matches!(self, Self::StaleVersion)
    }

    /// Returns `true` if the id was already taken.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }

    /// Returns the written value.
    pub fn written(self) -> Option<T> {
        match self {
            Self::Written(value) => Some(value),
            _ => None,
        }
    }

    /// Maps the written value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            Self::Written(value) => WriteOutcome::Written(f(value)),
            Self::Conflict => WriteOutcome::Conflict,
            Self::StaleVersion => WriteOutcome::StaleVersion,
            Self::NotFound => WriteOutcome::NotFound,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Written(_) => "written",
            Self::Conflict => "conflict",
            Self::StaleVersion => "stale_version",
            Self::NotFound => "not_found",
        }
    }
}

// =============================================================================
// Query Filter
// =============================================================================

/// A condition on one document field.
///
/// Field names are dotted paths into the document (`endpoint.security_mode`).
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals the value.
    Eq(String, Value),
    /// String field equals the value, ignoring ASCII case.
    EqIgnoreCase(String, String),
    /// Field is missing or null.
    IsNull(String),
    /// Field is present and not null.
    NotNull(String),
    /// Array field contains the value.
    Contains(String, Value),
}

impl Predicate {
    /// Evaluates the predicate against a document body.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::Eq(field, expected) => lookup(document, field) == Some(expected),
            Self::EqIgnoreCase(field, expected) => lookup(document, field)
                .and_then(Value::as_str)
                .is_some_and(|actual| actual.eq_ignore_ascii_case(expected)),
            Self::IsNull(field) => lookup(document, field).is_none_or(Value::is_null),
            Self::NotNull(field) => lookup(document, field).is_some_and(|v| !v.is_null()),
            Self::Contains(field, expected) => lookup(document, field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(expected)),
        }
    }
}

fn lookup<'a>(document: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(document, |value, segment| value.get(segment))
}

/// Conjunction of predicates. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    predicates: Vec<Predicate>,
}

impl QueryFilter {
    /// Matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds a predicate.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds an equality predicate.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Predicate::Eq(field.into(), value.into()))
    }

    /// Adds a case-insensitive equality predicate.
    pub fn eq_ignore_case(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.and(Predicate::EqIgnoreCase(field.into(), value.into()))
    }

    /// Requires the field to be missing or null.
    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.and(Predicate::IsNull(field.into()))
    }

    /// Requires the field to be present.
    pub fn not_null(self, field: impl Into<String>) -> Self {
        self.and(Predicate::NotNull(field.into()))
    }

    /// Requires an array field to contain the value.
    pub fn contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Predicate::Contains(field.into(), value.into()))
    }

    /// Returns the predicates.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Evaluates the filter.
    pub fn matches(&self, document: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(document))
    }
}

// =============================================================================
// Store Statistics
// =============================================================================

/// Lock-free store statistics.
#[derive(Debug, Default)]
pub struct StoreStatsInner {
    /// Point reads.
    pub finds: AtomicU64,
    /// Applied creates.
    pub adds: AtomicU64,
    /// Applied replaces.
    pub replaces: AtomicU64,
    /// Applied deletes.
    pub deletes: AtomicU64,
    /// Query pages served.
    pub queries: AtomicU64,
    /// Creates rejected because the id existed.
    pub conflicts: AtomicU64,
    /// Writes rejected because of a stale etag.
    pub stale_versions: AtomicU64,
}

impl StoreStatsInner {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a write outcome.
    #[inline]
    pub fn record_outcome<T>(&self, applied: &AtomicU64, outcome: &WriteOutcome<T>) {
        match outcome {
            WriteOutcome::Written(_) => {
                applied.fetch_add(1, Ordering::Relaxed);
            }
            WriteOutcome::Conflict => {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
            }
            WriteOutcome::StaleVersion => {
                self.stale_versions.fetch_add(1, Ordering::Relaxed);
            }
            WriteOutcome::NotFound => {}
        }
    }

    /// Creates a snapshot.
    pub fn snapshot(&self) -> StoreStats {
        StoreStats {
            finds: self.finds.load(Ordering::Relaxed),
            adds: self.adds.load(Ordering::Relaxed),
            replaces: self.replaces.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            stale_versions: self.stale_versions.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of store statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Point reads.
    pub finds: u64,
    /// Applied creates.
    pub adds: u64,
    /// Applied replaces.
    pub replaces: u64,
    /// Applied deletes.
    pub deletes: u64,
    /// Query pages served.
    pub queries: u64,
    /// Rejected creates.
    pub conflicts: u64,
    /// Rejected stale writes.
    pub stale_versions: u64,
}

impl StoreStats {
    /// Applied writes of any kind.
    pub fn writes(&self) -> u64 {
        self.adds + self.replaces + self.deletes
    }
}

// =============================================================================
// DocumentStore Trait
// =============================================================================

/// Collection-scoped JSON document store with etags.
///
/// # Implementation Requirements
///
/// - `add` must be atomic with respect to concurrent `add`s of the same id
/// - `replace`/`delete` must compare the etag and write in one step
/// - every applied write issues a fresh etag
/// - `query` returns documents ordered by id
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Reads a document.
    async fn find(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Creates a document. Returns `Conflict` if the id exists.
    async fn add(&self, collection: &str, id: &str, value: Value) -> StoreResult<WriteOutcome>;

    /// Replaces a document if `etag` is current.
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        etag: &GenerationId,
        value: Value,
    ) -> StoreResult<WriteOutcome>;

    /// Deletes a document, unconditionally when `etag` is `None`.
    async fn delete(
        &self,
        collection: &str,
        id: &str,
        etag: Option<&GenerationId>,
    ) -> StoreResult<WriteOutcome>;

    /// Returns one page of matching documents.
    async fn query(
        &self,
        collection: &str,
        filter: &QueryFilter,
        page_size: Option<usize>,
        continuation: Option<&str>,
    ) -> StoreResult<Page<Document>>;

    /// Returns current statistics.
    fn stats(&self) -> StoreStats;

    /// Name used in logs.
    fn name(&self) -> &str;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_config_page_size() {
        let config = StoreConfig::default();
        assert_eq!(config.page_size(None), 100);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(5000)), 1000);
    }

    #[test]
    fn test_predicates() {
        let doc = json!({
            "application_uri": "URN:Demo",
            "site_id": null,
            "capabilities": ["DA", "HD"],
            "endpoint": { "security_mode": "sign" }
        });

        assert!(Predicate::EqIgnoreCase("application_uri".into(), "urn:demo".into()).matches(&doc));
        assert!(Predicate::IsNull("site_id".into()).matches(&doc));
        assert!(Predicate::IsNull("missing".into()).matches(&doc));
        assert!(Predicate::NotNull("capabilities".into()).matches(&doc));
        assert!(Predicate::Contains("capabilities".into(), json!("HD")).matches(&doc));
        assert!(Predicate::Eq("endpoint.security_mode".into(), json!("sign")).matches(&doc));
        assert!(!Predicate::Eq("endpoint.security_mode".into(), json!("none")).matches(&doc));
    }

    #[test]
    fn test_filter_is_conjunction() {
        let doc = json!({"a": 1, "b": 2});
        assert!(QueryFilter::all().matches(&doc));
        assert!(QueryFilter::all().eq("a", 1).eq("b", 2).matches(&doc));
        assert!(!QueryFilter::all().eq("a", 1).eq("b", 3).matches(&doc));
    }

    #[test]
    fn test_outcome_map() {
        let outcome: WriteOutcome<u32> = WriteOutcome::Written(2);
        assert_eq!(outcome.map(|v| v * 2), WriteOutcome::Written(4));
        assert!(WriteOutcome::<u32>::StaleVersion.is_stale_version());
        assert_eq!(WriteOutcome::<u32>::NotFound.name(), "not_found");
    }

    #[test]
    fn test_stats_record_outcome() {
        let stats = StoreStatsInner::new();
        stats.record_outcome(&stats.adds, &WriteOutcome::Written(()));
        stats.record_outcome(&stats.adds, &WriteOutcome::<()>::Conflict);
        stats.record_outcome(&stats.replaces, &WriteOutcome::<()>::StaleVersion);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.adds, 1);
        assert_eq!(snapshot.conflicts, 1);
        assert_eq!(snapshot.stale_versions, 1);
        assert_eq!(snapshot.writes(), 1);
    }
}
