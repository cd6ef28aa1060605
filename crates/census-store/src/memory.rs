// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory document store.
//!
//! This module provides a thread-safe, in-memory implementation of
//! [`DocumentStore`]. It backs the single-process runtime and every test.
//!
//! # Features
//!
//! - **Atomic compare-and-swap**: etag check and write happen under one write lock
//! - **Thread-Safe**: `parking_lot::RwLock`, never held across an await point
//! - **Ordered Queries**: collections are `BTreeMap`s keyed by id
//! - **No Persistence**: data is lost when the store is dropped
//!
//! # Example
//!
//! ```rust,ignore
//! use census_store::{MemoryDocumentStore, StoreConfig};
//!
//! let store = MemoryDocumentStore::new(StoreConfig::for_testing());
//! store.add("twins", "t1", json!({"id": "t1"})).await?;
//! println!("documents: {}", store.len("twins"));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

use census_core::error::StoreResult;
use census_core::types::{GenerationId, Page};

use crate::continuation;
use crate::traits::{
    Document, DocumentStore, QueryFilter, StoreConfig, StoreStats, StoreStatsInner, WriteOutcome,
};

#[derive(Debug, Clone)]
struct Entry {
    etag: GenerationId,
    value: Value,
}

impl Entry {
    fn to_document(&self, id: &str) -> Document {
        Document {
            id: id.to_string(),
            etag: self.etag.clone(),
            value: self.value.clone(),
        }
    }
}

type Collection = BTreeMap<String, Entry>;

/// An in-memory document store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    config: StoreConfig,
    stats: StoreStatsInner,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            config,
            stats: StoreStatsInner::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Returns `true` if the collection holds no documents.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Removes every document.
    pub fn clear(&self) {
        self.collections.write().clear();
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.stats.finds.fetch_add(1, Ordering::Relaxed);
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|entry| entry.to_document(id)))
    }

    async fn add(&self, collection: &str, id: &str, value: Value) -> StoreResult<WriteOutcome> {
        let outcome = {
            let mut collections = self.collections.write();
            let documents = collections.entry(collection.to_string()).or_default();
            if documents.contains_key(id) {
                WriteOutcome::Conflict
            } else {
                let entry = Entry {
                    etag: GenerationId::next(),
                    value,
                };
                let document = entry.to_document(id);
                documents.insert(id.to_string(), entry);
                WriteOutcome::Written(document)
            }
        };
        trace!(collection, id, outcome = outcome.name(), "add");
        self.stats.record_outcome(&self.stats.adds, &outcome);
        Ok(outcome)
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        etag: &GenerationId,
        value: Value,
    ) -> StoreResult<WriteOutcome> {
        let outcome = {
            let mut collections = self.collections.write();
            match collections.get_mut(collection).and_then(|c| c.get_mut(id)) {
                None => WriteOutcome::NotFound,
                Some(entry) if entry.etag != *etag => WriteOutcome::StaleVersion,
                Some(entry) => {
                    entry.etag = GenerationId::next();
                    entry.value = value;
                    WriteOutcome::Written(entry.to_document(id))
                }
            }
        };
        trace!(collection, id, outcome = outcome.name(), "replace");
        self.stats.record_outcome(&self.stats.replaces, &outcome);
        Ok(outcome)
    }

    async fn delete(
        &self,
        collection: &str,
        id: &str,
        etag: Option<&GenerationId>,
    ) -> StoreResult<WriteOutcome> {
        let outcome = {
            let mut collections = self.collections.write();
            match collections.get_mut(collection) {
                None => WriteOutcome::NotFound,
                Some(documents) => match documents.get(id) {
                    None => WriteOutcome::NotFound,
                    Some(entry) if etag.is_some_and(|e| *e != entry.etag) => {
                        WriteOutcome::StaleVersion
                    }
                    Some(_) => documents
                        .remove(id)
                        .map_or(WriteOutcome::NotFound, |entry| {
                            WriteOutcome::Written(entry.to_document(id))
                        }),
                },
            }
        };
        trace!(collection, id, outcome = outcome.name(), "delete");
        self.stats.record_outcome(&self.stats.deletes, &outcome);
        Ok(outcome)
    }

    async fn query(
        &self,
        collection: &str,
        filter: &QueryFilter,
        page_size: Option<usize>,
        continuation: Option<&str>,
    ) -> StoreResult<Page<Document>> {
        let after = continuation
            .map(|token| continuation::decode(collection, token))
            .transpose()?;
        let page_size = self.config.page_size(page_size);
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        let collections = self.collections.read();
        let Some(documents) = collections.get(collection) else {
            return Ok(Page::empty());
        };

        let lower = match &after {
            Some(id) => Bound::Excluded(id.as_str()),
            None => Bound::Unbounded,
        };
        let mut matching = documents
            .range::<str, _>((lower, Bound::Unbounded))
            .filter(|(_, entry)| filter.matches(&entry.value));

        let items: Vec<Document> = matching
            .by_ref()
            .take(page_size)
            .map(|(id, entry)| entry.to_document(id))
            .collect();

        let continuation_token = match (items.last(), matching.next()) {
            (Some(last), Some(_)) => Some(continuation::encode(collection, &last.id)),
            _ => None,
        };
        Ok(Page::new(items, continuation_token))
    }

    fn stats(&self) -> StoreStats {
        self.stats.snapshot()
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// =============================================================================
// Tests
// =============================================================================
