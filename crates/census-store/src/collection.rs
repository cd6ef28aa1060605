// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Typed collections over a [`DocumentStore`].
//!
//! A [`Collection<T>`] maps registry records to JSON documents and back. The
//! store etag travels in the record's `generation_id`: it is stripped before
//! a write and restored from the document after every read, so a record in
//! hand always carries the generation it was read at.
//!
//! ```text
//!   ApplicationInfo ──serialize──▶ Value ──add/replace──▶ DocumentStore
//!        ▲                                                    │
//!        └──── generation_id = etag ◀──deserialize── Document ┘
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use census_core::error::{StoreError, StoreResult};
use census_core::types::{GenerationId, Page};
use census_core::{ApplicationInfo, EndpointInfo, ModuleInfo, TwinInfo};

use crate::traits::{Document, DocumentStore, QueryFilter, WriteOutcome};

const GENERATION_FIELD: &str = "generation_id";

/// Guards against unbounded `query_all` loops over a misbehaving store.
const MAX_QUERY_PAGES: usize = 100_000;

// =============================================================================
// Versioned
// =============================================================================

/// A record persisted in its own collection under a store-issued generation.
pub trait Versioned: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection name.
    const COLLECTION: &'static str;

    /// Entity kind used in errors and logs.
    const KIND: &'static str;

    /// Document id.
    fn document_id(&self) -> &str;

    /// Generation the record was read at.
    fn generation(&self) -> Option<&GenerationId>;

    /// Records the generation issued by the store.
    fn set_generation(&mut self, generation: Option<GenerationId>);
}

macro_rules! versioned {
    ($type:ty, $collection:literal, $kind:literal, |$record:ident| $id:expr) => {
        impl Versioned for $type {
            const COLLECTION: &'static str = $collection;
            const KIND: &'static str = $kind;

            fn document_id(&self) -> &str {
                let $record = self;
                $id
            }

            fn generation(&self) -> Option<&GenerationId> {
                self.generation_id.as_ref()
            }

            fn set_generation(&mut self, generation: Option<GenerationId>) {
                self.generation_id = generation;
            }
        }
    };
}

versioned!(ApplicationInfo, "applications", "application", |r| r.application_id.as_str());
versioned!(EndpointInfo, "endpoints", "endpoint", |r| r.id.as_str());
versioned!(TwinInfo, "twins", "twin", |r| r.id.as_str());
versioned!(ModuleInfo, "modules", "module", |r| r.id.as_str());

// =============================================================================
// Collection
// =============================================================================

/// Typed view of one collection.
#[derive(Debug)]
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<T: Versioned> Collection<T> {
    /// Creates a collection view.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Reads a record.
    pub async fn find(&self, id: &str) -> StoreResult<Option<T>> {
        self.store
            .find(T::COLLECTION, id)
            .await?
            .map(decode)
            .transpose()
    }

    /// Creates a record. `Conflict` if the id is taken.
    pub async fn add(&self, record: &T) -> StoreResult<WriteOutcome<T>> {
        let outcome = self
            .store
            .add(T::COLLECTION, record.document_id(), encode(record)?)
            .await?;
        written(outcome)
    }

    /// Replaces a record at the generation it carries.
    ///
    /// A record without a generation was never read from the store and is
    /// reported as `StaleVersion`.
    pub async fn replace(&self, record: &T) -> StoreResult<WriteOutcome<T>> {
        let Some(generation) = record.generation() else {
            return Ok(WriteOutcome::StaleVersion);
        };
        let outcome = self
            .store
            .replace(T::COLLECTION, record.document_id(), generation, encode(record)?)
            .await?;
        written(outcome)
    }

    /// Deletes a record, conditionally on `generation` when given.
    pub async fn delete(
        &self,
        id: &str,
        generation: Option<&GenerationId>,
    ) -> StoreResult<WriteOutcome<T>> {
        let outcome = self.store.delete(T::COLLECTION, id, generation).await?;
        written(outcome)
    }

    /// Returns one page of matching records.
    pub async fn query(
        &self,
        filter: &QueryFilter,
        page_size: Option<usize>,
        continuation: Option<&str>,
    ) -> StoreResult<Page<T>> {
        let page = self
            .store
            .query(T::COLLECTION, filter, page_size, continuation)
            .await?;
        let items = page
            .items
            .into_iter()
            .map(decode)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(items, page.continuation_token))
    }

    /// Drains every page of matching records.
    pub async fn query_all(&self, filter: &QueryFilter) -> StoreResult<Vec<T>> {
        let mut records = Vec::new();
        let mut continuation: Option<String> = None;
        for _ in 0..MAX_QUERY_PAGES {
            let page = self.query(filter, None, continuation.as_deref()).await?;
            records.extend(page.items);
            match page.continuation_token {
                Some(token) => continuation = Some(token),
                None => return Ok(records),
            }
        }
        Err(StoreError::invalid_continuation(
            continuation.unwrap_or_default(),
        ))
    }
}

fn encode<T: Versioned>(record: &T) -> StoreResult<Value> {
    let mut value = serde_json::to_value(record)?;
    match value.as_object_mut() {
        Some(object) => {
            object.remove(GENERATION_FIELD);
            Ok(value)
        }
        None => Err(StoreError::invalid_document(format!(
            "{} must serialize to an object",
            T::KIND
        ))),
    }
}

fn decode<T: Versioned>(document: Document) -> StoreResult<T> {
    let mut record: T = serde_json::from_value(document.value)?;
    record.set_generation(Some(document.etag));
    Ok(record)
}

fn written<T: Versioned>(outcome: WriteOutcome) -> StoreResult<WriteOutcome<T>> {
    match outcome {
        WriteOutcome::Written(document) => decode(document).map(WriteOutcome::Written),
        WriteOutcome::Conflict => Ok(WriteOutcome::Conflict),
        WriteOutcome::StaleVersion => Ok(WriteOutcome::StaleVersion),
        WriteOutcome::NotFound => Ok(WriteOutcome::NotFound),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocumentStore;
    use crate::traits::StoreConfig;
    use census_core::{ApplicationType, ModuleKind};

    fn applications() -> Collection<ApplicationInfo> {
        Collection::new(Arc::new(MemoryDocumentStore::new(StoreConfig::for_testing())))
    }

    fn app(uri: &str) -> ApplicationInfo {
        ApplicationInfo::new(uri, ApplicationType::Server).with_derived_id()
    }

    #[tokio::test]
    async fn test_read_carries_etag_as_generation() {
        let collection = applications();
        let stored = collection
            .add(&app("urn:a"))
            .await
            .unwrap()
            .written()
            .unwrap();
        let generation = stored.generation_id.clone().unwrap();

        let found = collection
            .find(stored.application_id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.generation_id, Some(generation));
    }

    #[tokio::test]
    async fn test_replace_without_generation_is_stale() {
        let collection = applications();
        let record = app("urn:a");
        collection.add(&record).await.unwrap();

        let outcome = collection.replace(&record).await.unwrap();
        assert!(outcome.is_stale_version());
    }

    #[tokio::test]
    async fn test_replace_with_outdated_generation() {
        let collection = applications();
        let first = collection.add(&app("urn:a")).await.unwrap().written().unwrap();

        let second = collection
            .replace(&first.clone().with_capability("DA"))
            .await
            .unwrap();
        assert!(second.is_written());

        let third = collection.replace(&first.with_capability("HD")).await.unwrap();
        assert!(third.is_stale_version());
    }

    #[tokio::test]
    async fn test_query_all_drains_pages() {
        let collection = applications();
        for i in 0..7 {
            collection.add(&app(&format!("urn:app:{i}"))).await.unwrap();
        }
        let all = collection.query_all(&QueryFilter::all()).await.unwrap();
        assert_eq!(all.len(), 7);
        assert!(all.iter().all(|a| a.generation_id.is_some()));

        let page = collection.query(&QueryFilter::all(), None, None).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more());
    }

    #[tokio::test]
    async fn test_delete_returns_removed_record() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::default());
        let modules: Collection<ModuleInfo> = Collection::new(store);
        modules
            .add(&ModuleInfo::new("sup-1", ModuleKind::Supervisor))
            .await
            .unwrap();

        let removed = modules.delete("sup-1", None).await.unwrap().written().unwrap();
        assert_eq!(removed.kind, ModuleKind::Supervisor);
        assert!(modules.find("sup-1").await.unwrap().is_none());
    }
}
