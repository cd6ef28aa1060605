// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Module registry.
//!
//! Supervisors, publishers, gateways and discoverers report themselves here.
//! Changes are routed to the listener kind matching the module kind.

use std::sync::Arc;

use tracing::info;

use census_core::error::{RegistryError, RegistryResult};
use census_core::identity::ContentEq;
use census_core::types::{ModuleId, OperationContext, Page};
use census_core::{ChangeKind, ModuleInfo, ModuleKind};
use census_store::QueryFilter;

use crate::cas::{Proposal, UpsertOutcome};
use crate::notifier::Notifications;
use crate::registry::RegistryContext;

/// Registers and lists edge modules.
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    context: Arc<RegistryContext>,
}

impl ModuleRegistry {
    pub(crate) fn new(context: Arc<RegistryContext>) -> Self {
        Self { context }
    }

    /// Returns a module.
    pub async fn get(&self, id: &ModuleId) -> RegistryResult<ModuleInfo> {
        self.context
            .modules
            .find(id.as_str())
            .await?
            .ok_or_else(|| RegistryError::not_found("module", id.as_str()))
    }

    /// Returns `true` if a module of `kind` is registered under `id`.
    pub async fn exists(&self, id: &ModuleId, kind: ModuleKind) -> RegistryResult<bool> {
        Ok(self
            .context
            .modules
            .find(id.as_str())
            .await?
            .is_some_and(|module| module.kind == kind))
    }

    /// Returns one page of modules, optionally of one kind.
    pub async fn list(
        &self,
        kind: Option<ModuleKind>,
        page_size: Option<usize>,
        continuation: Option<&str>,
    ) -> RegistryResult<Page<ModuleInfo>> {
        let filter = match kind {
            Some(kind) => QueryFilter::all().eq("kind", kind.name()),
            None => QueryFilter::all(),
        };
        Ok(self.context.modules.query(&filter, page_size, continuation).await?)
    }

    /// Creates or refreshes a module registration.
    ///
    /// Emits `New` on first registration and `Updated` when reported content
    /// changed. Re-reporting identical content writes nothing.
    pub async fn register(&self, module: ModuleInfo, context: &OperationContext) -> RegistryResult<ModuleInfo> {
        module.validate()?;
        let outcome = self
            .context
            .writer
            .write(&self.context.modules, module.id.as_str(), |current| {
                let Some(current) = current else {
                    let mut created = module.clone();
                    created.created = Some(context.clone());
                    created.updated = None;
                    return Ok(Proposal::Write(created));
                };
                if current.kind != module.kind {
                    return Err(RegistryError::invalid_state(format!(
                        "module {} is registered as {}",
                        current.id, current.kind
                    )));
                }
                if current.content_eq(&module) {
                    return Ok(Proposal::Keep);
                }
                let mut next = module.clone();
                next.generation_id = current.generation_id.clone();
                next.created = current.created.clone();
                next.updated = Some(context.clone());
                Ok(Proposal::Write(next))
            })
            .await?;

        let change = match &outcome {
            UpsertOutcome::Created(_) => Some(ChangeKind::New),
            UpsertOutcome::Updated { .. } => Some(ChangeKind::Updated),
            _ => None,
        };
        let mut notifications = Notifications::new();
        if let (Some(change), Some(after)) = (change, outcome.after()) {
            info!(module_id = %after.id, kind = %after.kind, change = %change, "Module registered");
            self.context
                .notifier
                .module(change, context, after, &mut notifications)
                .await;
        }
        let stored = outcome
            .into_after()
            .ok_or_else(|| RegistryError::not_found("module", module.id.as_str()))?;
        notifications.into_result()?;
        Ok(stored)
    }

    /// Removes a module registration.
    pub async fn unregister(&self, id: &ModuleId, context: &OperationContext) -> RegistryResult<ModuleInfo> {
        let outcome = self
            .context
            .writer
            .write(&self.context.modules, id.as_str(), |current| match current {
                Some(_) => Ok(Proposal::Delete),
                None => Err(RegistryError::not_found("module", id.as_str())),
            })
            .await?;
        let UpsertOutcome::Deleted(removed) = outcome else {
            return Err(RegistryError::not_found("module", id.as_str()));
        };

        let mut notifications = Notifications::new();
        info!(module_id = %removed.id, kind = %removed.kind, "Module unregistered");
        self.context
            .notifier
            .module(ChangeKind::Deleted, context, &removed, &mut notifications)
            .await;
        notifications.into_result()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use census_store::{DocumentStore, MemoryDocumentStore};

    use crate::registry::{Registry, RegistryConfig};

    fn registry() -> Registry {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::default());
        Registry::builder(store).config(RegistryConfig::for_testing()).build()
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = registry();
        let ctx = OperationContext::system();
        let module = ModuleInfo::new("sup-1", ModuleKind::Supervisor).with_version("1.0");

        let first = registry.modules().register(module.clone(), &ctx).await.unwrap();
        let second = registry.modules().register(module, &ctx).await.unwrap();
        assert_eq!(first.generation_id, second.generation_id);
        assert_eq!(registry.metrics().writes.created, 1);
        assert_eq!(registry.metrics().writes.updated, 0);
    }

    #[tokio::test]
    async fn test_register_refuses_kind_change() {
        let registry = registry();
        let ctx = OperationContext::system();
        registry
            .modules()
            .register(ModuleInfo::new("m", ModuleKind::Publisher), &ctx)
            .await
            .unwrap();
        let result = registry
            .modules()
            .register(ModuleInfo::new("m", ModuleKind::Gateway), &ctx)
            .await;
        assert!(matches!(result, Err(RegistryError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_list_by_kind_and_exists() {
        let registry = registry();
        let ctx = OperationContext::system();
        for (id, kind) in [
            ("d1", ModuleKind::Discoverer),
            ("d2", ModuleKind::Discoverer),
            ("s1", ModuleKind::Supervisor),
        ] {
            registry.modules().register(ModuleInfo::new(id, kind), &ctx).await.unwrap();
        }

        let page = registry
            .modules()
            .list(Some(ModuleKind::Discoverer), None, None)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(registry.modules().exists(&ModuleId::new("d1"), ModuleKind::Discoverer).await.unwrap());
        assert!(!registry.modules().exists(&ModuleId::new("s1"), ModuleKind::Discoverer).await.unwrap());
    }

    #[tokio::test]
    async fn test_unregister_missing_is_not_found() {
        let registry = registry();
        let result = registry
            .modules()
            .unregister(&ModuleId::new("ghost"), &OperationContext::system())
            .await;
        assert!(matches!(result, Err(e) if e.is_not_found()));
    }
}
