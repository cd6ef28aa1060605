// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application registry.
//!
//! Applications and their endpoints are written through the same
//! optimistic loop whether they come from a discovery sweep or from a manual
//! registration. The only difference is ownership:
//!
//! | Writer | New record owner | Existing record |
//! |--------|------------------|-----------------|
//! | sweep of discoverer `D` | `D` | taken over by `D` if unowned, stale or already `D`'s; otherwise merged, owner kept |
//! | manual registration | none | merged, owner and watermark kept |

use std::sync::Arc;

use tracing::{debug, info};

use census_core::error::{RegistryError, RegistryResult};
use census_core::identity::ContentEq;
use census_core::staleness::Watermarked;
use census_core::types::{ApplicationId, DiscovererId, OperationContext, Page};
use census_core::{ApplicationInfo, ApplicationRegistration, ChangeKind, EndpointInfo};

use crate::cas::{Proposal, UpsertOutcome};
use crate::endpoints::EndpointRegistry;
use crate::notifier::{classify, Notifications};
use crate::queries::{ApplicationQuery, TwinQuery};
use crate::registry::RegistryContext;

/// Registers, queries and removes applications.
#[derive(Debug, Clone)]
pub struct ApplicationRegistry {
    context: Arc<RegistryContext>,
    endpoints: EndpointRegistry,
}

impl ApplicationRegistry {
    pub(crate) fn new(context: Arc<RegistryContext>) -> Self {
        let endpoints = EndpointRegistry::new(Arc::clone(&context));
        Self { context, endpoints }
    }

    /// Returns an application.
    pub async fn get(&self, id: &ApplicationId) -> RegistryResult<ApplicationInfo> {
        self.context
            .applications
            .find(id.as_str())
            .await?
            .ok_or_else(|| RegistryError::not_found("application", id.as_str()))
    }

    /// Returns an application together with all of its endpoints.
    pub async fn get_registration(&self, id: &ApplicationId) -> RegistryResult<ApplicationRegistration> {
        let application = self.get(id).await?;
        let endpoints = self.endpoints.list_by_application(id).await?;
        Ok(ApplicationRegistration {
            application: Some(application),
            endpoints,
        })
    }

    /// Returns one page of matching applications.
    pub async fn query(
        &self,
        query: &ApplicationQuery,
        page_size: Option<usize>,
        continuation: Option<&str>,
    ) -> RegistryResult<Page<ApplicationInfo>> {
        Ok(self
            .context
            .applications
            .query(&query.to_filter(), page_size, continuation)
            .await?)
    }

    /// Registers an application and its endpoints without an owning
    /// discoverer, merging into an existing record of the same identity.
    pub async fn register(
        &self,
        application: ApplicationInfo,
        endpoints: Vec<EndpointInfo>,
        context: &OperationContext,
    ) -> RegistryResult<ApplicationRegistration> {
        let mut application = application.with_derived_id();
        application.discoverer_id = None;
        application.not_seen_since = None;
        application.validate()?;

        let registration = ApplicationRegistration::new(application, endpoints);
        let mut notifications = Notifications::new();
        let stored = self.upsert(&registration, None, context, &mut notifications).await?;
        info!(
            application_id = %registration.application_id().map(ApplicationId::as_str).unwrap_or_default(),
            endpoints = stored.endpoints.len(),
            "Application registered"
        );
        notifications.into_result()?;
        Ok(stored)
    }

    /// Removes an application and all of its endpoints.
    ///
    /// Refused with `InvalidState` while a twin is active on any endpoint.
    pub async fn unregister(
        &self,
        id: &ApplicationId,
        context: &OperationContext,
    ) -> RegistryResult<ApplicationInfo> {
        let registration = self.get_registration(id).await?;
        for endpoint in &registration.endpoints {
            let twins = self
                .context
                .twins
                .query(&TwinQuery::on_endpoint(endpoint.id.clone()).to_filter(), Some(1), None)
                .await?;
            if let Some(twin) = twins.items.first() {
                return Err(RegistryError::invalid_state(format!(
                    "twin {} is active on endpoint {}",
                    twin.id, endpoint.id
                )));
            }
        }

        let mut notifications = Notifications::new();
        for endpoint in &registration.endpoints {
            let outcome = self
                .context
                .writer
                .write(&self.context.endpoints, endpoint.id.as_str(), |current| {
                    Ok(current.map_or(Proposal::Keep, |_| Proposal::Delete))
                })
                .await?;
            if let UpsertOutcome::Deleted(removed) = outcome {
                self.context
                    .notifier
                    .endpoint(ChangeKind::Deleted, context, &removed, &mut notifications)
                    .await;
            }
        }

        let outcome = self
            .context
            .writer
            .write(&self.context.applications, id.as_str(), |current| {
                Ok(current.map_or(Proposal::Keep, |_| Proposal::Delete))
            })
            .await?;
        let UpsertOutcome::Deleted(removed) = outcome else {
            return Err(RegistryError::not_found("application", id.as_str()));
        };
        self.context
            .notifier
            .application(ChangeKind::Deleted, context, &removed, &mut notifications)
            .await;
        info!(application_id = %id, endpoints = registration.endpoints.len(), "Application unregistered");

        notifications.into_result()?;
        Ok(removed)
    }

    /// Writes a merged registration, application first, then endpoints.
    ///
    /// Returns the stored state of everything written.
    pub(crate) async fn upsert(
        &self,
        registration: &ApplicationRegistration,
        owner: Option<&DiscovererId>,
        context: &OperationContext,
        notifications: &mut Notifications,
    ) -> RegistryResult<ApplicationRegistration> {
        let Some(discovered) = &registration.application else {
            return Err(RegistryError::invalid_argument(
                "application",
                "registration carries no application",
            ));
        };

        let outcome = self
            .context
            .writer
            .write(
                &self.context.applications,
                discovered.application_id.as_str(),
                |current| Ok(merge_application(current, discovered, owner, context)),
            )
            .await?;
        if let Some(change) = classify(outcome.before(), outcome.after()) {
            if let Some(after) = outcome.after() {
                debug!(application_id = %after.application_id, change = %change, "Application changed");
                self.context
                    .notifier
                    .application(change, context, after, notifications)
                    .await;
            }
        }
        let application = outcome
            .into_after()
            .ok_or_else(|| RegistryError::not_found("application", discovered.application_id.as_str()))?;

        let mut endpoints = Vec::with_capacity(registration.endpoints.len());
        for endpoint in &registration.endpoints {
            let discovered = endpoint.clone().bind_to(&application);
            discovered.validate()?;
            let outcome = self
                .context
                .writer
                .write(&self.context.endpoints, discovered.id.as_str(), |current| {
                    Ok(merge_endpoint(current, &discovered, owner, context))
                })
                .await?;
            if let Some(change) = classify(outcome.before(), outcome.after()) {
                if let Some(after) = outcome.after() {
                    debug!(endpoint_id = %after.id, change = %change, "Endpoint changed");
                    self.context
                        .notifier
                        .endpoint(change, context, after, notifications)
                        .await;
                }
            }
            endpoints.extend(outcome.into_after());
        }

        Ok(ApplicationRegistration {
            application: Some(application),
            endpoints,
        })
    }
}

// =============================================================================
// Merge decisions
// =============================================================================

/// Returns `true` if a sweep of `owner` takes the record over.
fn takes_over(record_owner: Option<&DiscovererId>, stale: bool, owner: &DiscovererId) -> bool {
    match record_owner {
        None => true,
        Some(current) => stale || current == owner,
    }
}

fn merge_application(
    current: Option<&ApplicationInfo>,
    discovered: &ApplicationInfo,
    owner: Option<&DiscovererId>,
    context: &OperationContext,
) -> Proposal<ApplicationInfo> {
    let Some(current) = current else {
        let mut created = discovered.clone();
        created.discoverer_id = owner.cloned();
        created.not_seen_since = None;
        created.created = Some(context.clone());
        created.updated = None;
        return Proposal::Write(created);
    };

    // Manual registrations always refresh; a discoverer only while it owns the record.
    let takeover = owner.filter(|owner| takes_over(current.discoverer_id.as_ref(), current.is_stale(), owner));
    let mut next = current.clone();
    if owner.is_none() || takeover.is_some() {
        next.refresh_from(discovered);
    } else {
        next.absorb_from(discovered);
    }
    if let Some(owner) = takeover {
        next.discoverer_id = Some(owner.clone());
        next.mark_seen();
    }
    if next.content_eq(current) && next.not_seen_since == current.not_seen_since {
        return Proposal::Keep;
    }
    next.updated = Some(context.clone());
    Proposal::Write(next)
}

fn merge_endpoint(
    current: Option<&EndpointInfo>,
    discovered: &EndpointInfo,
    owner: Option<&DiscovererId>,
    context: &OperationContext,
) -> Proposal<EndpointInfo> {
    let Some(current) = current else {
        let mut created = discovered.clone();
        created.discoverer_id = owner.cloned();
        created.not_seen_since = None;
        created.created = Some(context.clone());
        created.updated = None;
        return Proposal::Write(created);
    };

    // Manual registrations always refresh; a discoverer only while it owns the record.
    let takeover = owner.filter(|owner| takes_over(current.discoverer_id.as_ref(), current.is_stale(), owner));
    let mut next = current.clone();
    if owner.is_none() || takeover.is_some() {
        next.refresh_from(discovered);
    } else {
        next.absorb_from(discovered);
    }
    if let Some(owner) = takeover {
        next.discoverer_id = Some(owner.clone());
        next.mark_seen();
    }
    if next.content_eq(current) && next.not_seen_since == current.not_seen_since {
        return Proposal::Keep;
    }
    next.updated = Some(context.clone());
    Proposal::Write(next)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use census_core::types::ApplicationType;
    use census_core::TwinActivationRequest;
    use census_store::{DocumentStore, MemoryDocumentStore};
    use chrono::Utc;

    use crate::registry::{Registry, RegistryConfig};

    fn registry() -> Registry {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::default());
        Registry::builder(store).config(RegistryConfig::for_testing()).build()
    }

    fn app(uri: &str) -> ApplicationInfo {
        ApplicationInfo::new(uri, ApplicationType::Server)
    }

    fn endpoint(url: &str) -> EndpointInfo {
        EndpointInfo::new(ApplicationId::new(""), url, None)
    }

    #[test]
    fn test_takeover_rules() {
        let d1 = DiscovererId::new("d1");
        let d2 = DiscovererId::new("d2");
        assert!(takes_over(None, false, &d1));
        assert!(takes_over(Some(&d1), false, &d1));
        assert!(takes_over(Some(&d2), true, &d1));
        assert!(!takes_over(Some(&d2), false, &d1));
    }

    #[test]
    fn test_merge_keeps_live_foreign_owner() {
        let ctx = OperationContext::system();
        let mut current = app("urn:x");
        current.discoverer_id = Some(DiscovererId::new("d2"));
        current.generation_id = Some(census_core::GenerationId::next());
        let discovered = app("urn:x").with_capability("DA");

        let Proposal::Write(next) =
            merge_application(Some(&current), &discovered, Some(&DiscovererId::new("d1")), &ctx)
        else {
            panic!("expected write");
        };
        assert_eq!(next.discoverer_id, Some(DiscovererId::new("d2")));
        assert!(next.capabilities.contains("DA"));
    }

    #[test]
    fn test_merge_foreign_report_keeps_owner_name() {
        let ctx = OperationContext::system();
        let mut current = app("urn:x").with_name("Press A");
        current.discoverer_id = Some(DiscovererId::new("d1"));
        let discovered = app("urn:x").with_name("Press B");

        assert_eq!(
            merge_application(Some(&current), &discovered, Some(&DiscovererId::new("d2")), &ctx),
            Proposal::Keep
        );
    }

    #[test]
    fn test_merge_identical_is_keep() {
        let ctx = OperationContext::system();
        let d1 = DiscovererId::new("d1");
        let mut current = app("urn:x").with_capability("DA");
        current.discoverer_id = Some(d1.clone());
        let discovered = current.clone();
        assert_eq!(
            merge_application(Some(&current), &discovered, Some(&d1), &ctx),
            Proposal::Keep
        );
    }

    #[test]
    fn test_merge_takes_over_stale_record() {
        let ctx = OperationContext::system();
        let mut current = app("urn:x");
        current.discoverer_id = Some(DiscovererId::new("d2"));
        current.not_seen_since = Some(Utc::now());
        let d1 = DiscovererId::new("d1");

        let Proposal::Write(next) = merge_application(Some(&current), &app("urn:x"), Some(&d1), &ctx)
        else {
            panic!("expected write");
        };
        assert_eq!(next.discoverer_id, Some(d1));
        assert_eq!(next.not_seen_since, None);
    }

    #[tokio::test]
    async fn test_register_then_merge() {
        let registry = registry();
        let ctx = OperationContext::system();

        let first = registry
            .applications()
            .register(app("urn:demo").with_capability("DA"), vec![endpoint("opc.tcp://h:1")], &ctx)
            .await
            .unwrap();
        let id = first.application_id().unwrap().clone();
        assert_eq!(first.endpoints.len(), 1);

        registry
            .applications()
            .register(app("URN:DEMO").with_capability("HD"), vec![endpoint("opc.tcp://h:2")], &ctx)
            .await
            .unwrap();

        let merged = registry.applications().get_registration(&id).await.unwrap();
        let application = merged.application.unwrap();
        assert!(application.capabilities.contains("DA"));
        assert!(application.capabilities.contains("HD"));
        assert_eq!(application.discoverer_id, None);
        assert_eq!(merged.endpoints.len(), 2);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_uri() {
        let registry = registry();
        let result = registry
            .applications()
            .register(app("  "), vec![], &OperationContext::system())
            .await;
        assert!(matches!(result, Err(RegistryError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_unregister_removes_endpoints() {
        let registry = registry();
        let ctx = OperationContext::system();
        let registration = registry
            .applications()
            .register(app("urn:demo"), vec![endpoint("opc.tcp://h:1"), endpoint("opc.tcp://h:2")], &ctx)
            .await
            .unwrap();
        let id = registration.application_id().unwrap().clone();

        let removed = registry.applications().unregister(&id, &ctx).await.unwrap();
        assert_eq!(removed.application_id, id);
        assert!(registry.endpoints().list_by_application(&id).await.unwrap().is_empty());
        assert!(registry.applications().get(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unregister_refused_while_twin_active() {
        let registry = registry();
        let ctx = OperationContext::system();
        let registration = registry
            .applications()
            .register(app("urn:demo"), vec![endpoint("opc.tcp://h:1")], &ctx)
            .await
            .unwrap();
        let endpoint_id = registration.endpoints[0].id.clone();
        registry
            .twins()
            .activate(&TwinActivationRequest::new(endpoint_id), &ctx)
            .await
            .unwrap();

        let id = registration.application_id().unwrap().clone();
        let result = registry.applications().unregister(&id, &ctx).await;
        assert!(matches!(result, Err(RegistryError::InvalidState { .. })));
    }
}
