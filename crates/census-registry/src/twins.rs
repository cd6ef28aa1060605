// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Twin lifecycle.
//!
//! ```text
//!                  activate                     deactivate
//!   Deactivated ─────────────▶ Activated ─────────────────▶ Deactivated
//!                              │     ▲
//!                              └─────┘
//!                   update (presented generation must be current)
//!                   report_connection_state
//! ```
//!
//! A twin exists exactly while it is activated. Activation claims the bound
//! endpoint, flipping it to `Activated`, and deactivation releases it. An
//! endpoint carries at most one twin; a second activation on it is refused
//! until the first twin is deactivated. Twins are only ever removed by
//! [`TwinRegistry::deactivate`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use census_core::error::{RegistryError, RegistryResult};
use census_core::types::{ConnectionState, OperationContext, Page, TwinId};
use census_core::{
    ChangeKind, TwinActivationRequest, TwinActivationResult, TwinInfo, TwinUpdateRequest,
};

use crate::cas::{Proposal, UpsertOutcome};
use crate::endpoints::EndpointRegistry;
use crate::notifier::Notifications;
use crate::queries::TwinQuery;
use crate::registry::RegistryContext;

/// Activates, updates and deactivates twins.
#[derive(Debug, Clone)]
pub struct TwinRegistry {
    context: Arc<RegistryContext>,
    endpoints: EndpointRegistry,
}

impl TwinRegistry {
    pub(crate) fn new(context: Arc<RegistryContext>, endpoints: EndpointRegistry) -> Self {
        Self { context, endpoints }
    }

    /// Returns a twin.
    pub async fn get(&self, id: &TwinId) -> RegistryResult<TwinInfo> {
        self.context
            .twins
            .find(id.as_str())
            .await?
            .ok_or_else(|| RegistryError::not_found("twin", id.as_str()))
    }

    /// Returns one page of matching twins.
    pub async fn query(
        &self,
        query: &TwinQuery,
        page_size: Option<usize>,
        continuation: Option<&str>,
    ) -> RegistryResult<Page<TwinInfo>> {
        Ok(self
            .context
            .twins
            .query(&query.to_filter(), page_size, continuation)
            .await?)
    }

    /// Activates a twin on a live endpoint.
    ///
    /// The endpoint is claimed first and released again if the twin cannot
    /// be created, so an endpoint carries at most one active twin.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the endpoint does not exist
    /// - `InvalidState` if the endpoint is not currently seen, already has
    ///   an active twin, or the twin id is active elsewhere
    pub async fn activate(
        &self,
        request: &TwinActivationRequest,
        context: &OperationContext,
    ) -> RegistryResult<TwinActivationResult> {
        request.validate()?;
        let mut notifications = Notifications::new();
        self.endpoints
            .claim(&request.endpoint_id, context, &mut notifications)
            .await?;

        let twin = match self.create(request, context).await {
            Ok(twin) => twin,
            Err(error) => {
                let released = self
                    .endpoints
                    .release(&request.endpoint_id, context, &mut notifications)
                    .await;
                if let Err(release_error) = released {
                    warn!(endpoint_id = %request.endpoint_id, error = %release_error, "Failed to release endpoint after rejected activation");
                }
                return Err(error);
            }
        };

        self.context
            .notifier
            .twin(ChangeKind::Activated, context, &twin, &mut notifications)
            .await;
        info!(twin_id = %twin.id, endpoint_id = %twin.endpoint_id, "Twin activated");

        let generation_id = twin
            .generation_id
            .clone()
            .ok_or_else(|| RegistryError::invalid_state("stored twin carries no generation"))?;
        notifications.into_result()?;
        Ok(TwinActivationResult {
            id: twin.id,
            generation_id,
        })
    }

    async fn create(&self, request: &TwinActivationRequest, context: &OperationContext) -> RegistryResult<TwinInfo> {
        let twin_id = request.twin_id();
        let outcome = self
            .context
            .writer
            .write(&self.context.twins, twin_id.as_str(), |current| match current {
                Some(_) => Err(RegistryError::invalid_state(format!(
                    "twin {} is already activated",
                    twin_id
                ))),
                None => Ok(Proposal::Write(TwinInfo::activate(request, context))),
            })
            .await?;
        match outcome {
            UpsertOutcome::Created(twin) => Ok(twin),
            _ => Err(RegistryError::invalid_state(format!(
                "twin {} is already activated",
                twin_id
            ))),
        }
    }

    /// Updates an activated twin.
    ///
    /// The request must present the twin's current generation. A twin
    /// written since it was read fails with `StaleVersion`; the caller
    /// re-reads and retries.
    pub async fn update(
        &self,
        id: &TwinId,
        request: &TwinUpdateRequest,
        context: &OperationContext,
    ) -> RegistryResult<TwinInfo> {
        if request.operation_timeout == Some(Duration::ZERO) {
            return Err(RegistryError::invalid_argument(
                "operation_timeout",
                "must be greater than zero",
            ));
        }

        let outcome = self
            .context
            .writer
            .write(&self.context.twins, id.as_str(), |current| {
                let current = current.ok_or_else(|| RegistryError::not_found("twin", id.as_str()))?;
                if current.generation_id.as_ref() != Some(&request.generation_id) {
                    return Err(RegistryError::stale_version(
                        "twin",
                        id.as_str(),
                        request.generation_id.as_str(),
                    ));
                }
                let mut next = current.clone();
                if !next.apply(request) {
                    return Ok(Proposal::Keep);
                }
                next.updated = Some(context.clone());
                Ok(Proposal::Write(next))
            })
            .await?;

        self.settle(outcome, id, context).await
    }

    /// Records the session state reported for a twin.
    pub async fn report_connection_state(
        &self,
        id: &TwinId,
        state: ConnectionState,
        context: &OperationContext,
    ) -> RegistryResult<TwinInfo> {
        let outcome = self
            .context
            .writer
            .write(&self.context.twins, id.as_str(), |current| {
                let current = current.ok_or_else(|| RegistryError::not_found("twin", id.as_str()))?;
                if current.connection_state == state {
                    return Ok(Proposal::Keep);
                }
                let mut next = current.clone();
                next.connection_state = state;
                next.updated = Some(context.clone());
                Ok(Proposal::Write(next))
            })
            .await?;

        self.settle(outcome, id, context).await
    }

    /// Deactivates a twin, returning its last known state.
    pub async fn deactivate(&self, id: &TwinId, context: &OperationContext) -> RegistryResult<TwinInfo> {
        let outcome = self
            .context
            .writer
            .write(&self.context.twins, id.as_str(), |current| match current {
                Some(_) => Ok(Proposal::Delete),
                None => Err(RegistryError::not_found("twin", id.as_str())),
            })
            .await?;
        let UpsertOutcome::Deleted(twin) = outcome else {
            return Err(RegistryError::not_found("twin", id.as_str()));
        };

        let mut notifications = Notifications::new();
        self.endpoints
            .release(&twin.endpoint_id, context, &mut notifications)
            .await?;

        self.context
            .notifier
            .twin(ChangeKind::Deactivated, context, &twin, &mut notifications)
            .await;
        info!(twin_id = %twin.id, endpoint_id = %twin.endpoint_id, "Twin deactivated");

        notifications.into_result()?;
        Ok(twin)
    }

    async fn settle(
        &self,
        outcome: UpsertOutcome<TwinInfo>,
        id: &TwinId,
        context: &OperationContext,
    ) -> RegistryResult<TwinInfo> {
        let mut notifications = Notifications::new();
        if let UpsertOutcome::Updated { after, .. } = &outcome {
            self.context
                .notifier
                .twin(ChangeKind::Updated, context, after, &mut notifications)
                .await;
        }
        notifications.into_result()?;
        outcome
            .into_after()
            .ok_or_else(|| RegistryError::not_found("twin", id.as_str()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use census_core::types::{ActivationState, ApplicationId, GenerationId};
    use census_core::{ApplicationInfo, ApplicationType, EndpointInfo};
    use census_store::{DocumentStore, MemoryDocumentStore};

    use crate::registry::{Registry, RegistryConfig};

    async fn registry_with_endpoint() -> (Registry, EndpointInfo) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::default());
        let registry = Registry::builder(store)
            .config(RegistryConfig::for_testing())
            .build();
        let app = ApplicationInfo::new("urn:demo:server1", ApplicationType::Server);
        let endpoint = EndpointInfo::new(ApplicationId::new(""), "opc.tcp://host:4840", None);
        let registration = registry
            .applications()
            .register(app, vec![endpoint], &OperationContext::system())
            .await
            .unwrap();
        let endpoint = registration.endpoints[0].clone();
        (registry, endpoint)
    }

    #[tokio::test]
    async fn test_activate_sets_connecting_and_flips_endpoint() {
        let (registry, endpoint) = registry_with_endpoint().await;
        let ctx = OperationContext::system();

        let result = registry
            .twins()
            .activate(&TwinActivationRequest::new(endpoint.id.clone()), &ctx)
            .await
            .unwrap();
        assert_eq!(result.id.as_str(), endpoint.id.as_str());

        let twin = registry.twins().get(&result.id).await.unwrap();
        assert_eq!(twin.connection_state, ConnectionState::Connecting);
        assert_eq!(twin.generation_id, Some(result.generation_id));

        let endpoint = registry.endpoints().get(&endpoint.id).await.unwrap();
        assert_eq!(endpoint.activation_state, ActivationState::Activated);
    }

    #[tokio::test]
    async fn test_activate_twice_is_invalid_state() {
        let (registry, endpoint) = registry_with_endpoint().await;
        let ctx = OperationContext::system();
        let request = TwinActivationRequest::new(endpoint.id.clone());
        registry.twins().activate(&request, &ctx).await.unwrap();

        let again = registry.twins().activate(&request, &ctx).await;
        assert!(matches!(again, Err(RegistryError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_update_requires_current_generation() {
        let (registry, endpoint) = registry_with_endpoint().await;
        let ctx = OperationContext::system();
        let activated = registry
            .twins()
            .activate(&TwinActivationRequest::new(endpoint.id.clone()), &ctx)
            .await
            .unwrap();

        let stale = TwinUpdateRequest::new(GenerationId::new("g0"))
            .with_operation_timeout(Duration::from_secs(5));
        let result = registry.twins().update(&activated.id, &stale, &ctx).await;
        assert!(matches!(result, Err(RegistryError::StaleVersion { .. })));

        let current = TwinUpdateRequest::new(activated.generation_id.clone())
            .with_operation_timeout(Duration::from_secs(5));
        let twin = registry.twins().update(&activated.id, &current, &ctx).await.unwrap();
        assert_eq!(twin.operation_timeout, Some(Duration::from_secs(5)));
        assert_ne!(twin.generation_id, Some(activated.generation_id));
    }

    #[tokio::test]
    async fn test_report_connection_state() {
        let (registry, endpoint) = registry_with_endpoint().await;
        let ctx = OperationContext::system();
        let activated = registry
            .twins()
            .activate(&TwinActivationRequest::new(endpoint.id.clone()), &ctx)
            .await
            .unwrap();

        let twin = registry
            .twins()
            .report_connection_state(&activated.id, ConnectionState::Connected, &ctx)
            .await
            .unwrap();
        assert_eq!(twin.connection_state, ConnectionState::Connected);

        let missing = registry
            .twins()
            .report_connection_state(&TwinId::new("nope"), ConnectionState::Error, &ctx)
            .await;
        assert!(matches!(missing, Err(e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_deactivate_removes_twin_and_flips_endpoint_back() {
        let (registry, endpoint) = registry_with_endpoint().await;
        let ctx = OperationContext::system();
        let activated = registry
            .twins()
            .activate(&TwinActivationRequest::new(endpoint.id.clone()), &ctx)
            .await
            .unwrap();

        let last = registry.twins().deactivate(&activated.id, &ctx).await.unwrap();
        assert_eq!(last.id, activated.id);
        assert!(registry.twins().get(&activated.id).await.unwrap_err().is_not_found());

        let endpoint = registry.endpoints().get(&endpoint.id).await.unwrap();
        assert_eq!(endpoint.activation_state, ActivationState::Deactivated);

        let again = registry.twins().deactivate(&activated.id, &ctx).await;
        assert!(matches!(again, Err(e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_activate_unknown_endpoint_is_not_found() {
        let (registry, _) = registry_with_endpoint().await;
        let result = registry
            .twins()
            .activate(
                &TwinActivationRequest::new("missing".into()),
                &OperationContext::system(),
            )
            .await;
        assert!(matches!(result, Err(e) if e.is_not_found()));
    }

    async fn twins_on(registry: &Registry, endpoint: &EndpointInfo) -> usize {
        registry
            .twins()
            .query(&TwinQuery::on_endpoint(endpoint.id.clone()), None, None)
            .await
            .unwrap()
            .items
            .len()
    }

    #[tokio::test]
    async fn test_second_twin_on_endpoint_is_refused() {
        let (registry, endpoint) = registry_with_endpoint().await;
        let ctx = OperationContext::system();
        registry
            .twins()
            .activate(&TwinActivationRequest::new(endpoint.id.clone()), &ctx)
            .await
            .unwrap();

        let second = TwinActivationRequest::new(endpoint.id.clone()).with_id(TwinId::new("t2"));
        let refused = registry.twins().activate(&second, &ctx).await;
        assert!(matches!(refused, Err(RegistryError::InvalidState { .. })));
        assert!(registry.twins().get(&TwinId::new("t2")).await.unwrap_err().is_not_found());
        assert_eq!(twins_on(&registry, &endpoint).await, 1);
    }

    #[tokio::test]
    async fn test_rejected_twin_id_releases_endpoint() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::default());
        let registry = Registry::builder(store)
            .config(RegistryConfig::for_testing())
            .build();
        let ctx = OperationContext::system();
        let registration = registry
            .applications()
            .register(
                ApplicationInfo::new("urn:demo:server1", ApplicationType::Server),
                vec![
                    EndpointInfo::new(ApplicationId::new(""), "opc.tcp://host:4840", None),
                    EndpointInfo::new(ApplicationId::new(""), "opc.tcp://host:4841", None),
                ],
                &ctx,
            )
            .await
            .unwrap();
        let (first, second) = (&registration.endpoints[0], &registration.endpoints[1]);

        let shared = TwinId::new("shared");
        registry
            .twins()
            .activate(&TwinActivationRequest::new(first.id.clone()).with_id(shared.clone()), &ctx)
            .await
            .unwrap();
        let refused = registry
            .twins()
            .activate(&TwinActivationRequest::new(second.id.clone()).with_id(shared.clone()), &ctx)
            .await;
        assert!(matches!(refused, Err(RegistryError::InvalidState { .. })));

        let second = registry.endpoints().get(&second.id).await.unwrap();
        assert_eq!(second.activation_state, ActivationState::Deactivated);
        assert_eq!(registry.twins().get(&shared).await.unwrap().endpoint_id, first.id);
    }

    #[tokio::test]
    async fn test_concurrent_activations_bind_one_twin() {
        let (registry, endpoint) = registry_with_endpoint().await;
        let ctx = OperationContext::system();
        let first = TwinActivationRequest::new(endpoint.id.clone()).with_id(TwinId::new("t1"));
        let second = TwinActivationRequest::new(endpoint.id.clone()).with_id(TwinId::new("t2"));

        let (a, b) = tokio::join!(
            registry.twins().activate(&first, &ctx),
            registry.twins().activate(&second, &ctx)
        );
        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        assert_eq!(twins_on(&registry, &endpoint).await, 1);
    }

    #[tokio::test]
    async fn test_deactivate_racing_activate_leaves_consistent_endpoint() {
        let (registry, endpoint) = registry_with_endpoint().await;
        let ctx = OperationContext::system();
        let t1 = registry
            .twins()
            .activate(&TwinActivationRequest::new(endpoint.id.clone()).with_id(TwinId::new("t1")), &ctx)
            .await
            .unwrap();
        let next = TwinActivationRequest::new(endpoint.id.clone()).with_id(TwinId::new("t2"));

        let (removed, activated) = tokio::join!(
            registry.twins().deactivate(&t1.id, &ctx),
            registry.twins().activate(&next, &ctx)
        );
        removed.unwrap();

        let stored = registry.endpoints().get(&endpoint.id).await.unwrap();
        let bound = twins_on(&registry, &endpoint).await;
        assert_eq!(stored.activation_state.is_activated(), bound == 1);
        assert_eq!(activated.is_ok(), bound == 1);
    }
}
