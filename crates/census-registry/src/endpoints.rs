// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Endpoint registry.

use std::sync::Arc;

use tracing::debug;

use census_core::error::{RegistryError, RegistryResult};
use census_core::types::{ActivationState, ApplicationId, EndpointId, OperationContext, Page};
use census_core::{ChangeKind, EndpointInfo};

use crate::cas::{Proposal, UpsertOutcome};
use crate::notifier::Notifications;
use crate::queries::EndpointQuery;
use crate::registry::RegistryContext;

/// Reads endpoints and flips their activation state.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    context: Arc<RegistryContext>,
}

impl EndpointRegistry {
    pub(crate) fn new(context: Arc<RegistryContext>) -> Self {
        Self { context }
    }

    /// Returns an endpoint.
    pub async fn get(&self, id: &EndpointId) -> RegistryResult<EndpointInfo> {
        self.context
            .endpoints
            .find(id.as_str())
            .await?
            .ok_or_else(|| RegistryError::not_found("endpoint", id.as_str()))
    }

    /// Returns one page of matching endpoints.
    pub async fn query(
        &self,
        query: &EndpointQuery,
        page_size: Option<usize>,
        continuation: Option<&str>,
    ) -> RegistryResult<Page<EndpointInfo>> {
        Ok(self
            .context
            .endpoints
            .query(&query.to_filter(), page_size, continuation)
            .await?)
    }

    /// Returns every endpoint of an application, seen or not.
    pub async fn list_by_application(
        &self,
        application_id: &ApplicationId,
    ) -> RegistryResult<Vec<EndpointInfo>> {
        let filter = EndpointQuery::of_application(application_id.clone()).to_filter();
        Ok(self.context.endpoints.query_all(&filter).await?)
    }

    /// Claims a live endpoint for a twin, flipping it to `Activated`.
    ///
    /// The endpoint record is the single point a concurrent activation
    /// races on: only one claim succeeds until the endpoint is released.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the endpoint does not exist
    /// - `InvalidState` if the endpoint is not currently seen or already
    ///   carries an active twin
    pub async fn claim(
        &self,
        id: &EndpointId,
        context: &OperationContext,
        notifications: &mut Notifications,
    ) -> RegistryResult<EndpointInfo> {
        let outcome = self
            .context
            .writer
            .write(&self.context.endpoints, id.as_str(), |current| {
                let current = current.ok_or_else(|| RegistryError::not_found("endpoint", id.as_str()))?;
                if current.is_stale() {
                    return Err(RegistryError::invalid_state(format!(
                        "endpoint {} is not currently seen",
                        id
                    )));
                }
                if current.activation_state.is_activated() {
                    return Err(RegistryError::invalid_state(format!(
                        "endpoint {} already has an active twin",
                        id
                    )));
                }
                let mut next = current.clone();
                next.activation_state = ActivationState::Activated;
                next.updated = Some(context.clone());
                Ok(Proposal::Write(next))
            })
            .await?;

        self.announce(&outcome, context, notifications).await;
        outcome
            .into_after()
            .ok_or_else(|| RegistryError::not_found("endpoint", id.as_str()))
    }

    /// Releases an endpoint, flipping it back to `Deactivated`.
    ///
    /// Releasing an endpoint that no longer exists is a no-op so a twin can
    /// always be removed.
    pub async fn release(
        &self,
        id: &EndpointId,
        context: &OperationContext,
        notifications: &mut Notifications,
    ) -> RegistryResult<Option<EndpointInfo>> {
        let outcome = self
            .context
            .writer
            .write(&self.context.endpoints, id.as_str(), |current| {
                let Some(current) = current else {
                    return Ok(Proposal::Keep);
                };
                if !current.activation_state.is_activated() {
                    return Ok(Proposal::Keep);
                }
                let mut next = current.clone();
                next.activation_state = ActivationState::Deactivated;
                next.updated = Some(context.clone());
                Ok(Proposal::Write(next))
            })
            .await?;

        self.announce(&outcome, context, notifications).await;
        Ok(outcome.into_after())
    }

    async fn announce(
        &self,
        outcome: &UpsertOutcome<EndpointInfo>,
        context: &OperationContext,
        notifications: &mut Notifications,
    ) {
        if let UpsertOutcome::Updated { after, .. } = outcome {
            debug!(endpoint_id = %after.id, state = ?after.activation_state, "Endpoint activation changed");
            self.context
                .notifier
                .endpoint(ChangeKind::Updated, context, after, notifications)
                .await;
        }
    }
}
