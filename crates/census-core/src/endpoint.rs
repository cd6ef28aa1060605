// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Endpoint records.
//!
//! An [`EndpointInfo`] belongs to exactly one application. Its identity is the
//! endpoint url plus security mode and policy, scoped to the owning
//! application id. A record whose [`EndpointDescription`] is missing is
//! treated as `None`/`None` security for identity purposes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::ApplicationInfo;
use crate::error::{RegistryError, RegistryResult};
use crate::identity::{eq_ignore_case, normalize, ContentEq, SameAs};
use crate::merge::union_scalar;
use crate::staleness::Watermarked;
use crate::types::{
    ActivationState, ApplicationId, AuthenticationMethod, DiscovererId, EndpointId, EndpointState,
    GenerationId, OperationContext, SecurityMode, SecurityPolicy,
};

/// Prefix of derived endpoint ids.
pub const ENDPOINT_ID_PREFIX: &str = "uae";

// =============================================================================
// EndpointDescription
// =============================================================================

/// Security description of an endpoint as advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EndpointDescription {
    /// Alternative urls the endpoint is reachable under.
    #[serde(default)]
    pub alternative_urls: BTreeSet<String>,

    /// Message security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,

    /// Server certificate thumbprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl EndpointDescription {
    /// Creates a description.
    pub fn new(security_mode: SecurityMode, security_policy: SecurityPolicy) -> Self {
        Self {
            alternative_urls: BTreeSet::new(),
            security_mode,
            security_policy,
            certificate: None,
        }
    }

    /// Adds an alternative url.
    pub fn with_alternative_url(mut self, url: impl Into<String>) -> Self {
        self.alternative_urls.insert(url.into());
        self
    }

    /// Sets the certificate thumbprint.
    pub fn with_certificate(mut self, thumbprint: impl Into<String>) -> Self {
        self.certificate = Some(thumbprint.into());
        self
    }
}

// =============================================================================
// EndpointInfo
// =============================================================================

/// Canonical registry record of an OPC UA endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Derived endpoint id.
    pub id: EndpointId,

    /// Owning application.
    pub application_id: ApplicationId,

    /// Endpoint url (identity).
    pub endpoint_url: String,

    /// Security description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointDescription>,

    /// Relative security level advertised by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_level: Option<u8>,

    /// Accepted user authentication methods.
    #[serde(default)]
    pub authentication_methods: BTreeSet<AuthenticationMethod>,

    /// Whether a twin is bound to the endpoint.
    #[serde(default)]
    pub activation_state: ActivationState,

    /// Last reported reachability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_state: Option<EndpointState>,

    /// Site the endpoint was found in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,

    /// Discoverer owning the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverer_id: Option<DiscovererId>,

    /// Set when the owning discoverer stopped seeing the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_seen_since: Option<DateTime<Utc>>,

    /// Concurrency token of the persisted record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<GenerationId>,

    /// Creation context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<OperationContext>,

    /// Last update context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<OperationContext>,
}

impl EndpointInfo {
    /// Creates an endpoint of `application_id` with a derived id.
    pub fn new(
        application_id: ApplicationId,
        endpoint_url: impl Into<String>,
        endpoint: Option<EndpointDescription>,
    ) -> Self {
        let endpoint_url = endpoint_url.into();
        let (mode, policy) = security_of(endpoint.as_ref());
        Self {
            id: Self::derive_id(&application_id, &endpoint_url, mode, policy),
            application_id,
            endpoint_url,
            endpoint,
            security_level: None,
            authentication_methods: BTreeSet::new(),
            activation_state: ActivationState::Deactivated,
            endpoint_state: None,
            site_id: None,
            discoverer_id: None,
            not_seen_since: None,
            generation_id: None,
            created: None,
            updated: None,
        }
    }

    /// Derives the endpoint id from the identity fields.
    pub fn derive_id(
        application_id: &ApplicationId,
        endpoint_url: &str,
        security_mode: SecurityMode,
        security_policy: SecurityPolicy,
    ) -> EndpointId {
        let name = format!(
            "{}|{}|{}|{}",
            application_id,
            normalize(endpoint_url),
            security_mode.name(),
            security_policy.uri()
        );
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes());
        EndpointId::new(format!("{}{}", ENDPOINT_ID_PREFIX, uuid.simple()))
    }

    /// Re-parents the endpoint onto `application` and recomputes its id.
    ///
    /// Discovery reports carry endpoints before the application id is known;
    /// this binds them. Site and owner are inherited when unset.
    pub fn bind_to(mut self, application: &ApplicationInfo) -> Self {
        self.application_id = application.application_id.clone();
        if self.site_id.is_none() {
            self.site_id.clone_from(&application.site_id);
        }
        if self.discoverer_id.is_none() {
            self.discoverer_id.clone_from(&application.discoverer_id);
        }
        let (mode, policy) = self.security();
        self.id = Self::derive_id(&self.application_id, &self.endpoint_url, mode, policy);
        self
    }

    /// Returns the effective security mode and policy.
    pub fn security(&self) -> (SecurityMode, SecurityPolicy) {
        security_of(self.endpoint.as_ref())
    }

    /// Sets the security level.
    pub fn with_security_level(mut self, level: u8) -> Self {
        self.security_level = Some(level);
        self
    }

    /// Adds an authentication method.
    pub fn with_authentication(mut self, method: AuthenticationMethod) -> Self {
        self.authentication_methods.insert(method);
        self
    }

    /// Sets the owning discoverer.
    pub fn with_discoverer(mut self, discoverer_id: DiscovererId) -> Self {
        self.discoverer_id = Some(discoverer_id);
        self
    }

    /// Returns `true` if the owning discoverer no longer sees the endpoint.
    #[inline]
    pub fn is_stale(&self) -> bool {
        self.not_seen_since.is_some()
    }

    /// Returns `true` if `discoverer_id` owns the record.
    pub fn is_owned_by(&self, discoverer_id: &DiscovererId) -> bool {
        self.discoverer_id.as_ref() == Some(discoverer_id)
    }

    /// Checks the persisted-record invariants.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.endpoint_url.trim().is_empty() {
            return Err(RegistryError::invalid_argument("endpoint_url", "cannot be empty"));
        }
        if self.application_id.as_str().is_empty() {
            return Err(RegistryError::invalid_argument(
                "application_id",
                "endpoint must belong to an application",
            ));
        }
        Ok(())
    }

    /// Order-independent union with another report of the same endpoint.
    ///
    /// When this record has no security description it adopts the other's.
    /// Otherwise only alternative urls are unioned; the remaining description
    /// fields are identity and already agree. A differing certificate resolves
    /// to the greater thumbprint.
    pub fn union_with(&mut self, other: &EndpointInfo) {
        if other.endpoint_url < self.endpoint_url {
            self.endpoint_url.clone_from(&other.endpoint_url);
        }
        match (&mut self.endpoint, &other.endpoint) {
            (None, Some(incoming)) => self.endpoint = Some(incoming.clone()),
            (Some(existing), Some(incoming)) => {
                existing
                    .alternative_urls
                    .extend(incoming.alternative_urls.iter().cloned());
                union_scalar(&mut existing.certificate, &incoming.certificate);
            }
            (_, None) => {}
        }

        self.authentication_methods
            .extend(other.authentication_methods.iter().cloned());
        union_scalar(&mut self.security_level, &other.security_level);
        union_scalar(&mut self.endpoint_state, &other.endpoint_state);
        union_scalar(&mut self.site_id, &other.site_id);
        union_scalar(&mut self.discoverer_id, &other.discoverer_id);
    }

    /// Folds a report of the record's owner into the persisted record.
    ///
    /// Activation state, ownership and watermark are left untouched.
    pub fn refresh_from(&mut self, discovered: &EndpointInfo) {
        self.fold(discovered, true);
    }

    /// Folds a report of a discoverer that does not own the record.
    ///
    /// Alternative urls and authentication methods are unioned; stored
    /// scalars are only filled where still empty.
    pub fn absorb_from(&mut self, discovered: &EndpointInfo) {
        self.fold(discovered, false);
    }

    fn fold(&mut self, discovered: &EndpointInfo, replace: bool) {
        match (&mut self.endpoint, &discovered.endpoint) {
            (None, Some(incoming)) => self.endpoint = Some(incoming.clone()),
            (Some(existing), Some(incoming)) => {
                existing
                    .alternative_urls
                    .extend(incoming.alternative_urls.iter().cloned());
                if incoming.certificate.is_some() && (replace || existing.certificate.is_none()) {
                    existing.certificate.clone_from(&incoming.certificate);
                }
            }
            (_, None) => {}
        }
        self.authentication_methods
            .extend(discovered.authentication_methods.iter().cloned());
        if discovered.security_level.is_some() && (replace || self.security_level.is_none()) {
            self.security_level = discovered.security_level;
        }
        if discovered.endpoint_state.is_some() && (replace || self.endpoint_state.is_none()) {
            self.endpoint_state = discovered.endpoint_state;
        }
        if discovered.site_id.is_some() && (replace || self.site_id.is_none()) {
            self.site_id.clone_from(&discovered.site_id);
        }
    }
}

fn security_of(endpoint: Option<&EndpointDescription>) -> (SecurityMode, SecurityPolicy) {
    endpoint
        .map(|e| (e.security_mode, e.security_policy))
        .unwrap_or_default()
}

impl SameAs for EndpointInfo {
    fn identity_eq(&self, other: &Self) -> bool {
        self.application_id == other.application_id
            && eq_ignore_case(&self.endpoint_url, &other.endpoint_url)
            && self.security() == other.security()
    }
}

impl ContentEq for EndpointInfo {
    fn content_eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.application_id == other.application_id
            && self.endpoint_url == other.endpoint_url
            && self.endpoint == other.endpoint
            && self.security_level == other.security_level
            && self.authentication_methods == other.authentication_methods
            && self.activation_state == other.activation_state
            && self.endpoint_state == other.endpoint_state
            && self.site_id == other.site_id
            && self.discoverer_id == other.discoverer_id
    }
}

impl Watermarked for EndpointInfo {
    fn not_seen_since(&self) -> Option<DateTime<Utc>> {
        self.not_seen_since
    }

    fn set_not_seen_since(&mut self, value: Option<DateTime<Utc>>) {
        self.not_seen_since = value;
    }
}

// =============================================================================
// Tests
// =============================================================================
