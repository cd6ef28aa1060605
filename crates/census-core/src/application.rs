// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application records.
//!
//! An [`ApplicationInfo`] is the canonical registry entry for one OPC UA
//! application. Its identity is the application uri together with the
//! application type; the owning discoverer, the concurrency token and the
//! audit contexts are operational metadata and never part of identity.
//!
//! # Example
//!
//! ```
//! use census_core::application::ApplicationInfo;
//! use census_core::identity::SameAs;
//! use census_core::types::{ApplicationType, DiscovererId};
//!
//! let a = ApplicationInfo::new("urn:demo:server1", ApplicationType::Server)
//!     .with_discoverer(DiscovererId::new("disc-a"));
//! let b = ApplicationInfo::new("URN:demo:server1", ApplicationType::Server)
//!     .with_discoverer(DiscovererId::new("disc-b"));
//!
//! assert!(a.is_same_as(&b));
//! assert_eq!(a.application_id, b.application_id);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RegistryError, RegistryResult};
use crate::identity::{eq_ignore_case, normalize, ContentEq, SameAs};
use crate::merge::union_scalar;
use crate::staleness::Watermarked;
use crate::types::{
    ApplicationId, ApplicationType, DiscovererId, GenerationId, OperationContext,
};

/// Prefix of derived application ids.
pub const APPLICATION_ID_PREFIX: &str = "uas";

// =============================================================================
// ApplicationInfo
// =============================================================================

/// Canonical registry record of an OPC UA application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    /// Derived application id.
    pub application_id: ApplicationId,

    /// Application type.
    #[serde(default)]
    pub application_type: ApplicationType,

    /// Application uri (identity).
    pub application_uri: String,

    /// Product uri.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_uri: Option<String>,

    /// Default display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,

    /// Locale of the default display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Display names keyed by locale.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub localized_names: BTreeMap<String, String>,

    /// Server capabilities.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Discovery urls.
    #[serde(default)]
    pub discovery_urls: BTreeSet<String>,

    /// Addresses of the hosts the application was found on.
    #[serde(default)]
    pub host_addresses: BTreeSet<String>,

    /// Discovery profile uri.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_profile_uri: Option<String>,

    /// Gateway server uri.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_server_uri: Option<String>,

    /// Site the application was found in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,

    /// Discoverer owning the record. `None` when no discoverer owns it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverer_id: Option<DiscovererId>,

    /// Set when the owning discoverer stopped seeing the application.
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

impl ApplicationInfo {
    /// Creates an application record with a derived id.
    pub fn new(application_uri: impl Into<String>, application_type: ApplicationType) -> Self {
        let application_uri = application_uri.into();
        Self {
            application_id: Self::derive_id(&application_uri, application_type),
            application_type,
            application_uri,
            product_uri: None,
            application_name: None,
            locale: None,
            localized_names: BTreeMap::new(),
            capabilities: BTreeSet::new(),
            discovery_urls: BTreeSet::new(),
            host_addresses: BTreeSet::new(),
            discovery_profile_uri: None,
            gateway_server_uri: None,
            site_id: None,
            discoverer_id: None,
            not_seen_since: None,
            generation_id: None,
            created: None,
            updated: None,
        }
    }

    /// Derives the application id from the identity fields.
    ///
    /// Equal identities always produce equal ids, so concurrent creators of
    /// the same application race on one document.
    pub fn derive_id(application_uri: &str, application_type: ApplicationType) -> ApplicationId {
        let name = format!("{}|{}", application_type.name(), normalize(application_uri));
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes());
        ApplicationId::new(format!("{}{}", APPLICATION_ID_PREFIX, uuid.simple()))
    }

    /// Recomputes the id from the current identity fields.
    pub fn with_derived_id(mut self) -> Self {
        self.application_id = Self::derive_id(&self.application_uri, self.application_type);
        self
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Adds a localized display name.
    pub fn with_localized_name(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.localized_names.insert(locale.into(), name.into());
        self
    }

    /// Sets the product uri.
    pub fn with_product_uri(mut self, uri: impl Into<String>) -> Self {
        self.product_uri = Some(uri.into());
        self
    }

    /// Adds a capability.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Adds a discovery url.
    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_urls.insert(url.into());
        self
    }

    /// Adds a host address.
    pub fn with_host_address(mut self, address: impl Into<String>) -> Self {
        self.host_addresses.insert(address.into());
        self
    }

    /// Sets the owning discoverer.
    pub fn with_discoverer(mut self, discoverer_id: DiscovererId) -> Self {
        self.discoverer_id = Some(discoverer_id);
        self
    }

    /// Sets the site.
    pub fn with_site(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    /// Returns `true` if the owning discoverer no longer sees the application.
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
        if self.application_uri.trim().is_empty() {
            return Err(RegistryError::invalid_argument(
                "application_uri",
                "cannot be empty",
            ));
        }
        let expected = Self::derive_id(&self.application_uri, self.application_type);
        if self.application_id != expected {
            return Err(RegistryError::invalid_argument(
                "application_id",
                format!("does not match identity (expected {})", expected),
            ));
        }
        Ok(())
    }

    /// Order-independent union with another report of the same application.
    ///
    /// Collection fields are unioned. Conflicting scalar fields resolve to
    /// the greater value so the result does not depend on arrival order.
    pub fn union_with(&mut self, other: &ApplicationInfo) {
        if other.application_uri < self.application_uri {
            self.application_uri.clone_from(&other.application_uri);
        }
        self.capabilities.extend(other.capabilities.iter().cloned());
        self.discovery_urls.extend(other.discovery_urls.iter().cloned());
        self.host_addresses.extend(other.host_addresses.iter().cloned());
        for (locale, name) in &other.localized_names {
            match self.localized_names.get_mut(locale) {
                Some(existing) if *existing >= *name => {}
                Some(existing) => *existing = name.clone(),
                None => {
                    self.localized_names.insert(locale.clone(), name.clone());
                }
            }
        }

        union_scalar(&mut self.product_uri, &other.product_uri);
        union_scalar(&mut self.application_name, &other.application_name);
        union_scalar(&mut self.locale, &other.locale);
        union_scalar(&mut self.discovery_profile_uri, &other.discovery_profile_uri);
        union_scalar(&mut self.gateway_server_uri, &other.gateway_server_uri);
        union_scalar(&mut self.site_id, &other.site_id);
        union_scalar(&mut self.discoverer_id, &other.discoverer_id);
    }

    /// Folds a report of the record's owner into the persisted record.
    ///
    /// Collection fields are unioned. Descriptive scalars reported by the
    /// owner replace the stored ones; scalars the report leaves empty keep
    /// their stored value. Ownership and watermark are left untouched.
    pub fn refresh_from(&mut self, discovered: &ApplicationInfo) {
        self.fold(discovered, true);
    }

    /// Folds a report of a discoverer that does not own the record.
    ///
    /// Collection fields are unioned but stored scalars and localized names
    /// are kept; the report only fills the ones still empty. Repeating the
    /// same reports in any order therefore changes nothing.
    pub fn absorb_from(&mut self, discovered: &ApplicationInfo) {
        self.fold(discovered, false);
    }

    fn fold(&mut self, discovered: &ApplicationInfo, replace: bool) {
        self.capabilities.extend(discovered.capabilities.iter().cloned());
        self.discovery_urls.extend(discovered.discovery_urls.iter().cloned());
        self.host_addresses.extend(discovered.host_addresses.iter().cloned());
        for (locale, name) in &discovered.localized_names {
            if replace || !self.localized_names.contains_key(locale) {
                self.localized_names.insert(locale.clone(), name.clone());
            }
        }

        let take = |target: &mut Option<String>, source: &Option<String>| {
            if source.is_some() && (replace || target.is_none()) {
                target.clone_from(source);
            }
        };
        take(&mut self.product_uri, &discovered.product_uri);
        take(&mut self.application_name, &discovered.application_name);
        take(&mut self.locale, &discovered.locale);
        take(&mut self.discovery_profile_uri, &discovered.discovery_profile_uri);
        take(&mut self.gateway_server_uri, &discovered.gateway_server_uri);
        take(&mut self.site_id, &discovered.site_id);
    }
}

impl SameAs for ApplicationInfo {
    fn identity_eq(&self, other: &Self) -> bool {
        self.application_type == other.application_type
            && eq_ignore_case(&self.application_uri, &other.application_uri)
    }
}

impl ContentEq for ApplicationInfo {
    fn content_eq(&self, other: &Self) -> bool {
        self.application_id == other.application_id
            && self.application_type == other.application_type
            && self.application_uri == other.application_uri
            && self.product_uri == other.product_uri
            && self.application_name == other.application_name
            && self.locale == other.locale
            && self.localized_names == other.localized_names
            && self.capabilities == other.capabilities
            && self.discovery_urls == other.discovery_urls
            && self.host_addresses == other.host_addresses
            && self.discovery_profile_uri == other.discovery_profile_uri
            && self.gateway_server_uri == other.gateway_server_uri
            && self.site_id == other.site_id
            && self.discoverer_id == other.discoverer_id
    }
}

impl Watermarked for ApplicationInfo {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn app(uri: &str) -> ApplicationInfo {
        ApplicationInfo::new(uri, ApplicationType::Server)
    }

    #[test]
    fn test_identity_ignores_operational_metadata() {
        let a = app("urn:demo:server1");
        let mut b = a.clone();
        b.generation_id = Some(GenerationId::next());
        b.created = Some(OperationContext::new("someone"));
        b.updated = Some(OperationContext::new("someone-else"));
        b.not_seen_since = Some(Utc::now());
        b.discoverer_id = Some(DiscovererId::new("other"));

        assert!(a.is_same_as(&b));
        assert!(b.is_same_as(&a));
    }

    #[test]
    fn test_identity_includes_type() {
        let server = app("urn:demo:server1");
        let client = ApplicationInfo::new("urn:demo:server1", ApplicationType::Client);
        assert!(!server.is_same_as(&client));
        assert_ne!(server.application_id, client.application_id);
    }

    #[test]
    fn test_derived_id_prefix_and_case() {
        let a = app("urn:Demo:Server1");
        let b = app("urn:demo:server1");
        assert!(a.application_id.as_str().starts_with(APPLICATION_ID_PREFIX));
        assert_eq!(a.application_id, b.application_id);
    }

    #[test]
    fn test_validate_rejects_empty_uri() {
        let a = app("  ");
        assert!(a.validate().is_err());
        assert!(app("urn:x").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_foreign_id() {
        let mut a = app("urn:x");
        a.application_id = ApplicationId::new("uas-forged");
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_union_is_commutative() {
        let a = app("urn:x")
            .with_capability("LDS")
            .with_host_address("10.0.0.1")
            .with_name("Alpha");
        let b = app("urn:x")
            .with_capability("DA")
            .with_discovery_url("opc.tcp://h:4840")
            .with_name("Beta");

        let mut ab = a.clone();
        ab.union_with(&b);
        let mut ba = b.clone();
        ba.union_with(&a);

        assert_eq!(ab, ba);
        assert_eq!(ab.capabilities.len(), 2);
        assert_eq!(ab.application_name.as_deref(), Some("Beta"));
    }

    #[test]
    fn test_refresh_prefers_discovered_scalars() {
        let mut stored = app("urn:x").with_name("Old").with_capability("A");
        stored.discoverer_id = Some(DiscovererId::new("d1"));
        let discovered = app("urn:x").with_name("New").with_capability("B");

        stored.refresh_from(&discovered);

        assert_eq!(stored.application_name.as_deref(), Some("New"));
        assert_eq!(stored.capabilities.len(), 2);
        assert_eq!(stored.discoverer_id, Some(DiscovererId::new("d1")));
    }

    #[test]
    fn test_absorb_keeps_stored_scalars() {
        let mut stored = app("urn:x").with_name("Press A").with_capability("A");
        let discovered = app("urn:x")
            .with_name("Press B")
            .with_product_uri("urn:vendor:press")
            .with_capability("B");

        stored.absorb_from(&discovered);
        let once = stored.clone();
        stored.absorb_from(&discovered);

        assert_eq!(stored, once);
        assert_eq!(stored.application_name.as_deref(), Some("Press A"));
        assert_eq!(stored.product_uri.as_deref(), Some("urn:vendor:press"));
        assert_eq!(stored.capabilities.len(), 2);
    }

    #[test]
    fn test_content_eq_ignores_metadata_only() {
        let a = app("urn:x").with_capability("A");
        let mut b = a.clone();
        b.generation_id = Some(GenerationId::next());
        b.not_seen_since = Some(Utc::now());
        assert!(a.content_eq(&b));

        b.capabilities.insert("B".into());
        assert!(!a.content_eq(&b));
    }
}
