// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Registry query filters.
//!
//! Each query is a plain serializable struct whose set fields are ANDed into
//! a store [`QueryFilter`]. Not-seen records are excluded unless asked for.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use census_core::types::{
    ActivationState, ApplicationId, ApplicationType, ConnectionState, DiscovererId, EndpointId,
    SecurityMode,
};
use census_store::QueryFilter;

fn json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Application query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationQuery {
    /// Application uri, compared ignoring case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_uri: Option<String>,
    /// Application type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_type: Option<ApplicationType>,
    /// Owning discoverer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverer_id: Option<DiscovererId>,
    /// Site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    /// Include applications currently not seen.
    #[serde(default)]
    pub include_not_seen: bool,
}

impl ApplicationQuery {
    /// Matches every live application.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to one uri.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.application_uri = Some(uri.into());
        self
    }

    /// Restricts to one discoverer.
    pub fn with_discoverer(mut self, discoverer_id: DiscovererId) -> Self {
        self.discoverer_id = Some(discoverer_id);
        self
    }

    /// Includes not-seen applications.
    pub fn including_not_seen(mut self) -> Self {
        self.include_not_seen = true;
        self
    }

    /// Builds the store filter.
    pub fn to_filter(&self) -> QueryFilter {
        let mut filter = QueryFilter::all();
        if let Some(uri) = &self.application_uri {
            filter = filter.eq_ignore_case("application_uri", uri.as_str());
        }
        if let Some(application_type) = &self.application_type {
            filter = filter.eq("application_type", json(application_type));
        }
        if let Some(discoverer_id) = &self.discoverer_id {
            filter = filter.eq("discoverer_id", discoverer_id.as_str());
        }
        if let Some(site_id) = &self.site_id {
            filter = filter.eq("site_id", site_id.as_str());
        }
        if !self.include_not_seen {
            filter = filter.is_null("not_seen_since");
        }
        filter
    }
}

/// Endpoint query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointQuery {
    /// Owning application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<ApplicationId>,
    /// Endpoint url, compared ignoring case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    /// Security mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_mode: Option<SecurityMode>,
    /// Activation state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_state: Option<ActivationState>,
    /// Owning discoverer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverer_id: Option<DiscovererId>,
    /// Include endpoints currently not seen.
    #[serde(default)]
    pub include_not_seen: bool,
}

impl EndpointQuery {
    /// Matches every live endpoint.
    pub fn all() -> Self {
        Self::default()
    }

    /// Endpoints of one application, seen or not.
    pub fn of_application(application_id: ApplicationId) -> Self {
        Self {
            application_id: Some(application_id),
            include_not_seen: true,
            ..Self::default()
        }
    }

    /// Restricts to one activation state.
    pub fn with_activation_state(mut self, state: ActivationState) -> Self {
        self.activation_state = Some(state);
        self
    }

    /// Restricts to one security mode.
    pub fn with_security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = Some(mode);
        self
    }

    /// Includes not-seen endpoints.
    pub fn including_not_seen(mut self) -> Self {
        self.include_not_seen = true;
        self
    }

    /// Builds the store filter.
    pub fn to_filter(&self) -> QueryFilter {
        let mut filter = QueryFilter::all();
        if let Some(application_id) = &self.application_id {
            filter = filter.eq("application_id", application_id.as_str());
        }
        if let Some(url) = &self.endpoint_url {
            filter = filter.eq_ignore_case("endpoint_url", url.as_str());
        }
        if let Some(mode) = &self.security_mode {
            filter = filter.eq("endpoint.security_mode", json(mode));
        }
        if let Some(state) = &self.activation_state {
            filter = filter.eq("activation_state", json(state));
        }
        if let Some(discoverer_id) = &self.discoverer_id {
            filter = filter.eq("discoverer_id", discoverer_id.as_str());
        }
        if !self.include_not_seen {
            filter = filter.is_null("not_seen_since");
        }
        filter
    }
}

/// Twin query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwinQuery {
    /// Bound endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<EndpointId>,
    /// Connection state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_state: Option<ConnectionState>,
}

impl TwinQuery {
    /// Matches every twin.
    pub fn all() -> Self {
        Self::default()
    }

    /// Twins bound to one endpoint.
    pub fn on_endpoint(endpoint_id: EndpointId) -> Self {
        Self {
            endpoint_id: Some(endpoint_id),
            ..Self::default()
        }
    }

    /// Builds the store filter.
    pub fn to_filter(&self) -> QueryFilter {
        let mut filter = QueryFilter::all();
        if let Some(endpoint_id) = &self.endpoint_id {
            filter = filter.eq("endpoint_id", endpoint_id.as_str());
        }
        if let Some(state) = &self.connection_state {
            filter = filter.eq("connection_state", json(state));
        }
        filter
    }
}
