// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Twin records and lifecycle requests.
//!
//! A twin is an activated client session bound to exactly one endpoint. It
//! exists from activation until explicit deactivation:
//!
//! ```text
//!   Deactivated ──activate──► Activated ──deactivate──► Deactivated
//!                               │   ▲
//!                               └───┘ update (CAS on generation)
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::types::{ConnectionState, CredentialType, EndpointId, GenerationId, OperationContext, TwinId};

// =============================================================================
// Session settings
// =============================================================================

/// User credential presented when the twin opens its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserCredential {
    /// Credential kind.
    #[serde(default)]
    pub credential_type: CredentialType,
    /// Opaque credential value (user name, certificate reference, token).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl UserCredential {
    /// Anonymous credential.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// User name credential.
    pub fn user_name(name: impl Into<String>) -> Self {
        Self {
            credential_type: CredentialType::UserName,
            value: Some(name.into()),
        }
    }
}

/// Diagnostics verbosity of a twin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsLevel {
    /// No diagnostics.
    #[default]
    None,
    /// Status codes only.
    Status,
    /// Per-operation diagnostics.
    Operations,
    /// Full diagnostics.
    Verbose,
}

/// Diagnostics settings of a twin session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiagnosticsSettings {
    /// Verbosity.
    #[serde(default)]
    pub level: DiagnosticsLevel,
    /// Audit id correlating session operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
}

// =============================================================================
// TwinInfo
// =============================================================================

/// Persisted twin record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinInfo {
    /// Twin id. Defaults to the endpoint id.
    pub id: TwinId,

    /// Bound endpoint.
    pub endpoint_id: EndpointId,

    /// Session credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserCredential>,

    /// Diagnostics settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticsSettings>,

    /// Timeout applied to session operations.
    #[serde(default, with = "option_duration", skip_serializing_if = "Option::is_none")]
    pub operation_timeout: Option<Duration>,

    /// Session state.
    #[serde(default)]
    pub connection_state: ConnectionState,

    /// Concurrency token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<GenerationId>,

    /// Activation context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<OperationContext>,

    /// Last update context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<OperationContext>,
}

impl TwinInfo {
    /// Builds the record created by an activation.
    pub fn activate(request: &TwinActivationRequest, context: &OperationContext) -> Self {
        Self {
            id: request.twin_id(),
            endpoint_id: request.endpoint_id.clone(),
            user: request.user.clone(),
            diagnostics: request.diagnostics.clone(),
            operation_timeout: request.operation_timeout,
            connection_state: ConnectionState::Connecting,
            generation_id: None,
            created: Some(context.clone()),
            updated: None,
        }
    }

    /// Applies an update in place. Returns `true` if anything changed.
    pub fn apply(&mut self, update: &TwinUpdateRequest) -> bool {
        let mut changed = false;
        if let Some(user) = &update.user {
            changed |= self.user.as_ref() != Some(user);
            self.user = Some(user.clone());
        }
        if let Some(diagnostics) = &update.diagnostics {
            changed |= self.diagnostics.as_ref() != Some(diagnostics);
            self.diagnostics = Some(diagnostics.clone());
        }
        if let Some(timeout) = update.operation_timeout {
            changed |= self.operation_timeout != Some(timeout);
            self.operation_timeout = Some(timeout);
        }
        changed
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Request to activate a twin on an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinActivationRequest {
    /// Explicit twin id. Defaults to the endpoint id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TwinId>,
    /// Endpoint to bind.
    pub endpoint_id: EndpointId,
    /// Session credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserCredential>,
    /// Diagnostics settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticsSettings>,
    /// Operation timeout.
    #[serde(default, with = "option_duration", skip_serializing_if = "Option::is_none")]
    pub operation_timeout: Option<Duration>,
}

impl TwinActivationRequest {
    /// Activation request for `endpoint_id` with default settings.
    pub fn new(endpoint_id: EndpointId) -> Self {
        Self {
            id: None,
            endpoint_id,
            user: None,
            diagnostics: None,
            operation_timeout: None,
        }
    }

    /// Sets an explicit twin id.
    pub fn with_id(mut self, id: TwinId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the session credential.
    pub fn with_user(mut self, user: UserCredential) -> Self {
        self.user = Some(user);
        self
    }

    /// Sets the operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Effective twin id.
    pub fn twin_id(&self) -> TwinId {
        self.id
            .clone()
            .unwrap_or_else(|| TwinId::from(self.endpoint_id.clone()))
    }

    /// Validates the request.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.endpoint_id.as_str().trim().is_empty() {
            return Err(RegistryError::invalid_argument("endpoint_id", "cannot be empty"));
        }
        if matches!(&self.id, Some(id) if id.as_str().trim().is_empty()) {
            return Err(RegistryError::invalid_argument("id", "cannot be empty"));
        }
        if self.operation_timeout == Some(Duration::ZERO) {
            return Err(RegistryError::invalid_argument(
                "operation_timeout",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwinActivationResult {
    /// Twin id.
    pub id: TwinId,
    /// Generation of the created record.
    pub generation_id: GenerationId,
}

/// Partial update of an activated twin.
///
/// Fields left `None` keep their current value. The update only applies if
/// `generation_id` matches the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinUpdateRequest {
    /// Generation the caller last read.
    pub generation_id: GenerationId,
    /// New credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserCredential>,
    /// New diagnostics settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticsSettings>,
    /// New operation timeout.
    #[serde(default, with = "option_duration", skip_serializing_if = "Option::is_none")]
    pub operation_timeout: Option<Duration>,
}

impl TwinUpdateRequest {
    /// Empty update against `generation_id`.
    pub fn new(generation_id: GenerationId) -> Self {
        Self {
            generation_id,
            user: None,
            diagnostics: None,
            operation_timeout: None,
        }
    }

    /// Sets the operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Sets the diagnostics settings.
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsSettings) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }
}

mod option_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => humantime::format_duration(*d).to_string().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twin_id_defaults_to_endpoint() {
        let request = TwinActivationRequest::new(EndpointId::new("uae1"));
        assert_eq!(request.twin_id(), TwinId::new("uae1"));
        let request = request.with_id(TwinId::new("t1"));
        assert_eq!(request.twin_id(), TwinId::new("t1"));
    }

    #[test]
    fn test_activate_starts_connecting() {
        let request = TwinActivationRequest::new(EndpointId::new("uae1"))
            .with_user(UserCredential::user_name("operator"));
        let twin = TwinInfo::activate(&request, &OperationContext::new("tester"));
        assert_eq!(twin.connection_state, ConnectionState::Connecting);
        assert_eq!(twin.endpoint_id.as_str(), "uae1");
        assert!(twin.generation_id.is_none());
    }

    #[test]
    fn test_apply_reports_change() {
        let request = TwinActivationRequest::new(EndpointId::new("uae1"));
        let mut twin = TwinInfo::activate(&request, &OperationContext::system());

        let update = TwinUpdateRequest::new(GenerationId::new("g1"))
            .with_operation_timeout(Duration::from_secs(5));
        assert!(twin.apply(&update));
        assert_eq!(twin.operation_timeout, Some(Duration::from_secs(5)));
        assert!(!twin.apply(&update));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let request = TwinActivationRequest::new(EndpointId::new("uae1"))
            .with_operation_timeout(Duration::ZERO);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_operation_timeout_is_human_readable() {
        let update = TwinUpdateRequest::new(GenerationId::new("g1"))
            .with_operation_timeout(Duration::from_secs(5));
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["operation_timeout"], "5s");

        let back: TwinUpdateRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.operation_timeout, Some(Duration::from_secs(5)));
    }
}
