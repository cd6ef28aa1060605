// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for the census registry.
//!
//! This module provides the identifier newtypes, enumerations and small value
//! types shared by every census component:
//!
//! - **Identifiers**: `ApplicationId`, `EndpointId`, `TwinId`, `DiscovererId`, `ModuleId`
//! - **Concurrency token**: `GenerationId`
//! - **Audit**: `OperationContext`
//! - **OPC UA enumerations**: `ApplicationType`, `SecurityMode`, `SecurityPolicy`
//! - **Lifecycle states**: `ActivationState`, `EndpointState`, `ConnectionState`
//! - **Paging**: `Page`

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RegistryError;

// =============================================================================
// Identifier newtypes
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier and returns the inner string.
            #[inline]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a registered OPC UA application.
    ///
    /// Derived from the application identity, see
    /// [`ApplicationInfo::derive_id`](crate::application::ApplicationInfo::derive_id).
    ApplicationId
);

string_id!(
    /// Identifier of an endpoint, scoped to its owning application.
    EndpointId
);

string_id!(
    /// Identifier of an activated twin. Defaults to the bound endpoint id.
    TwinId
);

string_id!(
    /// Identifier of a discovery agent.
    DiscovererId
);

string_id!(
    /// Identifier of an edge module (supervisor, publisher, gateway, discoverer).
    ModuleId
);

impl From<EndpointId> for TwinId {
    fn from(id: EndpointId) -> Self {
        Self(id.into_inner())
    }
}

impl From<DiscovererId> for ModuleId {
    fn from(id: DiscovererId) -> Self {
        Self(id.into_inner())
    }
}

// =============================================================================
// GenerationId
// =============================================================================

/// Opaque optimistic-concurrency token.
///
/// Every persisted record carries the generation it was written with. A write
/// must present the generation it last read; the store rejects it otherwise.
/// Generations are time-ordered (UUIDv7) so they also sort by write order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(String);

impl GenerationId {
    /// Issues a fresh generation.
    pub fn next() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    /// Wraps an existing token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// OperationContext
// =============================================================================

/// Who changed a record and when.
///
/// Attached to every mutation. Records receive their own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    /// Authority (user, service or discoverer) performing the change.
    pub authority_id: String,
    /// Time of the change.
    pub time: DateTime<Utc>,
}

impl OperationContext {
    /// Creates a context for the given authority at the current time.
    pub fn new(authority_id: impl Into<String>) -> Self {
        Self {
            authority_id: authority_id.into(),
            time: Utc::now(),
        }
    }

    /// Creates a context at an explicit time.
    pub fn at(authority_id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            authority_id: authority_id.into(),
            time,
        }
    }

    /// Context used for changes the registry makes on its own behalf.
    pub fn system() -> Self {
        Self::new("census")
    }
}

// =============================================================================
// ApplicationType
// =============================================================================

/// OPC UA application type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    /// Server application.
    #[default]
    Server,
    /// Client application.
    Client,
    /// Combined client and server.
    ClientAndServer,
    /// Discovery server.
    DiscoveryServer,
}

impl ApplicationType {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Server => "Server",
            Self::Client => "Client",
            Self::ClientAndServer => "ClientAndServer",
            Self::DiscoveryServer => "DiscoveryServer",
        }
    }

    /// Returns `true` if the application exposes server endpoints.
    pub const fn is_server(&self) -> bool {
        !matches!(self, Self::Client)
    }
}

impl fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ApplicationType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "server" => Ok(Self::Server),
            "client" => Ok(Self::Client),
            "clientandserver" => Ok(Self::ClientAndServer),
            "discoveryserver" => Ok(Self::DiscoveryServer),
            _ => Err(RegistryError::invalid_argument(
                "application_type",
                format!("unknown application type '{}'", s),
            )),
        }
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode of an endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    #[default]
    None,
    /// Messages are signed but not encrypted.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }

    /// Returns `true` if this mode provides message signing.
    #[inline]
    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Sign | Self::SignAndEncrypt)
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" | "nosecurity" => Ok(Self::None),
            "sign" | "signed" => Ok(Self::Sign),
            "signandencrypt" | "signencrypt" | "encrypted" => Ok(Self::SignAndEncrypt),
            _ => Err(RegistryError::invalid_argument(
                "security_mode",
                format!("unknown security mode '{}'", s),
            )),
        }
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

const POLICY_URI_PREFIX: &str = "http://opcfoundation.org/UA/SecurityPolicy#";

/// OPC UA security policy of an endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security policy.
    #[default]
    None,
    /// Basic128Rsa15 (deprecated).
    Basic128Rsa15,
    /// Basic256 (deprecated).
    Basic256,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128_Sha256_RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256_Sha256_RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the OPC UA policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic128Rsa15 => "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Resolves a policy from its URI or short name.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let name = uri.strip_prefix(POLICY_URI_PREFIX).unwrap_or(uri);
        match name.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Some(Self::None),
            "basic128rsa15" => Some(Self::Basic128Rsa15),
            "basic256" => Some(Self::Basic256),
            "basic256sha256" => Some(Self::Basic256Sha256),
            "aes128sha256rsaoaep" => Some(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" => Some(Self::Aes256Sha256RsaPss),
            _ => None,
        }
    }

    /// Returns the short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128Sha256RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256Sha256RsaPss",
        }
    }

    /// Returns `true` if this policy is deprecated.
    #[inline]
    pub const fn is_deprecated(&self) -> bool {
        matches!(self, Self::Basic128Rsa15 | Self::Basic256)
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Lifecycle states
// =============================================================================

/// Activation state of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    /// No twin is bound to the endpoint.
    #[default]
    Deactivated,
    /// A twin is bound to the endpoint.
    Activated,
}

impl ActivationState {
    /// Returns `true` when activated.
    pub const fn is_activated(&self) -> bool {
        matches!(self, Self::Activated)
    }
}

/// Last known reachability of an endpoint, as reported by a discoverer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    /// Endpoint answered and is ready.
    Ready,
    /// Connection attempt in progress.
    Connecting,
    /// Host not reachable.
    NotReachable,
    /// Server reported busy.
    Busy,
    /// Server certificate not trusted.
    NoTrust,
    /// Server certificate invalid.
    CertificateInvalid,
    /// Credentials rejected.
    Unauthorized,
    /// Any other failure.
    Error,
}

/// Connection state of a twin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Session is being established.
    #[default]
    Connecting,
    /// Session is established.
    Connected,
    /// Session failed.
    Error,
    /// Session closed.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Authentication
// =============================================================================

/// Kind of credential an endpoint accepts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// Anonymous access.
    #[default]
    None,
    /// User name and password.
    UserName,
    /// X.509 user certificate.
    X509Certificate,
    /// Issued (JWT) token.
    JwtToken,
}

/// An authentication method offered by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthenticationMethod {
    /// Policy id as advertised by the server.
    pub id: String,
    /// Credential kind.
    pub credential_type: CredentialType,
    /// Security policy uri used for the token, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_policy: Option<String>,
}

impl AuthenticationMethod {
    /// Creates an authentication method.
    pub fn new(id: impl Into<String>, credential_type: CredentialType) -> Self {
        Self {
            id: id.into(),
            credential_type,
            security_policy: None,
        }
    }

    /// Anonymous authentication.
    pub fn anonymous() -> Self {
        Self::new("anonymous", CredentialType::None)
    }
}

// =============================================================================
// Page
// =============================================================================

/// One page of a list or query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Token to fetch the next page, `None` on the last page.
    pub continuation_token: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page.
    pub fn new(items: Vec<T>, continuation_token: Option<String>) -> Self {
        Self {
            items,
            continuation_token,
        }
    }

    /// An empty final page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            continuation_token: None,
        }
    }

    /// Returns `true` if more pages follow.
    pub fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }

    /// Maps the items of the page.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            continuation_token: self.continuation_token,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_ids_are_unique_and_ordered() {
        let a = GenerationId::next();
        let b = GenerationId::next();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_security_policy_from_uri() {
        assert_eq!(
            SecurityPolicy::from_uri("http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256"),
            Some(SecurityPolicy::Basic256Sha256)
        );
        assert_eq!(
            SecurityPolicy::from_uri(SecurityPolicy::Aes128Sha256RsaOaep.uri()),
            Some(SecurityPolicy::Aes128Sha256RsaOaep)
        );
        assert_eq!(SecurityPolicy::from_uri("none"), Some(SecurityPolicy::None));
        assert_eq!(SecurityPolicy::from_uri("Rot13"), None);
    }

    #[test]
    fn test_security_mode_parse() {
        assert_eq!("SignAndEncrypt".parse::<SecurityMode>().unwrap(), SecurityMode::SignAndEncrypt);
        assert_eq!("sign".parse::<SecurityMode>().unwrap(), SecurityMode::Sign);
        assert!("bogus".parse::<SecurityMode>().is_err());
    }

    #[test]
    fn test_application_type_parse() {
        assert_eq!(
            "client_and_server".parse::<ApplicationType>().unwrap(),
            ApplicationType::ClientAndServer
        );
        assert!(!ApplicationType::Client.is_server());
    }

    #[test]
    fn test_twin_id_from_endpoint() {
        let twin: TwinId = EndpointId::new("uae-1").into();
        assert_eq!(twin.as_str(), "uae-1");
    }

    #[test]
    fn test_page_map() {
        let page = Page::new(vec![1, 2, 3], Some("next".into())).map(|v| v * 2);
        assert_eq!(page.items, vec![2, 4, 6]);
        assert!(page.has_more());
    }
}
