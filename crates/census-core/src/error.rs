// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for census.
//!
//! Optimistic-concurrency outcomes (a create that raced another create, a
//! replace presenting an outdated generation) are *not* errors at the store
//! level: they are returned as values and resolved by the registry write loop.
//! The types here cover what is surfaced to callers.
//!
//! # Error Hierarchy
//!
//! ```text
//! CensusError (root)
//! ├── RegistryError   - Registry operations (not found, invalid state, stale version, ...)
//! ├── StoreError      - Document store failures (transient or corrupt data)
//! ├── BusError        - Event bus publication and subscription
//! └── ListenerError   - In-process listener failures (isolated, logged)
//! ```
//!
//! # Examples
//!
//! ```
//! use census_core::error::{CensusError, StoreError};
//!
//! let error = StoreError::unavailable("connection reset");
//! assert!(error.is_retryable());
//!
//! let census_error: CensusError = error.into();
//! assert!(census_error.is_retryable());
//! ```

use thiserror::Error;

// =============================================================================
// CensusError - Root Error Type
// =============================================================================

/// The root error type for census.
#[derive(Debug, Error)]
pub enum CensusError {
    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Event bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Listener error.
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),
}

impl CensusError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            CensusError::Registry(e) => e.is_retryable(),
            CensusError::Store(e) => e.is_retryable(),
            CensusError::Bus(e) => e.is_retryable(),
            CensusError::Listener(_) => false,
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            CensusError::Registry(e) => e.user_message(),
            CensusError::Store(e) => format!("저장소 오류: {}", e.user_message()),
            CensusError::Bus(e) => format!("내부 통신 오류: {}", e),
            CensusError::Listener(e) => format!("알림 처리 오류: {}", e),
        }
    }

    /// Returns the error type as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            CensusError::Registry(_) => "registry",
            CensusError::Store(_) => "store",
            CensusError::Bus(_) => "bus",
            CensusError::Listener(_) => "listener",
        }
    }
}

// =============================================================================
// RegistryError
// =============================================================================

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind (application, endpoint, twin, module).
        kind: &'static str,
        /// Entity id.
        id: String,
    },

    /// Operation is not allowed in the entity's current state.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message.
        message: String,
    },

    /// The presented generation no longer matches the stored record.
    #[error("Stale version for {kind} '{id}': presented generation {presented}")]
    StaleVersion {
        /// Entity kind.
        kind: &'static str,
        /// Entity id.
        id: String,
        /// Generation presented by the caller.
        presented: String,
    },

    /// Request argument is malformed.
    #[error("Invalid argument '{field}': {message}")]
    InvalidArgument {
        /// Offending field.
        field: String,
        /// Error message.
        message: String,
    },

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Event bus failure.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl RegistryError {
    /// Creates a not found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a stale version error.
    pub fn stale_version(
        kind: &'static str,
        id: impl Into<String>,
        presented: impl Into<String>,
    ) -> Self {
        Self::StaleVersion {
            kind,
            id: id.into(),
            presented: presented.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the caller may retry.
    ///
    /// Stale versions are retryable after re-reading the record.
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::StaleVersion { .. } => true,
            RegistryError::Store(e) => e.is_retryable(),
            RegistryError::Bus(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` for not found errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            RegistryError::NotFound { kind, id } => format!("{}을(를) 찾을 수 없습니다: {}", kind, id),
            RegistryError::InvalidState { message } => format!("잘못된 상태: {}", message),
            RegistryError::StaleVersion { kind, id, .. } => {
                format!("{} '{}'이(가) 다른 요청에 의해 변경되었습니다. 다시 시도하세요", kind, id)
            }
            RegistryError::InvalidArgument { field, message } => {
                format!("잘못된 요청 ({}): {}", field, message)
            }
            RegistryError::Store(e) => e.user_message(),
            RegistryError::Bus(_) => "이벤트 전송에 실패했습니다".to_string(),
        }
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            RegistryError::NotFound { .. } => "not_found",
            RegistryError::InvalidState { .. } => "invalid_state",
            RegistryError::StaleVersion { .. } => "stale_version",
            RegistryError::InvalidArgument { .. } => "invalid_argument",
            RegistryError::Store(_) => "store",
            RegistryError::Bus(_) => "bus",
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

// =============================================================================
// StoreError
// =============================================================================

/// Document store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store could not be reached or timed out.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// A document could not be (de)serialized.
    #[error("Serialization failed: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// Continuation token is malformed or foreign.
    #[error("Invalid continuation token: {token}")]
    InvalidContinuation {
        /// The rejected token.
        token: String,
    },

    /// Document shape is not acceptable to the store.
    #[error("Invalid document: {message}")]
    InvalidDocument {
        /// Error message.
        message: String,
    },
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates an invalid continuation error.
    pub fn invalid_continuation(token: impl Into<String>) -> Self {
        Self::InvalidContinuation {
            token: token.into(),
        }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Unavailable { .. } => "저장소에 연결할 수 없습니다".to_string(),
            StoreError::Serialization { .. } => "데이터 변환에 실패했습니다".to_string(),
            StoreError::InvalidContinuation { .. } => "잘못된 페이지 토큰입니다".to_string(),
            StoreError::InvalidDocument { message } => format!("잘못된 문서: {}", message),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// BusError
// =============================================================================

/// Event bus errors.
#[derive(Debug, Error, Clone)]
pub enum BusError {
    /// Channel is closed.
    #[error("Channel is closed")]
    Closed,

    /// Receiver lagged behind.
    #[error("Receiver lagged by {count} messages")]
    Lagged {
        /// Number of missed messages.
        count: u64,
    },

    /// Publication failed.
    #[error("Failed to publish to '{topic}': {message}")]
    PublishFailed {
        /// Target topic.
        topic: String,
        /// Error message.
        message: String,
    },

    /// Payload could not be (de)serialized.
    #[error("Payload serialization failed: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
}

impl BusError {
    /// Creates a lagged error.
    pub fn lagged(count: u64) -> Self {
        Self::Lagged { count }
    }

    /// Creates a publish failure.
    pub fn publish_failed(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BusError::Lagged { .. } | BusError::PublishFailed { .. })
    }
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

// =============================================================================
// ListenerError
// =============================================================================

/// Failure reported by an in-process change listener.
#[derive(Debug, Error, Clone)]
pub enum ListenerError {
    /// Listener returned an error.
    #[error("Listener '{listener}' failed: {message}")]
    Failed {
        /// Listener name.
        listener: String,
        /// Error message.
        message: String,
    },

    /// Listener panicked while handling an event.
    #[error("Listener '{listener}' panicked")]
    Panicked {
        /// Listener name.
        listener: String,
    },
}

impl ListenerError {
    /// Creates a failure.
    pub fn failed(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            listener: listener.into(),
            message: message.into(),
        }
    }

    /// Creates a panic marker.
    pub fn panicked(listener: impl Into<String>) -> Self {
        Self::Panicked {
            listener: listener.into(),
        }
    }
}

/// Result returned by listener callbacks.
pub type ListenerResult = Result<(), ListenerError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_retryable() {
        assert!(RegistryError::stale_version("twin", "t1", "g0").is_retryable());
        assert!(RegistryError::from(StoreError::unavailable("down")).is_retryable());
        assert!(!RegistryError::not_found("endpoint", "e1").is_retryable());
        assert!(!RegistryError::invalid_state("stale endpoint").is_retryable());
    }

    #[test]
    fn test_error_types() {
        assert_eq!(RegistryError::not_found("twin", "t1").error_type(), "not_found");
        assert_eq!(
            RegistryError::stale_version("twin", "t1", "g0").error_type(),
            "stale_version"
        );
        let root: CensusError = RegistryError::invalid_state("x").into();
        assert_eq!(root.error_type(), "registry");
    }

    #[test]
    fn test_not_found_display() {
        let error = RegistryError::not_found("endpoint", "uae-123");
        assert_eq!(error.to_string(), "endpoint not found: uae-123");
        assert!(error.is_not_found());
    }

    #[test]
    fn test_store_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: StoreError = json_err.into();
        assert!(matches!(error, StoreError::Serialization { .. }));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_bus_error_retryable() {
        assert!(BusError::lagged(3).is_retryable());
        assert!(BusError::publish_failed("registry", "timeout").is_retryable());
        assert!(!BusError::Closed.is_retryable());
    }
}
