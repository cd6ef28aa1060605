// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Identity and content equality for registry records.
//!
//! Two predicates are used throughout the registry:
//!
//! - [`SameAs`]: "do these two records describe the same physical entity?"
//!   Used to find merge partners. Never looks at operational metadata
//!   (generation, created/updated context, not-seen watermark) and, for
//!   applications, never at the owning discoverer.
//! - [`ContentEq`]: "would persisting `other` over `self` change anything a
//!   subscriber cares about?" Used to suppress no-op writes and to classify
//!   changes as updates.

use std::ptr;

/// Physical identity comparison.
///
/// Implementors provide [`identity_eq`](SameAs::identity_eq); callers use
/// [`is_same_as`](SameAs::is_same_as), which short-circuits on reference
/// equality before comparing fields.
pub trait SameAs {
    /// Compares identity fields. Must be pure and symmetric.
    fn identity_eq(&self, other: &Self) -> bool;

    /// Returns `true` if both records describe the same entity.
    #[inline]
    fn is_same_as(&self, other: &Self) -> bool {
        ptr::eq(self, other) || self.identity_eq(other)
    }
}

/// Equality over the fields that make up a record's visible content.
pub trait ContentEq {
    /// Returns `true` if both records carry the same content, ignoring
    /// operational metadata.
    fn content_eq(&self, other: &Self) -> bool;
}

/// Identity comparison where a missing record never matches.
pub fn same_as_opt<T: SameAs>(a: Option<&T>, b: Option<&T>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_same_as(b),
        _ => false,
    }
}

/// Case-insensitive comparison used for URIs and URLs.
#[inline]
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Canonical form of a URI or URL for identity derivation.
pub fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl SameAs for Named {
        fn identity_eq(&self, other: &Self) -> bool {
            eq_ignore_case(self.0, other.0)
        }
    }

    #[test]
    fn test_none_never_equal() {
        let a = Named("urn:a");
        assert!(!same_as_opt(Some(&a), None));
        assert!(!same_as_opt::<Named>(None, None));
    }

    #[test]
    fn test_self_is_same() {
        let a = Named("urn:a");
        assert!(a.is_same_as(&a));
        assert!(same_as_opt(Some(&a), Some(&a)));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(Named("URN:Demo").is_same_as(&Named(" urn:demo ")));
        assert_eq!(normalize(" OPC.TCP://Host:4840 "), "opc.tcp://host:4840");
    }
}
