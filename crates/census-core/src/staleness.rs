// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Staleness tracking.
//!
//! After a complete sweep, every record owned by the sweeping discoverer is
//! either *seen* (present in the sweep) or *missed* (absent). Seen records
//! have their not-seen watermark cleared; missed records get it set to the
//! sweep time unless it is already set, so the first-missed time survives
//! consecutive misses. The tracker only marks. Deletion is an explicit,
//! separate operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::SameAs;

/// Records that carry a not-seen watermark.
pub trait Watermarked {
    /// Returns the watermark.
    fn not_seen_since(&self) -> Option<DateTime<Utc>>;

    /// Overwrites the watermark.
    fn set_not_seen_since(&mut self, value: Option<DateTime<Utc>>);

    /// Clears the watermark.
    fn mark_seen(&mut self) -> Sighting {
        if self.not_seen_since().is_some() {
            self.set_not_seen_since(None);
            Sighting::Found
        } else {
            Sighting::Unchanged
        }
    }

    /// Sets the watermark to `now` unless already set.
    fn mark_missed(&mut self, now: DateTime<Utc>) -> Sighting {
        if self.not_seen_since().is_none() {
            self.set_not_seen_since(Some(now));
            Sighting::Lost
        } else {
            Sighting::Unchanged
        }
    }
}

/// Effect of a staleness mark on one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sighting {
    /// A stale record reappeared.
    Found,
    /// A live record went missing.
    Lost,
    /// The watermark did not change.
    Unchanged,
}

impl Sighting {
    /// Returns `true` if the watermark changed.
    pub const fn is_transition(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Owned records split by presence in a completed sweep.
#[derive(Debug, Clone)]
pub struct StalenessPlan<T> {
    /// Owned records present in the sweep.
    pub seen: Vec<T>,
    /// Owned records absent from the sweep.
    pub missed: Vec<T>,
}

impl<T> Default for StalenessPlan<T> {
    fn default() -> Self {
        Self {
            seen: Vec::new(),
            missed: Vec::new(),
        }
    }
}

impl<T> StalenessPlan<T> {
    /// Returns `true` if nothing is owned.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty() && self.missed.is_empty()
    }
}

/// Splits `owned` into records present in `present` and records missing from it.
pub fn plan<T: SameAs>(owned: Vec<T>, present: &[T]) -> StalenessPlan<T> {
    let mut plan = StalenessPlan::default();
    for record in owned {
        if present.iter().any(|p| p.is_same_as(&record)) {
            plan.seen.push(record);
        } else {
            plan.missed.push(record);
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Rec {
        key: &'static str,
        mark: Option<DateTime<Utc>>,
    }

    impl SameAs for Rec {
        fn identity_eq(&self, other: &Self) -> bool {
            self.key == other.key
        }
    }

    impl Watermarked for Rec {
        fn not_seen_since(&self) -> Option<DateTime<Utc>> {
            self.mark
        }
        fn set_not_seen_since(&mut self, value: Option<DateTime<Utc>>) {
            self.mark = value;
        }
    }

    fn rec(key: &'static str) -> Rec {
        Rec { key, mark: None }
    }

    #[test]
    fn test_first_missed_time_is_preserved() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::minutes(5);
        let mut r = rec("a");

        assert_eq!(r.mark_missed(t1), Sighting::Lost);
        assert_eq!(r.mark_missed(t2), Sighting::Unchanged);
        assert_eq!(r.mark, Some(t1));

        assert_eq!(r.mark_seen(), Sighting::Found);
        assert_eq!(r.mark, None);
        assert_eq!(r.mark_seen(), Sighting::Unchanged);
    }

    #[test]
    fn test_plan_partitions_by_identity() {
        let plan = plan(vec![rec("a"), rec("b"), rec("c")], &[rec("b"), rec("z")]);
        assert_eq!(plan.seen, vec![rec("b")]);
        assert_eq!(plan.missed, vec![rec("a"), rec("c")]);
        assert!(!plan.is_empty());
    }
}
