// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Assertions
//!
//! Assertions over stored records and published events with failure
//! messages that show what was actually there.

use census_core::types::DiscovererId;
use census_core::{ApplicationInfo, ChangeKind, EndpointInfo, EntityKind, RegistryEvent};

// =============================================================================
// Record Assertions
// =============================================================================

/// Asserts that `app` is owned by `discoverer` and currently seen.
#[track_caller]
pub fn assert_owned_and_seen(app: &ApplicationInfo, discoverer: &DiscovererId) {
    assert!(
        app.is_owned_by(discoverer),
        "application {} owned by {:?}, expected {}",
        app.application_id,
        app.discoverer_id,
        discoverer
    );
    assert!(
        !app.is_stale(),
        "application {} is stale since {:?}",
        app.application_id,
        app.not_seen_since
    );
}

/// Asserts that `app` carries a not-seen watermark.
#[track_caller]
pub fn assert_stale(app: &ApplicationInfo) {
    assert!(app.is_stale(), "application {} is not stale", app.application_id);
}

/// Asserts that every endpoint in `endpoints` is stale, or none is.
#[track_caller]
pub fn assert_endpoints_stale(endpoints: &[EndpointInfo], stale: bool) {
    for endpoint in endpoints {
        assert_eq!(
            endpoint.is_stale(),
            stale,
            "endpoint {} ({}) stale={}, expected {}",
            endpoint.id,
            endpoint.endpoint_url,
            endpoint.is_stale(),
            stale
        );
    }
}

/// Asserts that `app` has exactly the given capabilities.
#[track_caller]
pub fn assert_capabilities(app: &ApplicationInfo, expected: &[&str]) {
    let actual: Vec<&str> = app.capabilities.iter().map(String::as_str).collect();
    let mut expected = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "capabilities of {}", app.application_id);
}

// =============================================================================
// Event Assertions
// =============================================================================

/// Counts events of one entity kind and change.
pub fn count_events(events: &[RegistryEvent], entity: EntityKind, change: ChangeKind) -> usize {
    events
        .iter()
        .filter(|e| e.payload.entity_kind() == entity && e.change == change)
        .count()
}

/// Asserts the number of events of one entity kind and change.
#[track_caller]
pub fn assert_event_count(events: &[RegistryEvent], entity: EntityKind, change: ChangeKind, expected: usize) {
    let actual = count_events(events, entity, change);
    assert_eq!(
        actual,
        expected,
        "expected {} {:?} {} event(s), got {}; all events: {:?}",
        expected,
        entity,
        change,
        actual,
        summarize(events)
    );
}

/// Asserts that no events were published.
#[track_caller]
pub fn assert_no_events(events: &[RegistryEvent]) {
    assert!(events.is_empty(), "expected no events, got {:?}", summarize(events));
}

/// Asserts that no record received more than one event.
#[track_caller]
pub fn assert_one_event_per_record(events: &[RegistryEvent]) {
    let mut ids: Vec<&str> = events.iter().map(|e| e.payload.entity_id()).collect();
    ids.sort_unstable();
    let before = ids.len();
    ids.dedup();
    assert_eq!(before, ids.len(), "duplicate events: {:?}", summarize(events));
}

/// Asserts that event ids are unique.
#[track_caller]
pub fn assert_unique_event_ids(events: &[RegistryEvent]) {
    let mut ids: Vec<&str> = events.iter().map(|e| e.event_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), events.len(), "event ids are not unique");
}

fn summarize(events: &[RegistryEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| format!("{:?}:{}:{}", e.payload.entity_kind(), e.change, e.payload.entity_id()))
        .collect()
}
