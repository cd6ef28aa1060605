// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Integration tests for sweep merging.
//!
//! Tests cover:
//! - Order independence of the working set union
//! - Idempotence of re-adding findings
//! - Identity ignoring metadata, security settings and letter case

use census_core::types::{ApplicationType, SecurityMode, SecurityPolicy};
use census_core::{
    ApplicationInfo, ApplicationRegistration, ContentEq, EndpointDescription, EndpointInfo, SameAs,
    WorkingSet,
};
use census_tests::prelude::*;

fn finding(app: ApplicationInfo, urls: &[&str]) -> ApplicationRegistration {
    ApplicationRegistration::new(
        app.with_derived_id(),
        urls.iter().map(|url| EndpointFixtures::plain(url)),
    )
}

fn merged(findings: &[ApplicationRegistration]) -> Vec<ApplicationRegistration> {
    let mut set = WorkingSet::new();
    for f in findings {
        set.add_or_update(f.clone());
    }
    set.into_registrations()
}

// =============================================================================
// Union
// =============================================================================

#[test]
fn test_union_is_order_independent() {
    let findings = vec![
        finding(ApplicationFixtures::press().with_capability("DA"), &["opc.tcp://press:4840"]),
        finding(ApplicationFixtures::mixer(), &["opc.tcp://mixer:4840"]),
        finding(
            ApplicationFixtures::press()
                .with_capability("HA")
                .with_host_address("10.0.1.11"),
            &["opc.tcp://press:4841"],
        ),
        finding(ApplicationFixtures::press().with_name("Press 1 (backup)"), &["opc.tcp://press:4840"]),
    ];
    let mut reversed = findings.clone();
    reversed.reverse();
    let mut rotated = findings.clone();
    rotated.rotate_left(2);

    let forward = merged(&findings);
    assert_eq!(forward, merged(&reversed));
    assert_eq!(forward, merged(&rotated));

    assert_eq!(forward.len(), 2);
    let press = forward
        .iter()
        .find(|r| r.application.as_ref().is_some_and(|a| a.application_uri == "urn:plant:press"))
        .expect("press merged");
    let app = press.application.as_ref().unwrap();
    assert_capabilities(app, &["DA", "HA"]);
    assert_eq!(app.host_addresses.len(), 2);
    assert_eq!(press.endpoints.len(), 2);
}

#[test]
fn test_union_is_idempotent() {
    let press = finding(
        ApplicationFixtures::press().with_capability("DA"),
        &["opc.tcp://press:4840", "opc.tcp://press:4841"],
    );

    let once = merged(&[press.clone()]);
    let thrice = merged(&[press.clone(), press.clone(), press]);
    assert_eq!(once, thrice);
    assert_eq!(thrice[0].endpoints.len(), 2);
}

#[test]
fn test_endpoints_of_one_application_merge_across_findings() {
    let sweep = SweepBuilder::new(DiscovererFixtures::hall_a())
        .finding(ApplicationFixtures::press(), vec![EndpointFixtures::plain("opc.tcp://press:4840")])
        .finding(ApplicationFixtures::press(), vec![EndpointFixtures::secured("opc.tcp://press:4840")])
        .finding(ApplicationFixtures::press(), vec![EndpointFixtures::plain("OPC.TCP://PRESS:4840")]);

    let set = sweep.working_set();
    assert_eq!(set.len(), 1);
    // Same URL with different security is a distinct endpoint; letter case is not.
    assert_eq!(set.endpoint_count(), 2);

    let registration = set.iter().next().unwrap();
    let owner = registration.application.as_ref().unwrap();
    for endpoint in &registration.endpoints {
        assert_eq!(endpoint.application_id, owner.application_id);
        assert_eq!(endpoint.discoverer_id.as_ref(), Some(&DiscovererFixtures::hall_a()));
    }
}

// =============================================================================
// Identity
// =============================================================================

#[test]
fn test_application_identity_ignores_metadata() {
    let stored = ApplicationFixtures::press()
        .with_site("plant-1")
        .with_discoverer(DiscovererFixtures::hall_a());
    let mut reported = ApplicationInfo::new("URN:PLANT:PRESS", ApplicationType::Server)
        .with_capability("DA");
    reported.not_seen_since = Some(Clock::t0());

    assert!(stored.is_same_as(&reported));
    assert!(reported.is_same_as(&stored));
    assert_eq!(stored.application_id, reported.application_id);
    assert!(!stored.content_eq(&reported));
}

#[test]
fn test_application_type_is_part_of_identity() {
    let server = ApplicationInfo::new("urn:plant:press", ApplicationType::Server);
    let client = ApplicationInfo::new("urn:plant:press", ApplicationType::Client);
    assert!(!server.is_same_as(&client));
    assert_ne!(server.application_id, client.application_id);
}

#[test]
fn test_endpoint_identity_includes_security() {
    let app = ApplicationFixtures::press();
    let plain = EndpointFixtures::plain("opc.tcp://press:4840").bind_to(&app);
    let signed = EndpointInfo::new(
        app.application_id.clone(),
        "opc.tcp://press:4840",
        Some(EndpointDescription::new(SecurityMode::Sign, SecurityPolicy::Basic256Sha256)),
    );
    let upper = EndpointFixtures::plain("OPC.TCP://PRESS:4840").bind_to(&app);

    assert!(!plain.is_same_as(&signed));
    assert_ne!(plain.id, signed.id);
    assert!(plain.is_same_as(&upper));
    assert_eq!(plain.id, upper.id);
}

#[test]
fn test_content_eq_ignores_watermark_and_audit() {
    let a = ApplicationFixtures::press();
    let mut b = a.clone();
    b.not_seen_since = Some(Clock::t0());
    b.updated = Some(ContextFixtures::operator());
    b.created = Some(ContextFixtures::operator());
    assert!(a.content_eq(&b));
}
