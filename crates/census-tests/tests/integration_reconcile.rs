// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Integration tests for discovery reconciliation.
//!
//! Tests cover:
//! - Creation, refresh, loss and recovery of discovered records
//! - Idempotence of repeated sweeps
//! - Register-only sweeps and ownership takeover
//! - Sweep buffering through the processor
//! - The processor loop over the bus, including undecodable payloads and lag
//! - Completion of routed discovery requests

use std::sync::Arc;

use census_core::bus::{DISCOVERY_REQUESTS_TOPIC, DISCOVERY_RESULTS_TOPIC};
use census_core::{ChangeKind, DiscovererId, EntityKind, EventBus, InMemoryEventBus, OperationContext};
use census_registry::{Disposition, DropReason, RegistryConfig, SweepProcessor};
use census_tests::prelude::*;

fn press_and_mixer() -> SweepBuilder {
    SweepBuilder::new(DiscovererFixtures::hall_a())
        .finding(
            ApplicationFixtures::press(),
            vec![EndpointFixtures::plain("opc.tcp://press:4840")],
        )
        .finding(
            ApplicationFixtures::mixer(),
            vec![EndpointFixtures::plain("opc.tcp://mixer:4840")],
        )
}

fn press_only() -> SweepBuilder {
    SweepBuilder::new(DiscovererFixtures::hall_a()).finding(
        ApplicationFixtures::press(),
        vec![EndpointFixtures::plain("opc.tcp://press:4840")],
    )
}

// =============================================================================
// Reconciler
// =============================================================================

#[tokio::test]
async fn test_first_sweep_creates_records() {
    let harness = TestRegistry::new();

    let report = harness.reconcile(&press_and_mixer()).await.unwrap();
    assert_eq!(report.applications, 2);
    assert_eq!(report.endpoints, 2);
    assert_eq!(report.created, 4);
    assert_eq!(report.changes(), 4);

    let events = harness.take_events();
    assert_event_count(&events, EntityKind::Application, ChangeKind::New, 2);
    assert_event_count(&events, EntityKind::Endpoint, ChangeKind::New, 2);
    assert_unique_event_ids(&events);
    assert_eq!(harness.recorder.count("application", ChangeKind::New), 2);

    let press = harness.application("urn:plant:press").await.unwrap();
    assert_owned_and_seen(&press, &DiscovererFixtures::hall_a());
    assert!(press.created.is_some());
    assert!(press.generation_id.is_some());
}

#[tokio::test]
async fn test_identical_sweep_is_idempotent() {
    let harness = TestRegistry::new();
    harness.reconcile(&press_and_mixer()).await.unwrap();
    harness.take_events();
    let before = harness.application("urn:plant:press").await.unwrap();

    let report = harness
        .reconcile(&press_and_mixer().at(Clock::at(5)))
        .await
        .unwrap();
    assert_eq!(report.changes(), 0);
    assert_no_events(&harness.take_events());

    let after = harness.application("urn:plant:press").await.unwrap();
    assert_eq!(before.generation_id, after.generation_id);
}

#[tokio::test]
async fn test_staleness_round_trip() {
    let harness = TestRegistry::new();
    harness.reconcile(&press_and_mixer()).await.unwrap();
    harness.take_events();

    // Mixer disappears.
    let report = harness.reconcile(&press_only().at(Clock::at(10))).await.unwrap();
    assert_eq!(report.lost, 2);
    let events = harness.take_events();
    assert_event_count(&events, EntityKind::Application, ChangeKind::Lost, 1);
    assert_event_count(&events, EntityKind::Endpoint, ChangeKind::Lost, 1);
    assert_one_event_per_record(&events);

    let mixer = harness.application("urn:plant:mixer").await.unwrap();
    assert_stale(&mixer);
    assert_eq!(mixer.not_seen_since, Some(Clock::at(10)));
    assert!(mixer.is_owned_by(&DiscovererFixtures::hall_a()));
    assert_endpoints_stale(&harness.endpoints_of("urn:plant:mixer").await, true);

    // Still missing: the first not-seen time is kept and nothing is emitted.
    let report = harness.reconcile(&press_only().at(Clock::at(20))).await.unwrap();
    assert_eq!(report.changes(), 0);
    assert_no_events(&harness.take_events());
    let mixer = harness.application("urn:plant:mixer").await.unwrap();
    assert_eq!(mixer.not_seen_since, Some(Clock::at(10)));

    // Mixer comes back.
    let report = harness.reconcile(&press_and_mixer().at(Clock::at(30))).await.unwrap();
    assert_eq!(report.found, 2);
    let events = harness.take_events();
    assert_event_count(&events, EntityKind::Application, ChangeKind::Found, 1);
    assert_event_count(&events, EntityKind::Endpoint, ChangeKind::Found, 1);
    assert_event_count(&events, EntityKind::Application, ChangeKind::Updated, 0);

    let mixer = harness.application("urn:plant:mixer").await.unwrap();
    assert_owned_and_seen(&mixer, &DiscovererFixtures::hall_a());
    assert_endpoints_stale(&harness.endpoints_of("urn:plant:mixer").await, false);
}

#[tokio::test]
async fn test_new_endpoint_on_known_application() {
    let harness = TestRegistry::new();
    harness.reconcile(&press_only()).await.unwrap();
    harness.take_events();
    harness.recorder.clear();

    let sweep = SweepBuilder::new(DiscovererFixtures::hall_a())
        .at(Clock::at(5))
        .finding(
            ApplicationFixtures::press(),
            vec![
                EndpointFixtures::plain("opc.tcp://press:4840"),
                EndpointFixtures::secured("opc.tcp://press:4843"),
            ],
        );
    let report = harness.reconcile(&sweep).await.unwrap();
    assert_eq!(report.endpoints, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.updated, 0);

    let events = harness.take_events();
    assert_eq!(events.len(), 1);
    assert_event_count(&events, EntityKind::Endpoint, ChangeKind::New, 1);

    let calls = harness.recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].entity, "endpoint");
    assert_eq!(calls[0].authority, DiscovererFixtures::hall_a().as_str());
    assert_eq!(harness.endpoints_of("urn:plant:press").await.len(), 2);
}

#[tokio::test]
async fn test_capability_change_is_an_update() {
    let harness = TestRegistry::new();
    harness.reconcile(&press_only()).await.unwrap();
    harness.take_events();

    let sweep = SweepBuilder::new(DiscovererFixtures::hall_a())
        .at(Clock::at(5))
        .finding(
            ApplicationFixtures::press().with_capability("LDS"),
            vec![EndpointFixtures::plain("opc.tcp://press:4840")],
        );
    let report = harness.reconcile(&sweep).await.unwrap();
    assert_eq!(report.updated, 1);

    let events = harness.take_events();
    assert_event_count(&events, EntityKind::Application, ChangeKind::Updated, 1);
    assert_eq!(events.len(), 1);
    let press = harness.application("urn:plant:press").await.unwrap();
    assert_capabilities(&press, &["LDS"]);
    assert!(press.updated.is_some());
}

#[tokio::test]
async fn test_register_only_sweep_marks_nothing() {
    let harness = TestRegistry::new();
    harness.reconcile(&press_and_mixer()).await.unwrap();
    harness.take_events();

    let report = harness
        .reconcile(&press_only().at(Clock::at(10)).register_only())
        .await
        .unwrap();
    assert!(report.register_only);
    assert_eq!(report.lost, 0);
    assert_no_events(&harness.take_events());
    assert!(!harness.application("urn:plant:mixer").await.unwrap().is_stale());
}

#[tokio::test]
async fn test_empty_sweep_loses_everything_owned() {
    let harness = TestRegistry::new();
    harness.reconcile(&press_and_mixer()).await.unwrap();

    let report = harness
        .reconcile(&SweepBuilder::new(DiscovererFixtures::hall_a()).at(Clock::at(10)))
        .await
        .unwrap();
    assert_eq!(report.applications, 0);
    assert_eq!(report.lost, 4);
    for app in harness.owned_by(&DiscovererFixtures::hall_a()).await {
        assert_stale(&app);
    }
}

#[tokio::test]
async fn test_live_record_is_not_taken_over() {
    let harness = TestRegistry::new();
    harness.reconcile(&press_only()).await.unwrap();

    let other = SweepBuilder::new(DiscovererFixtures::hall_b())
        .at(Clock::at(5))
        .finding(
            ApplicationFixtures::press(),
            vec![EndpointFixtures::plain("opc.tcp://press:4840")],
        );
    harness.reconcile(&other).await.unwrap();
    let press = harness.application("urn:plant:press").await.unwrap();
    assert_owned_and_seen(&press, &DiscovererFixtures::hall_a());

    // An empty sweep of the other discoverer does not touch records it does not own.
    let report = harness
        .reconcile(&SweepBuilder::new(DiscovererFixtures::hall_b()).at(Clock::at(6)))
        .await
        .unwrap();
    assert_eq!(report.lost, 0);
}

#[tokio::test]
async fn test_alternating_discoverers_settle() {
    let harness = TestRegistry::new();
    let sweep = |discoverer: DiscovererId, name: &str, minute: i64| {
        SweepBuilder::new(discoverer).at(Clock::at(minute)).finding(
            ApplicationFixtures::press().with_name(name),
            vec![EndpointFixtures::plain("opc.tcp://press:4840")],
        )
    };
    harness
        .reconcile(&sweep(DiscovererFixtures::hall_a(), "Press A", 0))
        .await
        .unwrap();
    harness.take_events();

    let mut updated_per_pass = Vec::new();
    for round in 1..=4 {
        let minute = round * 2;
        harness
            .reconcile(&sweep(DiscovererFixtures::hall_b(), "Press B", minute - 1))
            .await
            .unwrap();
        harness
            .reconcile(&sweep(DiscovererFixtures::hall_a(), "Press A", minute))
            .await
            .unwrap();
        let events = harness.take_events();
        updated_per_pass.push(count_events(&events, EntityKind::Application, ChangeKind::Updated));
    }
    assert_eq!(updated_per_pass, vec![0, 0, 0, 0]);

    let press = harness.application("urn:plant:press").await.unwrap();
    assert_eq!(press.application_name.as_deref(), Some("Press A"));
    assert_owned_and_seen(&press, &DiscovererFixtures::hall_a());
}

#[tokio::test]
async fn test_stale_record_is_taken_over() {
    let harness = TestRegistry::new();
    harness.reconcile(&press_only()).await.unwrap();
    harness
        .reconcile(&SweepBuilder::new(DiscovererFixtures::hall_a()).at(Clock::at(10)))
        .await
        .unwrap();
    harness.take_events();

    let other = SweepBuilder::new(DiscovererFixtures::hall_b())
        .at(Clock::at(20))
        .finding(
            ApplicationFixtures::press(),
            vec![EndpointFixtures::plain("opc.tcp://press:4840")],
        );
    let report = harness.reconcile(&other).await.unwrap();
    assert_eq!(report.found, 2);

    let press = harness.application("urn:plant:press").await.unwrap();
    assert_owned_and_seen(&press, &DiscovererFixtures::hall_b());
    for endpoint in harness.endpoints_of("urn:plant:press").await {
        assert!(endpoint.is_owned_by(&DiscovererFixtures::hall_b()));
    }
    assert!(harness.owned_by(&DiscovererFixtures::hall_a()).await.is_empty());
}

#[tokio::test]
async fn test_manual_registration_keeps_owner() {
    let harness = TestRegistry::new();
    harness.reconcile(&press_only()).await.unwrap();

    let (app, endpoints) = RegistrationBuilder::from_application(ApplicationFixtures::press())
        .capability("DA")
        .endpoint("opc.tcp://press:4840")
        .build();
    harness
        .registry
        .applications()
        .register(app, endpoints, &harness.operator())
        .await
        .unwrap();

    let press = harness.application("urn:plant:press").await.unwrap();
    assert_owned_and_seen(&press, &DiscovererFixtures::hall_a());
    assert_capabilities(&press, &["DA"]);
    assert_eq!(
        press.updated.as_ref().map(|c| c.authority_id.as_str()),
        Some("operator@plant")
    );
}

// =============================================================================
// Processor
// =============================================================================

#[tokio::test]
async fn test_fed_sweep_is_reconciled_on_summary() {
    let harness = TestRegistry::new();
    let sweep = press_and_mixer();

    let dispositions = harness.feed(&sweep).await.unwrap();
    assert_eq!(dispositions.len(), 3);
    assert_eq!(dispositions[0], Disposition::Buffered);
    assert_eq!(dispositions[1], Disposition::Buffered);
    match &dispositions[2] {
        Disposition::Reconciled(report) => assert_eq!(report.created, 4),
        other => panic!("expected reconciliation, got {:?}", other),
    }
    assert_eq!(harness.processor.pending_sweeps(), 0);
    assert_eq!(harness.processor.metrics().sweeps_reconciled, 1);
}

#[tokio::test]
async fn test_summary_without_findings_reconciles_empty_sweep() {
    let harness = TestRegistry::new();
    harness.feed(&press_only()).await.unwrap();

    let empty = SweepBuilder::new(DiscovererFixtures::hall_a()).at(Clock::at(10));
    let dispositions = harness.feed(&empty).await.unwrap();
    assert_eq!(dispositions.len(), 1);
    assert!(dispositions[0].is_reconciled());
    assert_stale(&harness.application("urn:plant:press").await.unwrap());
}

#[tokio::test]
async fn test_late_result_is_dropped() {
    let harness = TestRegistry::new();
    let newer = press_only().at(Clock::at(10));
    let older = press_and_mixer();

    let first = harness.processor.process(newer.findings()[0].clone()).await.unwrap();
    assert_eq!(first, Disposition::Buffered);
    let late = harness.processor.process(older.findings()[1].clone()).await.unwrap();
    assert_eq!(late, Disposition::Dropped(DropReason::Late));
    let late_summary = harness.processor.process(older.summary()).await.unwrap();
    assert_eq!(late_summary, Disposition::Dropped(DropReason::Late));

    let done = harness.processor.process(newer.summary()).await.unwrap();
    assert!(done.is_reconciled());
    assert!(harness.application("urn:plant:mixer").await.is_none());
}

#[tokio::test]
async fn test_newer_sweep_abandons_older() {
    let harness = TestRegistry::new();
    let older = press_and_mixer();
    let newer = press_only().at(Clock::at(10));

    harness.processor.process(older.findings()[1].clone()).await.unwrap();
    for result in newer.results() {
        harness.processor.process(result).await.unwrap();
    }

    assert_eq!(harness.processor.metrics().sweeps_abandoned, 1);
    assert!(harness.application("urn:plant:press").await.is_some());
    assert!(harness.application("urn:plant:mixer").await.is_none());
}

#[tokio::test]
async fn test_overflowing_sweep_is_discarded() {
    let harness = TestRegistry::with_config(RegistryConfig::for_testing().with_max_sweep_results(1));

    let dispositions = harness.feed(&press_and_mixer()).await.unwrap();
    assert_eq!(dispositions[0], Disposition::Buffered);
    assert_eq!(dispositions[1], Disposition::Dropped(DropReason::Overflow));
    assert_eq!(dispositions[2], Disposition::Dropped(DropReason::Overflow));
    assert!(harness.application("urn:plant:press").await.is_none());
    assert_no_events(&harness.take_events());
}

#[tokio::test]
async fn test_sweep_completes_routed_request() {
    let harness = TestRegistry::new();
    let hall_a = DiscovererFixtures::hall_a();
    harness
        .registry
        .modules()
        .register(DiscovererFixtures::module(&hall_a), &OperationContext::system())
        .await
        .unwrap();

    let mut requests = harness.bus.subscribe(DISCOVERY_REQUESTS_TOPIC).unwrap();
    let routed = harness
        .coordinator
        .discover(DiscovererFixtures::request(&hall_a), &harness.operator())
        .await
        .unwrap();
    assert!(requests.try_recv().unwrap().is_some());
    assert_eq!(harness.coordinator.pending().len(), 1);

    harness.feed(&press_only().for_request(routed.id.clone())).await.unwrap();
    assert!(harness.coordinator.pending().is_empty());
    assert_eq!(harness.coordinator.metrics().completed, 1);
}

// =============================================================================
// Processor loop
// =============================================================================

#[tokio::test]
async fn test_undecodable_payload_does_not_abort_sweep() {
    let harness = TestRegistry::new();
    let running = RunningProcessor::start(Arc::clone(&harness.processor), &harness.bus);
    let sweep = press_and_mixer();
    let findings = sweep.findings();

    publish_results(&harness.bus, [findings[0].clone()]).await;
    harness
        .bus
        .publish(DISCOVERY_RESULTS_TOPIC, b"{\"discoverer_id\": 7".to_vec())
        .await
        .unwrap();
    publish_results(&harness.bus, [findings[1].clone(), sweep.summary()]).await;

    let metrics = running.wait_until(|m| m.sweeps_reconciled == 1).await;
    assert_eq!(metrics.malformed, 1);
    assert_eq!(metrics.results, 3);
    assert!(harness.application("urn:plant:press").await.is_some());
    assert!(harness.application("urn:plant:mixer").await.is_some());

    running.stop().await;
}

#[tokio::test]
async fn test_stop_reconciles_queued_sweeps() {
    let harness = TestRegistry::new();
    let running = RunningProcessor::start(Arc::clone(&harness.processor), &harness.bus);

    publish_results(&harness.bus, press_only().results()).await;
    publish_results(
        &harness.bus,
        SweepBuilder::new(DiscovererFixtures::hall_b())
            .finding(ApplicationFixtures::lds(), vec![])
            .results(),
    )
    .await;
    running.wait_until(|m| m.results == 4).await;
    running.stop().await;

    assert_eq!(harness.processor.metrics().sweeps_reconciled, 2);
    assert!(harness.application("urn:plant:press").await.is_some());
}

#[tokio::test]
async fn test_lagged_results_never_mark_records_lost() {
    let harness = TestRegistry::new();
    let hall_b = SweepBuilder::new(DiscovererFixtures::hall_b()).finding(ApplicationFixtures::press(), vec![]);
    harness.reconcile(&hall_b).await.unwrap();

    let bus = InMemoryEventBus::new(4);
    let processor = Arc::new(SweepProcessor::new(
        Arc::clone(harness.registry.reconciler()),
        &RegistryConfig::for_testing(),
    ));
    let running = RunningProcessor::start(Arc::clone(&processor), &bus);

    // hall_b opens its next sweep.
    let hall_b = hall_b.at(Clock::at(1));
    publish_results(&bus, hall_b.findings()).await;
    running.wait_until(|m| m.results == 1).await;

    // A burst from hall_a overruns the subscription before hall_b closes.
    let mut hall_a = SweepBuilder::new(DiscovererFixtures::hall_a()).at(Clock::at(1));
    for application in ApplicationFixtures::batch(12) {
        hall_a = hall_a.finding(application, vec![]);
    }
    publish_results(&bus, hall_a.results()).await;
    publish_results(&bus, [hall_b.summary()]).await;

    let metrics = running.wait_until(|m| m.results == 5).await;
    assert_eq!(metrics.lagged, 10);
    assert_eq!(metrics.sweeps_reconciled, 0);
    assert_eq!(metrics.sweeps_abandoned, 2);

    let press = harness.application("urn:plant:press").await.unwrap();
    assert_eq!(press.not_seen_since, None);
    assert!(harness.owned_by(&DiscovererFixtures::hall_a()).await.is_empty());

    running.stop().await;
}
