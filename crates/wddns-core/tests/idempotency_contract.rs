//! Contract Test: Upsert Idempotency & Identity
//!
//! This test verifies that repeated upserts converge on one provider-side
//! state and that each process writes under one stable set identifier.
//!
//! Constraints verified:
//! - Reconciling twice with the same address leaves one record, not two
//! - The set identifier is the same for every cycle of a run
//! - Independent runs write independent records in the weighted set
//!
//! If this test fails, restarts or steady-state cycles are multiplying records.

mod common;

use common::*;
use std::net::Ipv4Addr;
use wddns_core::traits::RecordType;
use wddns_core::{CycleOutcome, LoopEvent};

const DETECTED: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 7);

#[tokio::test]
async fn first_cycle_issues_the_expected_upsert() {
    let provider = InMemoryProvider::new();
    let (mut engine, mut events) = build_loop(
        vec![ScriptedSource::steady("a", DETECTED)],
        provider.clone(),
        &minimal_engine_config(),
    );

    let outcome = engine.run_cycle().await;
    let result = match outcome {
        CycleOutcome::Applied(result) => result,
        other => panic!("expected an applied upsert, got {other:?}"),
    };

    assert_eq!(provider.upsert_count(), 1);
    let records = provider.records();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record, &result.record);
    assert_eq!(record.name, "home.example.com");
    assert_eq!(record.record_type, RecordType::A);
    assert_eq!(record.values, vec![DETECTED]);
    assert_eq!(record.ttl, 60);
    assert_eq!(record.weight, 1);
    assert_eq!(record.set_identifier.len(), 10);
    assert!(record.set_identifier.chars().all(|c| c.is_ascii_alphanumeric()));

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        LoopEvent::UpsertSucceeded { address, previous: None, .. } if *address == DETECTED
    )));
}

#[tokio::test]
async fn repeated_upserts_leave_one_record() {
    let provider = InMemoryProvider::new();
    let (mut engine, _events) = build_loop(
        vec![ScriptedSource::steady("a", DETECTED)],
        provider.clone(),
        &minimal_engine_config(),
    );

    engine.run_cycle().await;
    let after_first = provider.records();

    engine.run_cycle().await;
    engine.run_cycle().await;

    assert_eq!(provider.upsert_count(), 3);
    assert_eq!(provider.records(), after_first);
}

#[tokio::test]
async fn identity_is_stable_within_a_run() {
    let provider = InMemoryProvider::new();
    let (mut engine, _events) = build_loop(
        vec![ScriptedSource::new(
            "a",
            vec![Some(DETECTED), Some(Ipv4Addr::new(198, 51, 100, 4))],
        )],
        provider.clone(),
        &minimal_engine_config(),
    );
    let identity = engine.reconciler().identity().clone();

    let mut seen = Vec::new();
    for _ in 0..4 {
        if let CycleOutcome::Applied(result) = engine.run_cycle().await {
            seen.push(result.record.set_identifier);
        }
    }

    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|id| id == identity.as_str()));
    // The address changed between cycles, but the record was replaced in place
    assert_eq!(provider.records().len(), 1);
}

#[tokio::test]
async fn independent_runs_write_separate_weighted_records() {
    let provider = InMemoryProvider::new();
    let config = minimal_engine_config();

    let (mut first, _e1) = build_loop(vec![ScriptedSource::steady("a", DETECTED)], provider.clone(), &config);
    let (mut second, _e2) = build_loop(vec![ScriptedSource::steady("a", DETECTED)], provider.clone(), &config);
    assert_ne!(first.reconciler().identity(), second.reconciler().identity());

    first.run_cycle().await;
    second.run_cycle().await;

    let records = provider.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.name == NAME && r.values == vec![DETECTED]));
}
