//! Test doubles and common utilities for loop contract tests
//!
//! This module provides minimal test doubles for the two network seams.
//! Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use wddns_core::error::{Error, Result};
use wddns_core::traits::{AddressSource, ChangeConfirmation, ChangeStatus, DnsProvider, RecordSet, RecordType};
use wddns_core::{AddressDetector, EngineConfig, Identity, LoopEvent, RecordConfig, RecordReconciler, ReconciliationLoop};

/// An address source that plays back a script, one entry per fetch
///
/// `None` entries fail. Once the script has one entry left, that entry is
/// repeated forever.
pub struct ScriptedSource {
    name: String,
    weight: u32,
    script: Mutex<VecDeque<Option<Ipv4Addr>>>,
    fetch_count: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(name: &str, script: Vec<Option<Ipv4Addr>>) -> Self {
        assert!(!script.is_empty(), "script needs at least one entry");
        Self {
            name: name.to_string(),
            weight: 1,
            script: Mutex::new(script.into()),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Source that always reports `address`
    pub fn steady(name: &str, address: Ipv4Addr) -> Self {
        Self::new(name, vec![Some(address)])
    }

    /// Source that always fails
    pub fn failing(name: &str) -> Self {
        Self::new(name, vec![None])
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Shared counter of fetch() calls, usable after the source is moved
    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetch_count)
    }
}

#[async_trait::async_trait]
impl AddressSource for ScriptedSource {
    async fn fetch(&self) -> Result<Ipv4Addr> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().copied().flatten()
        };
        next.ok_or_else(|| Error::source_failed(&self.name, "scripted failure"))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> u32 {
        self.weight
    }
}

type RecordKey = (String, String, RecordType, String);

/// An in-memory provider keyed the way Route 53 keys weighted records
///
/// Clones share state, so a test can keep one handle while the loop owns
/// another.
#[derive(Clone, Default)]
pub struct InMemoryProvider {
    records: Arc<Mutex<HashMap<RecordKey, RecordSet>>>,
    upsert_count: Arc<AtomicUsize>,
    reject_with: Arc<Mutex<Option<String>>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of times upsert_record() was called
    pub fn upsert_count(&self) -> usize {
        self.upsert_count.load(Ordering::SeqCst)
    }

    /// Reject every following upsert with `code`, or accept again with `None`
    pub fn set_rejecting(&self, code: Option<&str>) {
        *self.reject_with.lock().unwrap() = code.map(str::to_string);
    }

    /// All stored record sets
    pub fn records(&self) -> Vec<RecordSet> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    /// Stored values for `name` under `set_identifier`
    pub fn values(&self, name: &str, set_identifier: &str) -> Option<Vec<Ipv4Addr>> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|((_, n, _, id), _)| n == name && id == set_identifier)
            .map(|(_, record)| record.values.clone())
    }
}

#[async_trait::async_trait]
impl DnsProvider for InMemoryProvider {
    async fn upsert_record(&self, zone_id: &str, record: &RecordSet) -> Result<ChangeConfirmation> {
        let call = self.upsert_count.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(code) = self.reject_with.lock().unwrap().clone() {
            return Err(Error::upsert_rejected(
                "memory",
                Some(code),
                "User is not authorized to perform: route53:ChangeResourceRecordSets",
            ));
        }

        let key = (
            zone_id.to_string(),
            record.name.clone(),
            record.record_type,
            record.set_identifier.clone(),
        );
        self.records.lock().unwrap().insert(key, record.clone());

        Ok(ChangeConfirmation {
            change_id: format!("C{call}"),
            status: ChangeStatus::InSync,
        })
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

pub const ZONE: &str = "Z123";
pub const NAME: &str = "home.example.com";

/// Helper to create an engine config with a one-minute refresh
pub fn minimal_engine_config() -> EngineConfig {
    EngineConfig {
        refresh_interval_secs: 60,
        max_backoff_secs: 30 * 60,
        event_channel_capacity: 100,
    }
}

/// Build a loop over `sources` and `provider` with a fresh random identity
pub fn build_loop(
    sources: Vec<ScriptedSource>,
    provider: InMemoryProvider,
    config: &EngineConfig,
) -> (ReconciliationLoop, mpsc::Receiver<LoopEvent>) {
    let sources = sources
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn AddressSource>)
        .collect();
    let detector = AddressDetector::new(sources, Duration::from_secs(5)).expect("valid detector");
    let reconciler = RecordReconciler::new(
        Box::new(provider),
        &RecordConfig::new(NAME, ZONE),
        Identity::generate(),
        Duration::from_secs(30),
    );
    ReconciliationLoop::new(detector, reconciler, config).expect("loop construction succeeds")
}

/// Drain every event currently queued
pub fn drain(rx: &mut mpsc::Receiver<LoopEvent>) -> Vec<LoopEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
