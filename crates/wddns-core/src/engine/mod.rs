//! Reconciliation loop
//!
//! The ReconciliationLoop is responsible for:
//! - Detecting the external address via the AddressDetector
//! - Upserting the weighted record via the RecordReconciler
//! - Sleeping for the refresh interval, with backoff while upserts are rejected
//! - Emitting events for monitoring
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────────┐
//!            │ AddressDetector  │
//!            └──────────────────┘
//!                     │ Consensus
//!                     ▼
//!          ┌─────────────────────┐          ┌──────────────┐
//!          │ ReconciliationLoop  │─────────►│   Events     │
//!          └─────────────────────┘          │  (notify)    │
//!                     │ address             └──────────────┘
//!                     ▼
//!            ┌──────────────────┐
//!            │ RecordReconciler │──► DnsProvider (UPSERT)
//!            └──────────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. `Detecting`: ask the detector; on failure skip to 3
//! 2. `Reconciling`: upsert the record with the detected address
//! 3. `Idle`: sleep, then start over
//!
//! No failure ends the loop. Only a shutdown signal does, and it is honoured
//! both mid-cycle and during the sleep.

use crate::config::EngineConfig;
use crate::detector::AddressDetector;
use crate::error::Result;
use crate::reconciler::{RecordReconciler, UpsertResult};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Events emitted by the ReconciliationLoop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// Loop started
    Started {
        record_name: String,
        set_identifier: String,
    },

    /// Detection reached consensus
    AddressDetected {
        address: Ipv4Addr,
        votes: u64,
        total_weight: u64,
    },

    /// Detection failed; this cycle's upsert is skipped
    DetectionFailed { error: String },

    /// Provider accepted the upsert
    UpsertSucceeded {
        record_name: String,
        address: Ipv4Addr,
        previous: Option<Ipv4Addr>,
        change_id: String,
    },

    /// Provider rejected the upsert
    UpsertRejected {
        record_name: String,
        address: Ipv4Addr,
        error: String,
        consecutive_rejections: u32,
    },

    /// Loop is going to sleep before the next cycle
    Sleeping { delay: Duration },

    /// Loop stopped
    Stopped { reason: String },
}

/// Where the loop currently is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Between cycles
    Idle,
    /// Querying address sources
    Detecting,
    /// Waiting on the provider
    Reconciling,
}

/// Result of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The record was upserted
    Applied(UpsertResult),
    /// No consensus; nothing was sent to the provider
    DetectionFailed { message: String },
    /// The provider refused the change
    UpsertRejected { address: Ipv4Addr, message: String },
}

/// Sleep before the next cycle after `rejections` consecutive rejections
///
/// Zero rejections sleep for `refresh`. Each further rejection doubles the
/// sleep, up to `max(max_backoff, refresh)`.
pub fn backoff_delay(refresh: Duration, max_backoff: Duration, rejections: u32) -> Duration {
    if rejections == 0 {
        return refresh;
    }
    let cap = max_backoff.max(refresh);
    let factor = 2u32.saturating_pow(rejections - 1);
    refresh.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// The detect → upsert → sleep loop
///
/// ## Lifecycle
///
/// 1. Create with [`ReconciliationLoop::new()`]
/// 2. Start with [`ReconciliationLoop::run()`]
/// 3. Loop runs until a shutdown signal is received
///
/// ## Threading
///
/// Everything runs on the caller's task. Cycles never overlap, so the
/// reconciler's state is only ever touched by one cycle at a time.
///
/// The event channel is bounded; when it is full, events are dropped with a
/// warning instead of stalling the loop.
pub struct ReconciliationLoop {
    detector: AddressDetector,
    reconciler: RecordReconciler,
    refresh_interval: Duration,
    max_backoff: Duration,
    consecutive_rejections: u32,
    state: LoopState,
    event_tx: mpsc::Sender<LoopEvent>,
    events_closed: AtomicBool,
}

impl ReconciliationLoop {
    /// Create a new loop
    ///
    /// # Returns
    ///
    /// A tuple of (loop, event_receiver) where event_receiver yields loop events
    pub fn new(
        detector: AddressDetector,
        reconciler: RecordReconciler,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<LoopEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            detector,
            reconciler,
            refresh_interval: config.refresh_interval(),
            max_backoff: config.max_backoff(),
            consecutive_rejections: 0,
            state: LoopState::Idle,
            event_tx: tx,
            events_closed: AtomicBool::new(false),
        };

        Ok((engine, rx))
    }

    /// Run until Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        self.run_with_shutdown(None).await
    }

    /// Run until `shutdown_rx` fires (or is dropped)
    ///
    /// With `None`, the loop stops on Ctrl-C instead.
    pub async fn run_with_shutdown(&mut self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        info!(
            "Keeping {} A (set {}) in sync via {}",
            self.reconciler.desired().name,
            self.reconciler.identity(),
            self.reconciler.provider_name()
        );
        self.emit_event(LoopEvent::Started {
            record_name: self.reconciler.desired().name.clone(),
            set_identifier: self.reconciler.identity().to_string(),
        });

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.run_cycle() => {}
            }

            let delay = self.next_delay();
            debug!("Next cycle in {:?}", delay);
            self.emit_event(LoopEvent::Sleeping { delay });

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state = LoopState::Idle;
        info!("Shutdown signal received, loop stopped");
        self.emit_event(LoopEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        Ok(())
    }

    /// Run exactly one detect → upsert cycle
    ///
    /// Failures are logged, emitted as events and returned as outcomes; they
    /// never abort the loop.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.state = LoopState::Detecting;

        let consensus = match self.detector.detect().await {
            Ok(consensus) => consensus,
            Err(e) => {
                error!("Skipping upsert this cycle: {}", e);
                let message = e.to_string();
                self.emit_event(LoopEvent::DetectionFailed {
                    error: message.clone(),
                });
                self.state = LoopState::Idle;
                return CycleOutcome::DetectionFailed { message };
            }
        };

        self.emit_event(LoopEvent::AddressDetected {
            address: consensus.address,
            votes: consensus.votes,
            total_weight: consensus.total_weight,
        });

        self.state = LoopState::Reconciling;
        let record_name = self.reconciler.desired().name.clone();

        let outcome = match self.reconciler.reconcile(consensus.address).await {
            Ok(result) => {
                if self.consecutive_rejections > 0 {
                    info!(
                        "Upsert accepted after {} rejected attempt(s)",
                        self.consecutive_rejections
                    );
                }
                self.consecutive_rejections = 0;
                self.emit_event(LoopEvent::UpsertSucceeded {
                    record_name,
                    address: consensus.address,
                    previous: result.previous,
                    change_id: result.confirmation.change_id.clone(),
                });
                CycleOutcome::Applied(result)
            }
            Err(e) => {
                self.consecutive_rejections = self.consecutive_rejections.saturating_add(1);
                error!(
                    "Failed to upsert {} -> {} (rejection #{}): {}",
                    record_name, consensus.address, self.consecutive_rejections, e
                );
                let message = e.to_string();
                self.emit_event(LoopEvent::UpsertRejected {
                    record_name,
                    address: consensus.address,
                    error: message.clone(),
                    consecutive_rejections: self.consecutive_rejections,
                });
                CycleOutcome::UpsertRejected {
                    address: consensus.address,
                    message,
                }
            }
        };

        self.state = LoopState::Idle;
        outcome
    }

    /// Current position in the cycle
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Sleep that will follow the current cycle
    pub fn next_delay(&self) -> Duration {
        backoff_delay(
            self.refresh_interval,
            self.max_backoff,
            self.consecutive_rejections,
        )
    }

    /// Upserts rejected in a row since the last accepted one
    pub fn consecutive_rejections(&self) -> u32 {
        self.consecutive_rejections
    }

    /// The record reconciler
    pub fn reconciler(&self) -> &RecordReconciler {
        &self.reconciler
    }

    /// Emit a loop event
    fn emit_event(&self, event: LoopEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {
                if !self.events_closed.swap(true, Ordering::Relaxed) {
                    debug!("Event receiver dropped, no further events will be sent");
                }
            }
        }
    }
}
