// # wddns-core
//
// Core library for the weighted dynamic DNS client.
//
// ## Architecture Overview
//
// This library keeps one weighted A-record in sync with the host's public
// IPv4 address:
// - **AddressSource**: Trait for one external "what is my address" observer
// - **AddressDetector**: Queries all sources and resolves them by weighted majority
// - **DnsProvider**: Trait for upserting the record via a provider API
// - **RecordReconciler**: Owns the desired record and issues idempotent upserts
// - **ReconciliationLoop**: Detect → upsert → sleep, until shutdown
// - **Identity**: Per-process set identifier inside the weighted record set
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from network implementations
// 2. **Convergent**: Every cycle upserts the full desired state; nothing is diffed
// 3. **Non-fatal cycles**: Detection and provider failures are logged and retried
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod identity;
pub mod reconciler;
pub mod traits;

// Re-export core types for convenience
pub use config::{DetectorConfig, EngineConfig, ProviderConfig, RecordConfig, SourceConfig, WddnsConfig};
pub use detector::{AddressDetector, Consensus};
pub use engine::{CycleOutcome, LoopEvent, LoopState, ReconciliationLoop};
pub use error::{Error, Result};
pub use identity::Identity;
pub use reconciler::{DesiredRecord, RecordReconciler, UpsertResult};
pub use traits::{AddressSource, ChangeConfirmation, ChangeStatus, DnsProvider, RecordSet, RecordType};
