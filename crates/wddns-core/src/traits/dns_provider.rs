// # DNS Provider Trait
//
// Defines the interface for upserting the weighted A-record via a provider API.
//
// ## Implementations
//
// - Route 53: `wddns-provider-route53` crate
//
// ## Usage
//
// ```rust,ignore
// use wddns_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let confirmation = provider.upsert_record("Z123", &record_set).await?;
//     println!("change {} is {}", confirmation.change_id, confirmation.status);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// DNS record type
///
/// Only address records are managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A record (IPv4)
    A,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One weighted resource record set, as sent in an UPSERT change
///
/// The provider-side key is `(name, record_type, set_identifier)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Record values
    pub values: Vec<Ipv4Addr>,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Routing weight
    pub weight: u8,
    /// Set identifier distinguishing this record in the weighted group
    pub set_identifier: String,
    /// Comment for the change batch
    pub comment: String,
}

impl RecordSet {
    /// Key under which the provider stores this record set
    pub fn key(&self) -> (&str, RecordType, &str) {
        (&self.name, self.record_type, &self.set_identifier)
    }
}

/// Provider-side status of a submitted change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    /// Accepted, not yet propagated to all authoritative servers
    Pending,
    /// Propagated
    InSync,
    /// Any status the provider reports that we don't know
    Unknown(String),
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeStatus::Pending => f.write_str("PENDING"),
            ChangeStatus::InSync => f.write_str("INSYNC"),
            ChangeStatus::Unknown(s) => f.write_str(s),
        }
    }
}

/// Confirmation returned by the provider for an accepted change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeConfirmation {
    /// Provider change identifier
    pub change_id: String,
    /// Change status at submission time
    pub status: ChangeStatus,
}

/// Trait for DNS provider implementations
///
/// # Responsibilities
///
/// - Issue exactly one UPSERT call per invocation
/// - Map provider refusals to [`Error::UpsertRejected`](crate::Error::UpsertRejected)
///   with the provider's code and message
///
/// Providers must not retry, back off, sleep or cache. The
/// [`ReconciliationLoop`](crate::engine::ReconciliationLoop) owns the retry
/// policy and the [`RecordReconciler`](crate::reconciler::RecordReconciler)
/// owns the timeout.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create or replace the record set in the given hosted zone
    ///
    /// # Idempotency
    ///
    /// Applying the same record set repeatedly must leave the provider in the
    /// same state as applying it once.
    ///
    /// # Parameters
    ///
    /// - `zone_id`: Hosted zone identifier
    /// - `record`: The full desired record set
    ///
    /// # Returns
    ///
    /// - `Ok(ChangeConfirmation)`: The provider accepted the change
    /// - `Err(Error)`: The provider rejected the change or could not be reached
    async fn upsert_record(
        &self,
        zone_id: &str,
        record: &RecordSet,
    ) -> Result<ChangeConfirmation, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
