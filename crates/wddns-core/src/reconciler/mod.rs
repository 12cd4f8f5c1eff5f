//! Record reconciliation
//!
//! The [`RecordReconciler`] owns the desired state of the one weighted
//! A-record and pushes it to the [`DnsProvider`] as an UPSERT.
//!
//! It never compares against the provider's current contents. The UPSERT is
//! sent on every call, whether or not the address changed, and converges the
//! provider to the desired tuple.

use crate::config::RecordConfig;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::traits::{ChangeConfirmation, DnsProvider, RecordSet, RecordType};
use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info};

/// Target state of the managed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRecord {
    /// Record name
    pub name: String,
    /// Hosted zone identifier (normalized)
    pub zone_id: String,
    /// Always [`RecordType::A`]
    pub record_type: RecordType,
    /// Most recently detected address; `None` until the first detection
    pub value: Option<Ipv4Addr>,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Routing weight
    pub weight: u8,
    /// This process's set identifier
    pub set_identifier: Identity,
    /// Change batch comment
    pub comment: String,
}

impl DesiredRecord {
    /// Build the desired record from configuration and the process identity
    pub fn new(config: &RecordConfig, identity: Identity) -> Self {
        Self {
            name: config.name.clone(),
            zone_id: config.normalized_zone_id().to_string(),
            record_type: RecordType::A,
            value: None,
            ttl: config.ttl,
            weight: config.weight,
            set_identifier: identity,
            comment: config.comment.clone(),
        }
    }

    /// Record set for `address`, keyed by name, type and set identifier
    pub fn record_set(&self, address: Ipv4Addr) -> RecordSet {
        RecordSet {
            name: self.name.clone(),
            record_type: self.record_type,
            values: vec![address],
            ttl: self.ttl,
            weight: self.weight,
            set_identifier: self.set_identifier.as_str().to_string(),
            comment: self.comment.clone(),
        }
    }
}

/// Result of an accepted upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertResult {
    /// The record set that was sent
    pub record: RecordSet,
    /// Provider confirmation
    pub confirmation: ChangeConfirmation,
    /// Value the provider had last confirmed before this call
    pub previous: Option<Ipv4Addr>,
    /// When the confirmation was received
    pub timestamp: DateTime<Utc>,
}

impl UpsertResult {
    /// Whether this upsert changed the address the provider last confirmed
    pub fn changed(&self) -> bool {
        self.previous != self.record.values.first().copied()
    }
}

/// Converges the provider's record to the desired state
pub struct RecordReconciler {
    provider: Box<dyn DnsProvider>,
    desired: DesiredRecord,
    last_applied: Option<Ipv4Addr>,
    upsert_timeout: Duration,
}

impl RecordReconciler {
    /// Create a reconciler for the record described by `config`
    ///
    /// The identity is fixed for the lifetime of the reconciler.
    pub fn new(
        provider: Box<dyn DnsProvider>,
        config: &RecordConfig,
        identity: Identity,
        upsert_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            desired: DesiredRecord::new(config, identity),
            last_applied: None,
            upsert_timeout,
        }
    }

    /// Upsert the record with `address` as its value
    ///
    /// The desired value is updated before the provider is called, so it
    /// reflects the latest detection even when the upsert fails.
    ///
    /// # Errors
    ///
    /// Every provider failure is reported as [`Error::UpsertRejected`]. A call
    /// that exceeds the upsert timeout carries the code `Timeout`.
    pub async fn reconcile(&mut self, address: Ipv4Addr) -> Result<UpsertResult> {
        self.desired.value = Some(address);
        let record = self.desired.record_set(address);
        let provider_name = self.provider.provider_name();

        debug!(
            "Upserting {} {} -> {} (set {}, ttl {}, weight {}) via {}",
            record.name,
            record.record_type,
            address,
            record.set_identifier,
            record.ttl,
            record.weight,
            provider_name
        );

        let confirmation = match tokio::time::timeout(
            self.upsert_timeout,
            self.provider.upsert_record(&self.desired.zone_id, &record),
        )
        .await
        {
            Ok(Ok(confirmation)) => confirmation,
            Ok(Err(e @ Error::UpsertRejected { .. })) => return Err(e),
            Ok(Err(e)) => return Err(Error::upsert_rejected(provider_name, None, e.to_string())),
            Err(_) => {
                return Err(Error::upsert_rejected(
                    provider_name,
                    Some("Timeout".to_string()),
                    format!("no response within {:?}", self.upsert_timeout),
                ));
            }
        };

        let previous = self.last_applied.replace(address);

        info!(
            "Upserted {} -> {} (change {}, {})",
            record.name, address, confirmation.change_id, confirmation.status
        );

        Ok(UpsertResult {
            record,
            confirmation,
            previous,
            timestamp: Utc::now(),
        })
    }

    /// Desired record state
    pub fn desired(&self) -> &DesiredRecord {
        &self.desired
    }

    /// Set identifier used for every upsert
    pub fn identity(&self) -> &Identity {
        &self.desired.set_identifier
    }

    /// Value the provider last confirmed
    pub fn last_applied(&self) -> Option<Ipv4Addr> {
        self.last_applied
    }

    /// Name of the underlying provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ChangeStatus;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingProvider {
        calls: Arc<Mutex<Vec<(String, RecordSet)>>>,
        reject: Option<&'static str>,
        hang: bool,
    }

    #[async_trait]
    impl DnsProvider for RecordingProvider {
        async fn upsert_record(&self, zone_id: &str, record: &RecordSet) -> Result<ChangeConfirmation> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.calls
                .lock()
                .unwrap()
                .push((zone_id.to_string(), record.clone()));
            match self.reject {
                Some(code) => Err(Error::upsert_rejected("recording", Some(code.to_string()), "denied")),
                None => Ok(ChangeConfirmation {
                    change_id: "C1".to_string(),
                    status: ChangeStatus::Pending,
                }),
            }
        }

        fn provider_name(&self) -> &'static str {
            "recording"
        }
    }

    fn reconciler(provider: RecordingProvider) -> RecordReconciler {
        let config = RecordConfig::new("home.example.com", "/hostedzone/Z123");
        RecordReconciler::new(
            Box::new(provider),
            &config,
            Identity::pinned("abcDEF1234").unwrap(),
            Duration::from_secs(30),
        )
    }

    const ADDR: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 7);

    #[tokio::test]
    async fn reconcile_sends_full_record_set() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut reconciler = reconciler(RecordingProvider {
            calls: calls.clone(),
            ..Default::default()
        });

        let result = reconciler.reconcile(ADDR).await.unwrap();
        assert_eq!(result.previous, None);
        assert!(result.changed());
        assert_eq!(reconciler.last_applied(), Some(ADDR));
        assert_eq!(reconciler.desired().value, Some(ADDR));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (zone_id, record) = &calls[0];
        assert_eq!(zone_id, "Z123");
        assert_eq!(record.name, "home.example.com");
        assert_eq!(record.record_type, RecordType::A);
        assert_eq!(record.values, vec![ADDR]);
        assert_eq!(record.ttl, 60);
        assert_eq!(record.weight, 1);
        assert_eq!(record.set_identifier, "abcDEF1234");
        assert_eq!(record.comment, "Dynamic DNS update.");
    }

    #[tokio::test]
    async fn repeated_reconcile_reports_unchanged() {
        let mut reconciler = reconciler(RecordingProvider::default());

        reconciler.reconcile(ADDR).await.unwrap();
        let second = reconciler.reconcile(ADDR).await.unwrap();
        assert_eq!(second.previous, Some(ADDR));
        assert!(!second.changed());
    }

    #[tokio::test]
    async fn rejection_keeps_desired_value_but_not_last_applied() {
        let mut reconciler = reconciler(RecordingProvider {
            reject: Some("AccessDenied"),
            ..Default::default()
        });

        let err = reconciler.reconcile(ADDR).await.unwrap_err();
        match err {
            Error::UpsertRejected { code, .. } => assert_eq!(code.as_deref(), Some("AccessDenied")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(reconciler.desired().value, Some(ADDR));
        assert_eq!(reconciler.last_applied(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_upsert_times_out_as_rejection() {
        let mut reconciler = reconciler(RecordingProvider {
            hang: true,
            ..Default::default()
        });

        let err = reconciler.reconcile(ADDR).await.unwrap_err();
        match err {
            Error::UpsertRejected { provider, code, .. } => {
                assert_eq!(provider, "recording");
                assert_eq!(code.as_deref(), Some("Timeout"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
