// # Route 53 DNS Provider
//
// This crate provides an AWS Route 53 DNS provider for the weighted DDNS client.
//
// ## Behaviour
//
// - One `ChangeResourceRecordSets` call per upsert
// - The change batch holds exactly one UPSERT of a weighted A-record set,
//   keyed by name, type and set identifier
// - Service errors are mapped to `Error::UpsertRejected` with the AWS error
//   code and message
// - Dry-run mode for safe testing
// - No retry, backoff or caching; the reconciliation loop owns those
//
// ## Credentials
//
// Credentials and region come from the AWS default provider chain
// (environment, shared config/profile, instance metadata). They never pass
// through this crate.
//
// ## API Reference
//
// - ChangeResourceRecordSets: https://docs.aws.amazon.com/Route53/latest/APIReference/API_ChangeResourceRecordSets.html

use async_trait::async_trait;
use aws_sdk_route53::Client;
use aws_sdk_route53::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ChangeStatus as Route53ChangeStatus, ResourceRecord, ResourceRecordSet, RrType,
};
use wddns_core::traits::{ChangeConfirmation, ChangeStatus, DnsProvider, RecordSet, RecordType};
use wddns_core::{Error, Result};

/// Provider name used in logs and errors
const PROVIDER_NAME: &str = "route53";

/// Change id reported for dry-run upserts
const DRY_RUN_CHANGE_ID: &str = "dry-run";

/// Route 53 DNS provider
///
/// This provider is stateless and single-shot. All coordination (retries,
/// backoff, scheduling) is owned by the `ReconciliationLoop`.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Build the change batch exactly as in live mode
/// - Log it
/// - **NOT** call the Route 53 API, and report the change as `PENDING`
pub struct Route53Provider {
    /// Route 53 API client
    client: Client,

    /// Dry-run mode: if true, log the change batch but don't send it
    dry_run: bool,
}

impl std::fmt::Debug for Route53Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route53Provider")
            .field("region", &self.client.config().region())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Route53Provider {
    /// Create a provider around an existing client
    pub fn new(client: Client, dry_run: bool) -> Self {
        Self { client, dry_run }
    }

    /// Create a new Route 53 provider (production/live mode)
    pub fn new_live(client: Client) -> Self {
        Self::new(client, false)
    }

    /// Create a new Route 53 provider (dry-run mode)
    pub fn new_dry_run(client: Client) -> Self {
        Self::new(client, true)
    }

    /// Create a provider from the AWS default configuration chain
    pub async fn from_env(dry_run: bool) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        tracing::debug!("Loaded AWS configuration (region: {:?})", config.region());
        Self::new(Client::new(&config), dry_run)
    }

    /// Whether this provider only logs changes
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    /// Upsert the weighted record set
    ///
    /// # API Call
    ///
    /// ```text
    /// POST /2013-04-01/hostedzone/{zone_id}/rrset
    /// ChangeBatch { Comment, Changes: [ { Action: UPSERT, ResourceRecordSet } ] }
    /// ```
    async fn upsert_record(&self, zone_id: &str, record: &RecordSet) -> Result<ChangeConfirmation> {
        tracing::info!(
            "Upserting Route 53 record: {} {} -> {:?} (set {}, zone {}) [mode: {}]",
            record.name,
            record.record_type,
            record.values,
            record.set_identifier,
            zone_id,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let batch = build_change_batch(record)
            .map_err(|e| Error::upsert_rejected(PROVIDER_NAME, Some("InvalidInput".to_string()), e.to_string()))?;

        if self.dry_run {
            let payload = serde_json::to_string(record)?;
            tracing::info!("[DRY-RUN] Would send UPSERT to zone {}: {}", zone_id, payload);
            return Ok(ChangeConfirmation {
                change_id: DRY_RUN_CHANGE_ID.to_string(),
                status: ChangeStatus::Pending,
            });
        }

        let output = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let confirmation = match output.change_info() {
            Some(info) => ChangeConfirmation {
                change_id: info.id().to_string(),
                status: map_change_status(info.status()),
            },
            None => ChangeConfirmation {
                change_id: String::new(),
                status: ChangeStatus::Unknown("missing ChangeInfo".to_string()),
            },
        };

        tracing::debug!(
            "Route 53 accepted change {} ({})",
            confirmation.change_id,
            confirmation.status
        );

        Ok(confirmation)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Build the single-UPSERT change batch for `record`
pub fn build_change_batch(record: &RecordSet) -> std::result::Result<ChangeBatch, BuildError> {
    let rr_type = match record.record_type {
        RecordType::A => RrType::A,
    };

    let mut record_set = ResourceRecordSet::builder()
        .name(&record.name)
        .r#type(rr_type)
        .ttl(i64::from(record.ttl))
        .weight(i64::from(record.weight))
        .set_identifier(&record.set_identifier);

    for value in &record.values {
        record_set = record_set.resource_records(ResourceRecord::builder().value(value.to_string()).build()?);
    }

    let change = Change::builder()
        .action(ChangeAction::Upsert)
        .resource_record_set(record_set.build()?)
        .build()?;

    ChangeBatch::builder()
        .comment(&record.comment)
        .changes(change)
        .build()
}

/// Map an SDK failure to an upsert rejection carrying the AWS diagnostic
fn map_sdk_error<E, R>(err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = match err.message() {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };

    let message = match code.as_deref().and_then(rejection_hint) {
        Some(hint) => format!("{} ({})", message, hint),
        None => message,
    };

    Error::upsert_rejected(PROVIDER_NAME, code, message)
}

/// Operator hint for well-known Route 53 error codes
fn rejection_hint(code: &str) -> Option<&'static str> {
    match code {
        "AccessDenied" | "AccessDeniedException" | "InvalidClientTokenId" | "SignatureDoesNotMatch" => {
            Some("check the IAM permissions for route53:ChangeResourceRecordSets")
        }
        "NoSuchHostedZone" => Some("check the hosted zone id"),
        "InvalidChangeBatch" | "InvalidInput" => Some("the record set was refused as malformed"),
        "Throttling" | "ThrottlingException" | "PriorRequestNotComplete" => Some("rate limited, will retry next cycle"),
        _ => None,
    }
}

fn map_change_status(status: &Route53ChangeStatus) -> ChangeStatus {
    match status {
        Route53ChangeStatus::Pending => ChangeStatus::Pending,
        Route53ChangeStatus::Insync => ChangeStatus::InSync,
        other => ChangeStatus::Unknown(other.as_str().to_string()),
    }
}
