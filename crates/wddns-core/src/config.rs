//! Configuration types for the weighted DDNS client
//!
//! The configuration is built once at startup and never mutated afterwards.
//! The daemon fills it from CLI flags; library users can build it directly
//! or deserialize it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default services used for address detection when none are configured
pub const DEFAULT_ADDRESS_SERVICES: &[&str] = &[
    "https://checkip.amazonaws.com",
    "https://api.ipify.org",
    "https://icanhazip.com",
    "https://ifconfig.me/ip",
    "https://ipecho.net/plain",
];

/// Default comment attached to every change batch
pub const DEFAULT_COMMENT: &str = "Dynamic DNS update.";

/// Route 53 rejects set identifiers longer than this
const MAX_SET_IDENTIFIER_LEN: usize = 128;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WddnsConfig {
    /// The single record kept in sync
    pub record: RecordConfig,

    /// Address detection settings
    #[serde(default)]
    pub detector: DetectorConfig,

    /// DNS provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Loop settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl WddnsConfig {
    /// Create a configuration for `name` in `zone_id` with defaults elsewhere
    pub fn new(name: impl Into<String>, zone_id: impl Into<String>) -> Self {
        Self {
            record: RecordConfig::new(name, zone_id),
            detector: DetectorConfig::default(),
            provider: ProviderConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.record.validate()?;
        self.detector.validate()?;
        self.provider.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Record configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// DNS record name (e.g., "home.example.com")
    pub name: String,

    /// Hosted zone identifier
    pub zone_id: String,

    /// Time-to-live in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Routing weight among records sharing the name
    #[serde(default = "default_weight")]
    pub weight: u8,

    /// Pinned set identifier; generated at startup when absent
    #[serde(default)]
    pub set_identifier: Option<String>,

    /// Comment attached to the change batch
    #[serde(default = "default_comment")]
    pub comment: String,
}

impl RecordConfig {
    /// Create a record configuration with default TTL, weight and comment
    pub fn new(name: impl Into<String>, zone_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zone_id: zone_id.into(),
            ttl: default_ttl(),
            weight: default_weight(),
            set_identifier: None,
            comment: default_comment(),
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the routing weight
    pub fn with_weight(mut self, weight: u8) -> Self {
        self.weight = weight;
        self
    }

    /// Pin the set identifier
    pub fn with_set_identifier(mut self, set_identifier: impl Into<String>) -> Self {
        self.set_identifier = Some(set_identifier.into());
        self
    }

    /// Zone id without the `/hostedzone/` prefix the console sometimes shows
    pub fn normalized_zone_id(&self) -> &str {
        let zone_id = self.zone_id.trim();
        zone_id.strip_prefix("/hostedzone/").unwrap_or(zone_id)
    }

    /// Validate the record configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_domain_name(&self.name)?;

        if self.normalized_zone_id().is_empty() {
            return Err(crate::Error::config("Hosted zone id cannot be empty"));
        }

        if self.ttl == 0 {
            return Err(crate::Error::config("TTL must be > 0"));
        }

        if let Some(ref id) = self.set_identifier {
            validate_set_identifier(id)?;
        }

        Ok(())
    }
}

/// One address source entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// URL returning the caller's address as text
    pub url: String,

    /// Vote weight in the consensus
    #[serde(default = "default_source_weight")]
    pub weight: u32,
}

impl SourceConfig {
    /// Create a source with weight 1
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            weight: default_source_weight(),
        }
    }

    /// Parse `URL` or `URL=WEIGHT`
    ///
    /// An `=` after a `?` belongs to the query string, so URLs with a query
    /// always get the default weight.
    pub fn parse(entry: &str) -> Result<Self, crate::Error> {
        let entry = entry.trim();
        match entry.rsplit_once('=') {
            Some((url, weight))
                if !url.contains('?')
                    && !weight.is_empty()
                    && weight.chars().all(|c| c.is_ascii_digit()) =>
            {
                let weight = weight.parse().map_err(|_| {
                    crate::Error::config(format!("Invalid source weight in '{}'", entry))
                })?;
                Ok(Self {
                    url: url.to_string(),
                    weight,
                })
            }
            _ => Ok(Self::new(entry)),
        }
    }
}

/// Address detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Sources queried in each round
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    /// Bound on each source query (in seconds)
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
}

impl DetectorConfig {
    /// Per-source timeout as a Duration
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    /// Validate the detector configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.sources.is_empty() {
            return Err(crate::Error::config("At least one address source is required"));
        }

        for source in &self.sources {
            if !source.url.starts_with("https://") && !source.url.starts_with("http://") {
                return Err(crate::Error::config(format!(
                    "Address source must use HTTP or HTTPS scheme. Got: {}",
                    source.url
                )));
            }
            if source.weight == 0 {
                return Err(crate::Error::config(format!(
                    "Address source weight must be > 0: {}",
                    source.url
                )));
            }
        }

        if self.source_timeout_secs == 0 {
            return Err(crate::Error::config("Source timeout must be > 0"));
        }

        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            source_timeout_secs: default_source_timeout_secs(),
        }
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Bound on the upsert call (in seconds)
    #[serde(default = "default_upsert_timeout_secs")]
    pub upsert_timeout_secs: u64,

    /// Log intended changes instead of applying them
    #[serde(default)]
    pub dry_run: bool,
}

impl ProviderConfig {
    /// Upsert timeout as a Duration
    pub fn upsert_timeout(&self) -> Duration {
        Duration::from_secs(self.upsert_timeout_secs)
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.upsert_timeout_secs == 0 {
            return Err(crate::Error::config("Upsert timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            upsert_timeout_secs: default_upsert_timeout_secs(),
            dry_run: false,
        }
    }
}

/// Loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sleep between cycles (in seconds)
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Upper bound on the sleep while upserts keep being rejected (in seconds)
    ///
    /// A value at or below the refresh interval disables backoff.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Capacity of the event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Refresh interval as a Duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Backoff cap as a Duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.refresh_interval_secs == 0 {
            return Err(crate::Error::config("Refresh interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Validate that a string is a usable record name
///
/// Basic RFC 1035 checks: total length, label length, characters and hyphen
/// placement. A single trailing dot is accepted, as is a leading `*` label.
pub fn validate_domain_name(domain: &str) -> Result<(), crate::Error> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);

    if domain.is_empty() {
        return Err(crate::Error::config("Domain name cannot be empty"));
    }

    if domain.len() > 253 {
        return Err(crate::Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for (index, label) in domain.split('.').enumerate() {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }

        if index == 0 && label == "*" {
            continue;
        }

        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(crate::Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(crate::Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}

/// Validate an operator-supplied set identifier
pub fn validate_set_identifier(id: &str) -> Result<(), crate::Error> {
    if id.is_empty() || id.len() > MAX_SET_IDENTIFIER_LEN {
        return Err(crate::Error::config(format!(
            "Set identifier must be 1-{} characters. Got {}",
            MAX_SET_IDENTIFIER_LEN,
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_graphic()) {
        return Err(crate::Error::config(format!(
            "Set identifier must be printable ASCII without spaces: '{}'",
            id
        )));
    }
    Ok(())
}

fn default_ttl() -> u32 {
    60
}

fn default_weight() -> u8 {
    1
}

fn default_comment() -> String {
    DEFAULT_COMMENT.to_string()
}

fn default_source_weight() -> u32 {
    1
}

fn default_sources() -> Vec<SourceConfig> {
    DEFAULT_ADDRESS_SERVICES
        .iter()
        .map(|url| SourceConfig::new(*url))
        .collect()
}

fn default_source_timeout_secs() -> u64 {
    5
}

fn default_upsert_timeout_secs() -> u64 {
    30
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_max_backoff_secs() -> u64 {
    30 * 60
}

fn default_event_channel_capacity() -> usize {
    100
}
