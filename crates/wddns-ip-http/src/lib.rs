// # HTTP Address Sources
//
// This crate provides HTTP-based address sources for the weighted DDNS client.
//
// ## Purpose
//
// Each source asks one external "what is my IP" service for the caller's
// public address. The services reply with the address as plain text, e.g.
// `203.0.113.7\n`.
//
// ## Architecture
//
// A source performs exactly one GET per `fetch()`. It does not poll, cache or
// retry; the detector in `wddns-core` queries all sources each cycle and
// resolves their answers by weighted majority.

use wddns_core::config::DetectorConfig;
use wddns_core::traits::AddressSource;
use wddns_core::{Error, Result};

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// User-Agent sent with every request
const USER_AGENT: &str = concat!("wddns/", env!("CARGO_PKG_VERSION"));

/// Single HTTP "what is my IP" service
pub struct HttpAddressSource {
    /// URL to fetch the address from
    url: String,

    /// Vote weight
    weight: u32,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpAddressSource {
    /// Create a new HTTP address source
    ///
    /// # Parameters
    ///
    /// - `url`: URL returning the address as text (e.g., "https://api.ipify.org")
    /// - `weight`: Vote weight in the consensus
    /// - `timeout`: Request timeout for the HTTP client
    pub fn new(url: impl Into<String>, weight: u32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(url, weight, client))
    }

    /// Create a source that shares an existing client
    pub fn with_client(url: impl Into<String>, weight: u32, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            weight,
            client,
        }
    }

    /// URL queried by this source
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl AddressSource for HttpAddressSource {
    async fn fetch(&self) -> Result<Ipv4Addr> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::source_failed(&self.url, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::source_failed(
                &self.url,
                format!("HTTP error: {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::source_failed(&self.url, format!("Failed to read response: {}", e)))?;

        let address = parse_address_body(&body).map_err(|e| Error::source_failed(&self.url, e.to_string()))?;
        tracing::trace!("{} answered {}", self.url, address);
        Ok(address)
    }

    fn name(&self) -> &str {
        &self.url
    }

    fn weight(&self) -> u32 {
        self.weight
    }
}

/// Parse a service's reply into an IPv4 address
///
/// Surrounding whitespace is ignored. IPv6 replies are rejected because the
/// managed record is an A-record.
pub fn parse_address_body(body: &str) -> Result<Ipv4Addr> {
    let text = body.trim();
    match text.parse::<IpAddr>() {
        Ok(IpAddr::V4(address)) => Ok(address),
        Ok(IpAddr::V6(address)) => Err(Error::invalid_input(format!("Expected IPv4, got: {}", address))),
        Err(_) => {
            let shown: String = text.chars().take(64).collect();
            Err(Error::invalid_input(format!("Invalid IP address: {:?}", shown)))
        }
    }
}

/// Build one source per configured entry, sharing one HTTP client
pub fn build_sources(config: &DetectorConfig) -> Result<Vec<Box<dyn AddressSource>>> {
    let client = reqwest::Client::builder()
        .timeout(config.source_timeout())
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

    let sources = config
        .sources
        .iter()
        .map(|source| {
            tracing::debug!("Address source {} (weight {})", source.url, source.weight);
            Box::new(HttpAddressSource::with_client(
                source.url.clone(),
                source.weight,
                client.clone(),
            )) as Box<dyn AddressSource>
        })
        .collect();

    Ok(sources)
}
