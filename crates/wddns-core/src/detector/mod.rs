//! External address detection
//!
//! The [`AddressDetector`] asks every configured [`AddressSource`] for the
//! host's public IPv4 address in one concurrent round and settles on the
//! answer by weighted strict majority.
//!
//! ## Consensus
//!
//! An address wins when the summed weight of the sources reporting it is
//! more than half of the summed weight of *all configured* sources. Sources
//! that fail or time out vote for nothing, so they make a majority harder to
//! reach but never change which address wins. A strict majority cannot tie.
//!
//! ```text
//!   source A ── 203.0.113.7 ──┐
//!   source B ── 203.0.113.7 ──┼──► tally ──► 203.0.113.7 (2 of 3)
//!   source C ── timeout ──────┘
//! ```

use crate::error::{Error, Result};
use crate::traits::AddressSource;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a successful detection round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consensus {
    /// The agreed address
    pub address: Ipv4Addr,
    /// Summed weight of the sources that reported `address`
    pub votes: u64,
    /// Summed weight of all configured sources
    pub total_weight: u64,
    /// Number of sources that answered with any address
    pub responded: usize,
}

/// Queries a fixed set of address sources and resolves their answers
///
/// The detector holds no state between rounds; each call to
/// [`detect`](AddressDetector::detect) is independent.
pub struct AddressDetector {
    sources: Vec<Box<dyn AddressSource>>,
    source_timeout: Duration,
}

impl AddressDetector {
    /// Create a detector over `sources`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `sources` is empty, a source has
    /// zero weight, or the timeout is zero.
    pub fn new(sources: Vec<Box<dyn AddressSource>>, source_timeout: Duration) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::config("At least one address source is required"));
        }
        if let Some(source) = sources.iter().find(|s| s.weight() == 0) {
            return Err(Error::config(format!(
                "Address source weight must be > 0: {}",
                source.name()
            )));
        }
        if source_timeout.is_zero() {
            return Err(Error::config("Source timeout must be > 0"));
        }

        Ok(Self {
            sources,
            source_timeout,
        })
    }

    /// Number of configured sources
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Summed weight of all configured sources
    pub fn total_weight(&self) -> u64 {
        self.sources.iter().map(|s| u64::from(s.weight())).sum()
    }

    /// Run one detection round
    ///
    /// # Returns
    ///
    /// - `Ok(Consensus)`: An address reached a strict weighted majority
    /// - `Err(Error::DetectionFailed)`: Every source failed, or no address did
    pub async fn detect(&self) -> Result<Consensus> {
        let answers = join_all(self.sources.iter().map(|source| self.query(source.as_ref()))).await;

        let total_weight = self.total_weight();
        let mut tally: BTreeMap<Ipv4Addr, u64> = BTreeMap::new();
        let mut responded = 0usize;

        for (source, answer) in self.sources.iter().zip(&answers) {
            if let Ok(address) = answer {
                responded += 1;
                *tally.entry(*address).or_default() += u64::from(source.weight());
            }
        }

        let best = tally
            .iter()
            .max_by_key(|(_, votes)| **votes)
            .map(|(address, votes)| (*address, *votes));

        match best {
            None => {
                warn!("No address source answered ({} configured)", self.sources.len());
                Err(Error::detection_failed(format!(
                    "all {} address sources failed: {}",
                    self.sources.len(),
                    self.summarize(&answers)
                )))
            }
            Some((address, votes)) if votes * 2 > total_weight => {
                info!(
                    "Detected address {} ({}/{} votes, {} of {} sources answered)",
                    address,
                    votes,
                    total_weight,
                    responded,
                    self.sources.len()
                );
                Ok(Consensus {
                    address,
                    votes,
                    total_weight,
                    responded,
                })
            }
            Some((address, votes)) => {
                warn!(
                    "No majority: best candidate {} has {}/{} votes ({} distinct answers)",
                    address,
                    votes,
                    total_weight,
                    tally.len()
                );
                Err(Error::detection_failed(format!(
                    "no majority among address sources: best candidate {} has {}/{} votes; {}",
                    address,
                    votes,
                    total_weight,
                    self.summarize(&answers)
                )))
            }
        }
    }

    /// Query one source under the per-source timeout
    async fn query(&self, source: &dyn AddressSource) -> Result<Ipv4Addr> {
        match tokio::time::timeout(self.source_timeout, source.fetch()).await {
            Ok(Ok(address)) => {
                debug!("Source {} reported {}", source.name(), address);
                Ok(address)
            }
            Ok(Err(e)) => {
                warn!("Address source {} failed: {}", source.name(), e);
                Err(e)
            }
            Err(_) => {
                let err = Error::timeout("fetch", self.source_timeout);
                warn!("Address source {}: {}", source.name(), err);
                Err(err)
            }
        }
    }

    /// One `name: answer` entry per source, in configuration order
    fn summarize(&self, answers: &[Result<Ipv4Addr>]) -> String {
        self.sources
            .iter()
            .zip(answers)
            .map(|(source, answer)| match answer {
                Ok(address) => format!("{}: {}", source.name(), address),
                Err(e) => format!("{}: {}", source.name(), e),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
