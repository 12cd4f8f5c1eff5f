// # Address Source Trait
//
// Defines the interface for one external "what is my address" observer.
//
// ## Implementations
//
// - HTTP services: `wddns-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use wddns_core::AddressSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* AddressSource implementation */;
//
//     let address = source.fetch().await?;
//     println!("{} says {}", source.name(), address);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for address source implementations
///
/// A source is a single, independent observer of the host's public IPv4
/// address. Sources are queried together by the
/// [`AddressDetector`](crate::detector::AddressDetector), which decides on the
/// answer by weighted majority.
///
/// # Responsibilities
///
/// - Perform exactly one query per `fetch()` call
/// - Return an error for anything that is not a single IPv4 address
///
/// Sources must not retry, cache, or spawn tasks. Timeouts are applied by the
/// detector, so a source that hangs only costs its own vote.
#[async_trait]
pub trait AddressSource: Send + Sync {
    /// Ask this source for the caller's public IPv4 address
    ///
    /// # Returns
    ///
    /// - `Ok(Ipv4Addr)`: The address reported by the source
    /// - `Err(Error)`: If the source failed or reported something unusable
    async fn fetch(&self) -> Result<Ipv4Addr, crate::Error>;

    /// Human-readable name used in logs (usually the URL)
    fn name(&self) -> &str;

    /// Vote weight of this source
    fn weight(&self) -> u32 {
        1
    }
}
