//! Core traits for the weighted DDNS client
//!
//! This module defines the abstract interfaces at the two network seams.
//!
//! - [`AddressSource`]: One external observer of the public address
//! - [`DnsProvider`]: Upsert the weighted record via a provider API

pub mod address_source;
pub mod dns_provider;

pub use address_source::AddressSource;
pub use dns_provider::{ChangeConfirmation, ChangeStatus, DnsProvider, RecordSet, RecordType};
