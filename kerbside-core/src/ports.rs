//! Traits describing the two operations consumed from the remote service.

use async_trait::async_trait;
use reqwest::Error as ReqwestError;

use crate::model::{Address, Snapshot, Uprn};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to the waste service backend.
///
/// Date and field parsing problems never surface here; the provider absorbs
/// them into `None` values and keeps the fetch going.
pub enum PortError {
    /// Network layer failed (timeout, DNS, TLS, or a non-2xx status).
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Internal provider error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[async_trait]
/// Postcode-to-address lookup backend.
pub trait AddressPort: Send + Sync {
    /// Resolve candidate addresses for a postcode.
    ///
    /// An empty result means the postcode matched nothing; the caller
    /// decides what to make of that.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the lookup request fails.
    async fn resolve_addresses(&self, postcode: &str) -> Result<Vec<Address>, PortError>;
}

#[async_trait]
/// Collection-details backend for a single household.
pub trait CollectionPort: Send + Sync {
    /// Fetch and normalise the current collection records for a household.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails at the transport
    /// level. Malformed fields inside an otherwise valid response degrade
    /// to `None` rather than erroring.
    async fn fetch_collections(&self, uprn: &Uprn) -> Result<Snapshot, PortError>;
}
