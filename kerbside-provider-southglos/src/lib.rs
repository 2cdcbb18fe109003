//! Provider implementation for South Gloucestershire Council's waste service.
//!
//! Two endpoints are consumed: the address lookup on the legacy refuse
//! web service, and the collection-details feed keyed by UPRN.

use async_trait::async_trait;
use chrono::Local;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use kerbside_core::{
    model::{Address, Snapshot, Uprn},
    ports::{AddressPort, CollectionPort, PortError},
};

mod normalize;

use normalize::ServiceRecord;

const ADDRESS_BASE_URL: &str =
    "https://webapps.southglos.gov.uk/Webservices/SGC.RefuseCollectionService/RefuseCollectionService.svc";
const COLLECTIONS_URL: &str = "https://api.southglos.gov.uk/wastecomp/GetCollectionDetails";

/// Address record from getAddresses/{postcode}
#[derive(Debug, Deserialize)]
struct AddressRecord {
    #[serde(rename = "Property", default)]
    property: String,
    #[serde(rename = "Street", default)]
    street: String,
    #[serde(rename = "Locality", default)]
    locality: String,
    #[serde(rename = "Town", default)]
    town: String,
    #[serde(rename = "Postcode", default)]
    postcode: String,
    #[serde(rename = "Uprn", default)]
    uprn: String,
}

/// OData-style envelope from GetCollectionDetails
#[derive(Debug, Deserialize)]
struct CollectionDetailsResponse {
    #[serde(default)]
    value: Vec<ServiceRecord>,
}

/// Client for both South Gloucestershire endpoints.
///
/// The underlying [`Client`] is shared and reused for every request over
/// the provider's lifetime.
pub struct SouthGlosProvider {
    client: Client,
    address_base: String,
    collections_url: String,
}

impl SouthGlosProvider {
    /// Create a provider bound to the production endpoints.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_endpoints(client, ADDRESS_BASE_URL, COLLECTIONS_URL)
    }

    /// Create a provider with custom endpoints, used to point it at a mock
    /// server in tests.
    #[must_use]
    pub fn with_endpoints(client: Client, address_base: &str, collections_url: &str) -> Self {
        Self {
            client,
            address_base: address_base.trim_end_matches('/').to_owned(),
            collections_url: collections_url.to_owned(),
        }
    }
}

#[async_trait]
impl AddressPort for SouthGlosProvider {
    async fn resolve_addresses(&self, postcode: &str) -> Result<Vec<Address>, PortError> {
        let postcode = postcode.trim().to_uppercase();
        let url = format!("{}/getAddresses/{postcode}", self.address_base);

        let records = fetch_json::<Vec<AddressRecord>>(self.client.get(url)).await?;

        let addresses = records
            .into_iter()
            .map(|record| {
                let label = join_address_parts(&[
                    &record.property,
                    &record.street,
                    &record.locality,
                    &record.town,
                    &record.postcode,
                ]);
                Address {
                    uprn: Uprn(record.uprn),
                    label,
                }
            })
            .collect();

        Ok(addresses)
    }
}

#[async_trait]
impl CollectionPort for SouthGlosProvider {
    async fn fetch_collections(&self, uprn: &Uprn) -> Result<Snapshot, PortError> {
        let req = self
            .client
            .get(&self.collections_url)
            .query(&[("uprn", uprn.0.as_str())]);

        let response = fetch_json::<CollectionDetailsResponse>(req).await?;

        let today = Local::now().date_naive();
        Ok(normalize::snapshot_from_records(
            response.value,
            today,
            Local::now(),
        ))
    }
}

/// Join the non-empty address components with ", ".
fn join_address_parts(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    req.send()
        .await
        .map_err(PortError::from)?
        .error_for_status()
        .map_err(PortError::from)?
        .json()
        .await
        .map_err(PortError::from)
}
