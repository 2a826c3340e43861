use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::LookupError;

/// HTTP client for the NPPES NPI Registry API.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
    api_version: String,
}

impl RegistryClient {
    pub fn new(base_url: &str, api_version: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("npi-lookup/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed creating HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_version: api_version.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the first registry record for `npi`.
    pub async fn fetch(&self, npi: &str) -> Result<NpiRecord, LookupError> {
        let npi = npi.trim();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("number", npi), ("version", self.api_version.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LookupError::Status {
                status,
                body: truncate_for_log(&body),
            });
        }

        let body = resp.text().await?;
        let parsed: NpiApiResponse = serde_json::from_str(&body)?;
        tracing::debug!(npi, result_count = parsed.results.len(), "registry response");

        // Malformed numbers come back as 200 with `Errors[]` and no results.
        if !parsed.errors.is_empty() {
            let message = parsed
                .errors
                .iter()
                .map(|e| e.description.as_deref().unwrap_or("unknown error").trim())
                .collect::<Vec<_>>()
                .join("; ");
            tracing::warn!(npi, "registry rejected query: {}", message);
        }

        // Exact-number queries yield at most one record; anything extra is ignored.
        parsed
            .results
            .into_iter()
            .next()
            .ok_or(LookupError::NotFound)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NpiApiResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<NpiRecord>,
    #[serde(default, rename = "Errors", deserialize_with = "null_as_default")]
    pub errors: Vec<NpiApiError>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NpiApiError {
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumerationType {
    Individual,
    Organization,
    Other(String),
}

impl EnumerationType {
    pub fn from_code(code: &str) -> Self {
        match code {
            "NPI-1" => EnumerationType::Individual,
            "NPI-2" => EnumerationType::Organization,
            other => EnumerationType::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            EnumerationType::Individual => "NPI-1 Individual",
            EnumerationType::Organization => "NPI-2 Organization",
            EnumerationType::Other(code) => code,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct NpiRecord {
    #[serde(default)]
    pub number: Option<Value>,
    #[serde(default)]
    pub enumeration_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub basic: NpiBasic,
    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: Vec<NpiAddress>,
    #[serde(
        default,
        rename = "practiceLocations",
        deserialize_with = "null_as_default"
    )]
    pub practice_locations: Vec<NpiAddress>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub endpoints: Vec<NpiEndpoint>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub identifiers: Vec<NpiIdentifier>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub taxonomies: Vec<NpiTaxonomy>,
}

impl NpiRecord {
    /// Registry number as text; older API versions send it as a JSON number.
    pub fn number_text(&self) -> String {
        match &self.number {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn enumeration_type(&self) -> EnumerationType {
        EnumerationType::from_code(self.enumeration_type.as_deref().unwrap_or("").trim())
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct NpiBasic {
    pub enumeration_date: Option<String>,
    pub status: Option<String>,
    pub organization_name: Option<String>,
    pub name_prefix: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub name_suffix: Option<String>,
    pub credential: Option<String>,
    pub authorized_official_name_prefix: Option<String>,
    pub authorized_official_first_name: Option<String>,
    pub authorized_official_middle_name: Option<String>,
    pub authorized_official_last_name: Option<String>,
    pub authorized_official_title_or_position: Option<String>,
    pub authorized_official_telephone_number: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct NpiAddress {
    pub address_purpose: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country_name: Option<String>,
    pub telephone_number: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct NpiEndpoint {
    #[serde(rename = "endpointType")]
    pub endpoint_type: Option<String>,
    pub endpoint: Option<String>,
    #[serde(rename = "endpointDescription")]
    pub endpoint_description: Option<String>,
    #[serde(rename = "use")]
    pub endpoint_use: Option<String>,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
    pub affiliation: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct NpiIdentifier {
    pub desc: Option<String>,
    pub identifier: Option<String>,
    pub state: Option<String>,
    pub issuer: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct NpiTaxonomy {
    pub code: Option<String>,
    pub desc: Option<String>,
    pub primary: Option<bool>,
    pub state: Option<String>,
    pub license: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let max_len = 300usize;
    match trimmed.char_indices().nth(max_len) {
        None => trimmed.to_string(),
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
    }
}
