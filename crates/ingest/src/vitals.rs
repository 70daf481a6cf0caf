//! HTTP vital-sign source.
//!
//! Fetches the data store's REST endpoint and turns every record into a
//! [`VitalSnapshot`]. The endpoint may return a list of records, an object
//! keyed by subject id, or a single record. Field names are accepted in
//! English or in the store's legacy form (`nhiet_do`, `oxy`, `nhip_tim`,
//! `state`).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use vigil_core::config::VitalsConfig;
use vigil_core::{Adapter, VigilError, VitalSnapshot, UNKNOWN_SUBJECT};

use crate::traits::{SourceError, VitalSource};

/// Per-request bound, kept below the default poll interval.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Deserialize)]
struct VitalRecord {
    #[serde(default, deserialize_with = "loose_id")]
    id: Option<String>,
    #[serde(default, alias = "nhiet_do")]
    temperature: Option<f64>,
    #[serde(default, alias = "oxy")]
    oxygen: Option<f64>,
    #[serde(default, alias = "nhip_tim")]
    heart_rate: Option<f64>,
    #[serde(default, alias = "state", deserialize_with = "truthy")]
    fallen: Option<bool>,
}

impl VitalRecord {
    fn into_snapshot(self, fallback_id: Option<&str>, taken_at: DateTime<Utc>) -> VitalSnapshot {
        let subject = self
            .id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| fallback_id.map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string());
        VitalSnapshot {
            subject_id: subject,
            temperature: self.temperature,
            oxygen: self.oxygen,
            heart_rate: self.heart_rate,
            fallen: self.fallen.unwrap_or(false),
            taken_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    List(Vec<VitalRecord>),
    Keyed(BTreeMap<String, VitalRecord>),
    Single(VitalRecord),
}

/// The store's fall flag has been seen as a bool, a 0/1 number and a string.
fn truthy<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(b),
        serde_json::Value::Number(n) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
        serde_json::Value::String(s) => Some(matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        )),
        _ => Some(true),
    })
}

fn loose_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Decode a response body into snapshots stamped `taken_at`.
pub fn parse_payload(body: &str, taken_at: DateTime<Utc>) -> Result<Vec<VitalSnapshot>, SourceError> {
    let payload: Payload =
        serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))?;
    Ok(match payload {
        Payload::List(records) => records
            .into_iter()
            .map(|r| r.into_snapshot(None, taken_at))
            .collect(),
        Payload::Keyed(records) => records
            .into_iter()
            .map(|(id, r)| r.into_snapshot(Some(&id), taken_at))
            .collect(),
        Payload::Single(record) => vec![record.into_snapshot(None, taken_at)],
    })
}

pub struct HttpVitalSource {
    client: Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpVitalSource {
    pub fn new(url: impl Into<String>, auth_token: Option<String>) -> Result<Self, VigilError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(VigilError::adapter_init(
                Adapter::DataStore,
                format!("unsupported vitals URL '{url}'"),
            ));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VigilError::adapter_init(Adapter::DataStore, e))?;
        Ok(Self {
            client,
            url,
            auth_token,
        })
    }

    /// Build from config; `Ok(None)` when polling is disabled.
    pub fn from_config(config: &VitalsConfig) -> Result<Option<Self>, VigilError> {
        config
            .url
            .as_ref()
            .map(|url| Self::new(url.clone(), config.auth_token.clone()))
            .transpose()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl VitalSource for HttpVitalSource {
    async fn poll(&self) -> Result<Vec<VitalSnapshot>, SourceError> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api(format!("{status}: {body}")));
        }

        let body = response.text().await?;
        let snapshots = parse_payload(&body, Utc::now())?;
        debug!(url = %self.url, subjects = snapshots.len(), "vitals fetched");
        Ok(snapshots)
    }

    fn name(&self) -> &str {
        &self.url
    }
}
