//! Bing Maps elevation client

use super::ElevationLookup;
use crate::error::{IngestError, IngestResult};
use crate::utils::{retry_transient, RetryPolicy};
use async_trait::async_trait;
use geoharvest_common::config::ElevationConfig;
use serde::Deserialize;
use std::time::Duration;

const CONTEXT: &str = "bing elevation";

pub struct BingElevationClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElevationResponse {
    #[serde(default)]
    resource_sets: Vec<ResourceSet>,
}

#[derive(Debug, Deserialize)]
struct ResourceSet {
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(default)]
    elevations: Vec<f64>,
}

impl BingElevationClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> IngestResult<Self> {
        Ok(Self {
            http_client: super::http_client(timeout)?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            retry,
        })
    }

    pub fn from_config(
        config: &ElevationConfig,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> IngestResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| IngestError::permanent(CONTEXT, "api key not configured"))?;
        Self::new(config.endpoint.clone(), api_key, timeout, retry)
    }
}

/// Exactly one resource set, one resource and one elevation
fn single_elevation(response: ElevationResponse) -> IngestResult<f64> {
    let [set] = <[ResourceSet; 1]>::try_from(response.resource_sets).map_err(|sets| {
        IngestError::permanent(
            CONTEXT,
            format!("unexpected number of resource sets: {}", sets.len()),
        )
    })?;
    let [resource] = <[Resource; 1]>::try_from(set.resources).map_err(|resources| {
        IngestError::permanent(
            CONTEXT,
            format!("unexpected number of resources: {}", resources.len()),
        )
    })?;
    match resource.elevations.as_slice() {
        [value] => Ok(*value),
        other => Err(IngestError::permanent(
            CONTEXT,
            format!("unexpected number of elevations: {}", other.len()),
        )),
    }
}

#[async_trait]
impl ElevationLookup for BingElevationClient {
    async fn lookup_elevation(&self, lng: f64, lat: f64) -> IngestResult<f64> {
        let points = format!("{:.6},{:.6}", lat, lng);

        retry_transient(CONTEXT, &self.retry, || async {
            let response = self
                .http_client
                .get(&self.endpoint)
                .query(&[
                    ("heights", "ellipsoid"),
                    ("points", points.as_str()),
                    ("key", self.api_key.as_str()),
                ])
                .send()
                .await
                .map_err(|e| IngestError::from_reqwest(CONTEXT, e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(IngestError::from_status(CONTEXT, status, &body));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| IngestError::from_reqwest(CONTEXT, e))?;
            let parsed: ElevationResponse = serde_json::from_slice(&body)
                .map_err(|e| IngestError::permanent(CONTEXT, format!("malformed response: {}", e)))?;

            single_elevation(parsed)
        })
        .await
    }
}
