//! Overpass API client and response model
//!
//! Only nodes and ways are modelled. Way node references are resolved after
//! every element has been read, so element order in the response does not
//! matter; references to nodes that are absent are dropped.

use super::OverpassQuery;
use crate::error::{IngestError, IngestResult};
use crate::utils::{retry_transient, RetryPolicy};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const CONTEXT: &str = "overpass";

/// Point of a way, resolved from its node id
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub id: i64,
    pub lng: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: i64,
    pub tags: HashMap<String, String>,
    /// Resolved nodes in way order
    pub nodes: Vec<Node>,
}

impl Way {
    pub fn tag(&self, key: &str) -> &str {
        self.tags.get(key).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverpassResponse {
    pub generator: String,
    pub nodes: HashMap<i64, Node>,
    /// Ordered by way id
    pub ways: Vec<Way>,
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    generator: String,
    #[serde(default)]
    elements: Vec<RawElement>,
}

#[derive(Deserialize)]
struct RawElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    #[serde(default)]
    tags: HashMap<String, String>,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    nodes: Vec<i64>,
}

impl OverpassResponse {
    /// Parse an `[out:json]` response body
    pub fn from_json(body: &[u8]) -> IngestResult<Self> {
        let raw: RawResponse = serde_json::from_slice(body)
            .map_err(|e| IngestError::permanent(CONTEXT, format!("malformed response: {}", e)))?;

        let mut nodes = HashMap::new();
        let mut pending_ways = Vec::new();

        for element in raw.elements {
            match element.kind.as_str() {
                "node" => {
                    if let (Some(lat), Some(lon)) = (element.lat, element.lon) {
                        nodes.insert(
                            element.id,
                            Node {
                                id: element.id,
                                lng: lon,
                                lat,
                            },
                        );
                    }
                }
                "way" => pending_ways.push(element),
                _ => {}
            }
        }

        let mut ways: Vec<Way> = pending_ways
            .into_iter()
            .map(|element| {
                let resolved: Vec<Node> = element
                    .nodes
                    .iter()
                    .filter_map(|id| nodes.get(id).copied())
                    .collect();
                if resolved.len() < element.nodes.len() {
                    tracing::debug!(
                        way_id = element.id,
                        missing = element.nodes.len() - resolved.len(),
                        "Dropping unresolved node references"
                    );
                }
                Way {
                    id: element.id,
                    tags: element.tags,
                    nodes: resolved,
                }
            })
            .collect();
        ways.sort_by_key(|w| w.id);

        Ok(Self {
            generator: raw.generator,
            nodes,
            ways,
        })
    }
}

pub struct OverpassHttpClient {
    http_client: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl OverpassHttpClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> IngestResult<Self> {
        Ok(Self {
            http_client: super::http_client(timeout)?,
            endpoint: endpoint.into(),
            retry,
        })
    }
}

#[async_trait]
impl OverpassQuery for OverpassHttpClient {
    async fn query(&self, query: &str) -> IngestResult<OverpassResponse> {
        retry_transient(CONTEXT, &self.retry, || async {
            let response = self
                .http_client
                .post(&self.endpoint)
                .body(query.to_string())
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
            OverpassResponse::from_json(&body)
        })
        .await
    }
}
