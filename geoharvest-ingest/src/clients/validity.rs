//! Validity classifier client
//!
//! `POST {endpoint}/api/v0/classify` with the image as base64; the service
//! answers with a score in `[0, 1]` and the model that produced it.

use super::{ValidityClassifier, ValidityResult};
use crate::error::{IngestError, IngestResult};
use crate::utils::{retry_transient, RetryPolicy};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CONTEXT: &str = "validity classifier";

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    image_base64: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    validity_score: f64,
    model: String,
}

pub struct HttpValidityClassifier {
    http_client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpValidityClassifier {
    pub fn new(endpoint: &str, timeout: Duration, retry: RetryPolicy) -> IngestResult<Self> {
        Ok(Self {
            http_client: super::http_client(timeout)?,
            url: format!("{}/api/v0/classify", endpoint.trim_end_matches('/')),
            retry,
        })
    }
}

#[async_trait]
impl ValidityClassifier for HttpValidityClassifier {
    async fn classify(&self, image: &[u8]) -> IngestResult<ValidityResult> {
        let encoded = BASE64.encode(image);
        let request = ClassifyRequest {
            image_base64: &encoded,
        };

        retry_transient(CONTEXT, &self.retry, || async {
            let response = self
                .http_client
                .post(&self.url)
                .json(&request)
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
            let parsed: ClassifyResponse = serde_json::from_slice(&body)
                .map_err(|e| IngestError::permanent(CONTEXT, format!("malformed response: {}", e)))?;

            if !(0.0..=1.0).contains(&parsed.validity_score) {
                return Err(IngestError::permanent(
                    CONTEXT,
                    format!("score out of range: {}", parsed.validity_score),
                ));
            }

            Ok(ValidityResult {
                score: parsed.validity_score,
                model: parsed.model,
            })
        })
        .await
    }
}
