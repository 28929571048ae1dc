//! Plain HTTP image fetch for the classifier input

use super::ImageSource;
use crate::error::{IngestError, IngestResult};
use crate::utils::{retry_transient, RetryPolicy};
use async_trait::async_trait;
use std::time::Duration;

const CONTEXT: &str = "image fetch";

pub struct HttpImageSource {
    http_client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpImageSource {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> IngestResult<Self> {
        Ok(Self {
            http_client: super::http_client(timeout)?,
            retry,
        })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch_image(&self, url: &str) -> IngestResult<Vec<u8>> {
        retry_transient(CONTEXT, &self.retry, || async {
            let response = self
                .http_client
                .get(url)
                .send()
                .await
                .map_err(|e| IngestError::from_reqwest(CONTEXT, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(IngestError::from_status(CONTEXT, status, ""));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| IngestError::from_reqwest(CONTEXT, e))?;
            Ok(bytes.to_vec())
        })
        .await
    }
}
