//! S3-compatible object storage for the stored photo renditions
//!
//! The bucket is fixed when the store is built; callers only pass keys.

use super::{BlobStore, UploadInfo};
use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use geoharvest_common::config::BlobStoreConfig;
use opendal::{services::S3, Operator};
use std::path::Path;

pub struct S3BlobStore {
    operator: Operator,
    public_base_url: String,
}

impl S3BlobStore {
    pub fn from_config(config: &BlobStoreConfig) -> IngestResult<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| IngestError::permanent("blob store", "endpoint not configured"))?;
        let access_key = config
            .access_key
            .as_deref()
            .ok_or_else(|| IngestError::permanent("blob store", "access key not configured"))?;
        let secret_key = config
            .secret_key
            .as_deref()
            .ok_or_else(|| IngestError::permanent("blob store", "secret key not configured"))?;

        let builder = S3::default()
            .endpoint(endpoint)
            .bucket(&config.bucket)
            .region(&config.region)
            .access_key_id(access_key)
            .secret_access_key(secret_key);

        let operator = Operator::new(builder)
            .map_err(|e| IngestError::permanent("blob store", e))?
            .finish();

        let public_base_url = config
            .resolved_public_base_url()
            .unwrap_or_else(|| format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket));

        tracing::info!(
            endpoint,
            bucket = %config.bucket,
            public_base_url = %public_base_url,
            "Blob store configured"
        );

        Ok(Self::with_operator(operator, public_base_url))
    }

    /// Wrap an existing operator (any opendal backend)
    pub fn with_operator(operator: Operator, public_base_url: impl Into<String>) -> Self {
        Self {
            operator,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

fn classify(context: &str, err: opendal::Error) -> IngestError {
    if err.is_temporary() {
        IngestError::transient(context, err)
    } else {
        IngestError::permanent(context, err)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put_object(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> IngestResult<UploadInfo> {
        let data = tokio::fs::read(local_path).await?;
        let size = data.len() as u64;

        tracing::debug!(key, size, "Uploading object");

        self.operator
            .write_with(key, data)
            .content_type(content_type)
            .await
            .map_err(|e| classify("blob store put", e))?;

        Ok(UploadInfo {
            key: key.to_string(),
            size,
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key.trim_start_matches('/'))
    }
}
