//! Log batch retrieval from object storage

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;

/// Errors retrieving a log batch. Fatal to the run; there are no
/// partial-result semantics for a single batch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to download {key}: {message}")]
    Download { key: String, message: String },

    #[error("failed to read body of {key}: {message}")]
    Body { key: String, message: String },
}

/// Source of compressed log batches, keyed by object key.
///
/// Implementations return the full byte content of the object or fail;
/// the pipeline never sees a partially fetched batch.
#[async_trait]
pub trait BatchFetcher: Send + Sync {
    async fn fetch_batch(&self, key: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches log batches from an S3 bucket.
pub struct S3BatchFetcher {
    client: S3Client,
    bucket: String,
}

impl S3BatchFetcher {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        S3BatchFetcher {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BatchFetcher for S3BatchFetcher {
    async fn fetch_batch(&self, key: &str) -> Result<Vec<u8>, FetchError> {
        log::info!("downloading batch s3://{}/{}", self.bucket, key);

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| FetchError::Download {
                key: key.to_string(),
                message: err.to_string(),
            })?;

        let bytes = output.body.collect().await.map_err(|err| FetchError::Body {
            key: key.to_string(),
            message: err.to_string(),
        })?;

        let bytes = bytes.into_bytes().to_vec();
        log::info!("downloaded {} bytes for {}", bytes.len(), key);

        Ok(bytes)
    }
}
