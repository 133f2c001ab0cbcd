//! Blob storage for case documents. Rows in `case_documents` hold the key;
//! the bytes live in an S3-compatible bucket.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::info;

use crate::config::StorageConfig;

/// A file about to be stored, with the headers served back on download.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn save(&self, key: &str, file: StoredFile) -> Result<()>;

    /// Time-limited GET URL for `key`.
    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String>;

    async fn remove(&self, key: &str) -> Result<()>;
}

pub struct S3DocumentStore {
    client: S3Client,
    bucket: String,
}

impl S3DocumentStore {
    /// Builds the client from the environment chain, overridden by any
    /// explicit endpoint or static keys. Custom endpoints (MinIO and the
    /// like) get path-style addressing.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let region = RegionProviderChain::first_try(Some(Region::new(config.region.clone())))
            .or_default_provider()
            .or_else("us-east-1");

        #[allow(deprecated)]
        let mut loader = aws_config::from_env().region(region);
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "casedesk-static",
            ));
        }

        let shared = loader.load().await;
        let s3_config = S3ConfigBuilder::from(&shared)
            .force_path_style(config.endpoint_url.is_some())
            .build();

        info!(
            bucket = %config.bucket,
            custom_endpoint = config.endpoint_url.is_some(),
            "document store ready"
        );
        Ok(Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl DocumentStore for S3DocumentStore {
    async fn save(&self, key: &str, file: StoredFile) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(file.bytes))
            .set_content_type(file.content_type)
            .set_content_disposition(file.content_disposition)
            .send()
            .await
            .with_context(|| format!("failed to store document {key}"))?;
        Ok(())
    }

    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .context("invalid download link lifetime")?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .with_context(|| format!("failed to presign download of {key}"))?;
        Ok(request.uri().to_string())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to remove document {key}"))?;
        Ok(())
    }
}
