//! S3-compatible remote tier backend.
//!
//! The bridge only ever uploads spooled files and hands out object URLs;
//! object deletion and signed downloads are not part of the tiering
//! contract yet.

use crate::config::RemoteStorageConfig;
use crate::error::BridgeError;
use async_trait::async_trait;
use minio::s3::builders::ObjectContent;
use minio::s3::creds::StaticProvider;
use minio::s3::http::BaseUrl;
use minio::s3::types::S3Api;
use minio::s3::{Client as MinioClient, ClientBuilder};
use std::path::Path;

/// Remote object-store capability used by the tiering policy. Kept as a
/// trait so tests can script upload outcomes without a live backend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload the spooled file under `key` and return the object URL.
    async fn put_object(&self, key: &str, source: &Path) -> Result<String, BridgeError>;
}

/// `RemoteStore` backed by an S3-compatible service.
#[derive(Debug)]
pub struct S3RemoteStore {
    client: MinioClient,
    bucket: String,
    endpoint: String,
    region: String,
}

impl S3RemoteStore {
    pub fn new(config: &RemoteStorageConfig) -> Result<Self, BridgeError> {
        if config.bucket.is_empty() {
            return Err(BridgeError::Validation(
                "remote_storage.bucket is required when remote storage is enabled".into(),
            ));
        }
        let base_url: BaseUrl = config.endpoint.parse().map_err(|err| {
            BridgeError::Validation(format!(
                "invalid remote storage endpoint {}: {err}",
                config.endpoint
            ))
        })?;
        let provider = StaticProvider::new(&config.access_key, &config.secret_key, None);
        let client = ClientBuilder::new(base_url)
            .provider(Some(Box::new(provider)))
            .build()
            .map_err(|err| {
                BridgeError::Storage(format!("failed to build remote storage client: {err}"))
            })?;
        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            region: config.region.clone(),
        })
    }

    /// Public URL for an uploaded object. Amazon endpoints use the
    /// virtual-hosted form; everything else gets the path form.
    fn object_url(&self, key: &str) -> String {
        if self.endpoint.ends_with("amazonaws.com") {
            format!(
                "https://{}.s3.{}.amazonaws.com/{key}",
                self.bucket, self.region
            )
        } else {
            format!("{}/{}/{key}", self.endpoint, self.bucket)
        }
    }
}

#[async_trait]
impl RemoteStore for S3RemoteStore {
    async fn put_object(&self, key: &str, source: &Path) -> Result<String, BridgeError> {
        self.client
            .put_object_content(&self.bucket, key, ObjectContent::from(source))
            .send()
            .await
            .map_err(|err| BridgeError::Storage(format!("remote upload failed: {err}")))?;
        Ok(self.object_url(key))
    }
}
