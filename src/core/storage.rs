//! Public audio storage.
//!
//! Generated speech is written to an object store bucket and served from a
//! public URL of the form `{public_url}/{bucket}/{name}`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload, path::Path as ObjectPath,
};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::StorageConfig;
use crate::utils::sanitize_filename;

pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Storage is not configured")]
    NotConfigured,

    #[error("Invalid object name: {0}")]
    InvalidName(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Storage configuration error: {0}")]
    Configuration(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Uploads audio and returns its public URL.
#[async_trait]
pub trait AudioUploader: Send + Sync {
    async fn upload_audio(&self, name: &str, audio: Bytes) -> StorageResult<String>;
}

pub struct ObjectStoreUploader {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    public_url: String,
}

impl ObjectStoreUploader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build an S3 (or S3-compatible) backed uploader.
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(access_key) = &config.access_key {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &config.secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Configuration(e.to_string()))?;

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "Object storage configured"
        );
        Ok(Self::new(
            Arc::new(store),
            config.bucket.clone(),
            config.public_url.clone(),
        ))
    }

    pub fn public_url_for(&self, name: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket, name)
    }
}

#[async_trait]
impl AudioUploader for ObjectStoreUploader {
    async fn upload_audio(&self, name: &str, audio: Bytes) -> StorageResult<String> {
        let object_name = sanitize_filename(name);
        let path = ObjectPath::parse(&object_name)
            .map_err(|e| StorageError::InvalidName(e.to_string()))?;

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(AUDIO_CONTENT_TYPE),
        );
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let size = audio.len();
        self.store
            .put_opts(&path, PutPayload::from(audio), options)
            .await
            .map_err(|e| {
                error!(object = %object_name, "Audio upload failed: {e:?}");
                StorageError::UploadFailed(e.to_string())
            })?;

        debug!(object = %object_name, bytes = size, "Audio uploaded");
        Ok(self.public_url_for(&object_name))
    }
}
