//! Object storage backends
//!
//! Uploaded media ends up either in Cloudflare R2 (S3-compatible) or in the
//! local uploads directory served under `/uploads`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{StorageConfig, UploadConfig};

/// Put-object contract shared by the storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` and return its public URL.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Cloudflare R2 bucket accessed through the S3 API.
pub struct R2ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base: String,
}

impl R2ObjectStore {
    /// Build a client from the storage configuration.
    ///
    /// Returns `None` unless account id, access key, secret and bucket are all set.
    pub fn from_config(config: &StorageConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        let endpoint = config.endpoint()?;
        let public_base = config.public_base()?;
        let bucket = config.bucket_name.clone()?;

        let credentials = Credentials::new(
            config.access_key_id.clone().unwrap_or_default(),
            config.secret_access_key.clone().unwrap_or_default(),
            None,
            None,
            "mitaan-r2",
        );
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version_latest()
            .region(Region::new("auto"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Some(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket,
            public_base,
        })
    }

    pub fn boxed(self) -> Arc<dyn ObjectStore> {
        Arc::new(self)
    }
}

#[async_trait]
impl ObjectStore for R2ObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("Failed to upload {} to R2", key))?;

        Ok(format!("{}/{}", self.public_base, key))
    }

    fn name(&self) -> &'static str {
        "r2"
    }
}

/// The local uploads directory, served by the API itself.
#[derive(Debug, Clone)]
pub struct LocalUploads {
    dir: PathBuf,
    api_base: String,
}

impl LocalUploads {
    pub fn new(dir: impl Into<PathBuf>, api_base: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.path.clone(), config.api_base())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Public URL for a file already in the uploads directory
    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/uploads/{}", self.api_base, file_name)
    }

    /// Resolve a bare file name inside the uploads directory.
    ///
    /// Anything with path separators or parent references is rejected.
    pub fn path_for(&self, file_name: &str) -> Result<PathBuf> {
        let valid = !file_name.is_empty()
            && !file_name.contains(['/', '\\'])
            && file_name != "."
            && file_name != "..";
        if !valid {
            anyhow::bail!("Invalid upload file name: {}", file_name);
        }
        Ok(self.dir.join(file_name))
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create uploads directory {}", self.dir.display()))
    }

    /// Remove a temp file, logging instead of failing when it is already gone.
    pub async fn remove(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), "Failed to remove upload: {}", e);
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalUploads {
    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<String> {
        self.ensure_dir().await?;
        let path = self.path_for(key)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(self.url_for(key))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
