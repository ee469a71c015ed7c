use std::path::Path;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::info;

use genomic_core::config::AwsConfig;

use crate::error::StorageError;

/// One bucket's object store.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// A directory standing in for the bucket.
    Local(Arc<dyn ObjectStore>),
    S3(Arc<dyn ObjectStore>),
    Memory(Arc<dyn ObjectStore>),
}

impl StorageBackend {
    /// Get the underlying ObjectStore.
    pub fn store(&self) -> &dyn ObjectStore {
        match self {
            StorageBackend::Local(s) | StorageBackend::S3(s) | StorageBackend::Memory(s) => s.as_ref(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageBackend::S3(_))
    }

    /// `{root}/{bucket}` on the local filesystem, created if missing.
    pub fn local(root: &Path, bucket: &str) -> Result<Self, StorageError> {
        let dir = root.join(bucket);
        std::fs::create_dir_all(&dir)?;
        let canonical = std::fs::canonicalize(&dir).unwrap_or(dir);
        let store = LocalFileSystem::new_with_prefix(&canonical)
            .map_err(|e| StorageError::NotConfigured(format!("local filesystem error: {e}")))?;
        info!(bucket, path = %canonical.display(), "Storage: local bucket");
        Ok(StorageBackend::Local(Arc::new(store)))
    }

    pub fn memory() -> Self {
        StorageBackend::Memory(Arc::new(InMemory::new()))
    }

    pub fn s3(aws: &AwsConfig, bucket: &str) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::new().with_region(&aws.region);

        if let Some(ref key) = aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = aws.session_token {
            builder = builder.with_token(token);
        }

        if let Some(ref endpoint) = aws.endpoint_url {
            // object_store requires absolute URLs
            let endpoint_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("https://{}", endpoint)
            };
            builder = builder
                .with_bucket_name(bucket)
                .with_endpoint(&endpoint_url)
                .with_allow_http(endpoint_url.starts_with("http://"));
        } else {
            builder = builder.with_url(format!("s3://{}", bucket));
        }

        let store = builder.build()?;
        info!(bucket, region = %aws.region, "Storage: S3 bucket");
        Ok(StorageBackend::S3(Arc::new(store)))
    }
}
