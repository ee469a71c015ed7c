//! Storage gateway: bucket/prefix listing and whole-object reads and writes
//! over `object_store`, one store per configured bucket.

pub mod backend;
pub mod error;

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::PutPayload;
use tracing::debug;

use genomic_core::config::{PipelineConfig, StorageMode};

pub use backend::StorageBackend;
pub use error::StorageError;

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub bucket: String,
    /// Path inside the bucket, no leading slash.
    pub path: String,
    pub file_name: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

impl ObjectInfo {
    /// `bucket/path`.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.bucket, self.path)
    }
}

/// Named buckets, each backed by its own store.
#[derive(Debug, Clone, Default)]
pub struct StorageGateway {
    buckets: HashMap<String, StorageBackend>,
}

impl StorageGateway {
    /// Build one backend per bucket named in the config.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, StorageError> {
        let mut gateway = Self::default();
        for bucket in config.buckets.all() {
            let backend = match config.storage.mode {
                StorageMode::Local => StorageBackend::local(&config.storage.local_root, &bucket)?,
                StorageMode::S3 => StorageBackend::s3(&config.aws, &bucket)?,
                StorageMode::Memory => StorageBackend::memory(),
            };
            gateway.buckets.insert(bucket, backend);
        }
        Ok(gateway)
    }

    /// Empty in-memory buckets, for tests and dry runs.
    pub fn in_memory<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            buckets: buckets
                .into_iter()
                .map(|b| (b.into(), StorageBackend::memory()))
                .collect(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>, backend: StorageBackend) -> Self {
        self.buckets.insert(bucket.into(), backend);
        self
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.contains_key(bucket)
    }

    fn backend(&self, bucket: &str) -> Result<&StorageBackend, StorageError> {
        self.buckets
            .get(bucket)
            .ok_or_else(|| StorageError::UnknownBucket(bucket.to_string()))
    }

    /// Every object under `prefix` (recursive), oldest first.
    pub async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let store = self.backend(bucket)?.store();
        let prefix = prefix.trim_matches('/');
        let location = (!prefix.is_empty()).then(|| ObjectPath::from(prefix));

        let mut stream = store.list(location.as_ref());
        let mut objects = Vec::new();
        while let Some(meta) = stream.try_next().await? {
            let path = meta.location.to_string();
            let file_name = meta
                .location
                .filename()
                .map(str::to_string)
                .unwrap_or_else(|| path.clone());
            objects.push(ObjectInfo {
                bucket: bucket.to_string(),
                path,
                file_name,
                last_modified: meta.last_modified,
                size: meta.size as u64,
            });
        }

        objects.sort_by(|a, b| a.last_modified.cmp(&b.last_modified).then_with(|| a.path.cmp(&b.path)));
        debug!(bucket, prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }

    pub async fn read_bytes(&self, bucket: &str, path: &str) -> Result<Bytes, StorageError> {
        let store = self.backend(bucket)?.store();
        let result = store.get(&ObjectPath::from(path)).await?;
        Ok(result.bytes().await?)
    }

    pub async fn read_to_string(&self, bucket: &str, path: &str) -> Result<String, StorageError> {
        let bytes = self.read_bytes(bucket, path).await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StorageError::Encoding(format!("{bucket}/{path}")))
    }

    /// Create or replace an object.
    pub async fn write(&self, bucket: &str, path: &str, contents: impl Into<Bytes>) -> Result<(), StorageError> {
        let store = self.backend(bucket)?.store();
        let payload = PutPayload::from(contents.into());
        store.put(&ObjectPath::from(path), payload).await?;
        debug!(bucket, path, "wrote object");
        Ok(())
    }

    /// Metadata of one object; `None` when it does not exist.
    pub async fn head(&self, bucket: &str, path: &str) -> Result<Option<ObjectInfo>, StorageError> {
        let store = self.backend(bucket)?.store();
        match store.head(&ObjectPath::from(path)).await {
            Ok(meta) => Ok(Some(ObjectInfo {
                bucket: bucket.to_string(),
                path: meta.location.to_string(),
                file_name: meta.location.filename().unwrap_or(path).to_string(),
                last_modified: meta.last_modified,
                size: meta.size as u64,
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StorageError> {
        Ok(self.head(bucket, path).await?.is_some())
    }
}
