use thiserror::Error;

use genomic_core::PipelineError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown bucket: {0}")]
    UnknownBucket(String),

    #[error("object is not UTF-8: {0}")]
    Encoding(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::Dependency(format!("storage: {err}"))
    }
}
