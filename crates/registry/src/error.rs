use thiserror::Error;

use genomic_core::PipelineError;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("registry lock poisoned")]
    Poisoned,
}

impl From<RegistryError> for PipelineError {
    fn from(err: RegistryError) -> Self {
        PipelineError::Dependency(format!("registry: {err}"))
    }
}
