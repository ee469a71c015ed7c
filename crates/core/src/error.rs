use thiserror::Error;

use crate::kinds::JobKind;
use crate::workflow::IllegalTransition;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid file name {file}: {reason}")]
    InvalidFilename { file: String, reason: String },

    #[error("invalid file structure {file}: {reason}")]
    InvalidStructure { file: String, reason: String },

    #[error("no files found for {0}")]
    NoFilesFound(JobKind),

    /// Registry or storage I/O failed; aborts the job run.
    #[error("dependency failure: {0}")]
    Dependency(String),

    #[error("missing data files for {member}: {files}")]
    ReconciliationGap { member: String, files: String },

    #[error("contamination escalation for sample {sample_id}: {category}")]
    ContaminationEscalation { sample_id: String, category: String },

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("job {0} is already running")]
    JobAlreadyRunning(JobKind),

    #[error("config error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Whether this error is a per-file validation failure that leaves the
    /// rest of the batch running.
    pub fn is_file_level(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidFilename { .. } | PipelineError::InvalidStructure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
