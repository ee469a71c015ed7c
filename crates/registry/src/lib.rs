//! Member/set registry and job-run ledger.
//!
//! The pipeline only talks to the [`Registry`] trait. [`MemoryRegistry`]
//! backs tests and dry runs; [`PgRegistry`] is the production store. All
//! writes besides the job-run ledger and the per-kind job lock go through a
//! [`UnitOfWork`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod unit;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use genomic_core::{
    BiobankStoredSample, GcValidationMetrics, GenomeType, GenomicFileProcessed,
    GenomicJobRun, GenomicManifestFeedback, GenomicManifestFile, GenomicSampleContamination,
    GenomicSetMember, JobKind, JobRunId, ManifestKind, MemberId, ParticipantSummary,
    WorkflowState,
};

pub use error::RegistryError;
pub use memory::MemoryRegistry;
pub use postgres::PgRegistry;
pub use unit::UnitOfWork;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[async_trait]
pub trait Registry: Send + Sync {
    // ── Job-run ledger ────────────────────────────────────────

    /// Persist a freshly started run.
    async fn open_job_run(&self, run: &GenomicJobRun) -> Result<()>;

    /// Persist the final status/result of a run.
    async fn close_job_run(&self, run: &GenomicJobRun) -> Result<()>;

    /// Runs of a kind, newest first.
    async fn job_runs(&self, kind: JobKind) -> Result<Vec<GenomicJobRun>>;

    /// Most recent completed run of `kind` whose result counts as success.
    async fn last_successful_run(&self, kind: JobKind) -> Result<Option<GenomicJobRun>>;

    /// Take the per-kind lock; `false` when another run holds it.
    async fn try_acquire_job_lock(&self, kind: JobKind, run_id: JobRunId) -> Result<bool>;

    async fn release_job_lock(&self, kind: JobKind) -> Result<()>;

    // ── Unit of work ──────────────────────────────────────────

    /// Apply every staged write atomically.
    async fn commit(&self, unit: UnitOfWork) -> Result<()>;

    // ── Files and manifests ───────────────────────────────────

    async fn file_processed(&self, bucket: &str, path: &str) -> Result<Option<GenomicFileProcessed>>;

    async fn file_processed_by_id(&self, id: Uuid) -> Result<Option<GenomicFileProcessed>>;

    async fn files_for_job_run(&self, job_run_id: JobRunId) -> Result<Vec<GenomicFileProcessed>>;

    async fn manifest_file(&self, id: Uuid) -> Result<Option<GenomicManifestFile>>;

    async fn manifest_file_by_path(&self, bucket: &str, path: &str) -> Result<Option<GenomicManifestFile>>;

    async fn manifest_files(&self, kind: ManifestKind) -> Result<Vec<GenomicManifestFile>>;

    async fn feedback_for_manifest(&self, input_manifest_file_id: Uuid) -> Result<Option<GenomicManifestFeedback>>;

    /// Complete feedback records with no contamination manifest sent yet.
    async fn feedback_awaiting_aw2f(&self) -> Result<Vec<GenomicManifestFeedback>>;

    // ── Sets and members ──────────────────────────────────────

    async fn max_set_version(&self, name: &str) -> Result<Option<i32>>;

    async fn member(&self, id: MemberId) -> Result<Option<GenomicSetMember>>;

    async fn members_by_biobank_id(&self, biobank_id: &str) -> Result<Vec<GenomicSetMember>>;

    async fn members_by_sample_id(&self, sample_id: &str) -> Result<Vec<GenomicSetMember>>;

    /// Members in any of `states`, optionally restricted to one genome type,
    /// ordered by creation time.
    async fn members_in_states(
        &self,
        states: &[WorkflowState],
        genome_type: Option<GenomeType>,
    ) -> Result<Vec<GenomicSetMember>>;

    async fn members_for_manifest(&self, manifest_file_id: Uuid) -> Result<Vec<GenomicSetMember>>;

    // ── QC metrics ────────────────────────────────────────────

    /// Latest metrics row of a member.
    async fn metrics_for_member(&self, member_id: MemberId) -> Result<Option<GcValidationMetrics>>;

    /// Metrics rows of `genome_type` never reconciled, oldest first.
    async fn unreconciled_metrics(&self, genome_type: GenomeType) -> Result<Vec<GcValidationMetrics>>;

    // ── Contamination ledger ──────────────────────────────────

    async fn contamination_entries(&self, sample_id: &str) -> Result<Vec<GenomicSampleContamination>>;

    async fn is_sample_contaminated(&self, sample_id: &str) -> Result<bool> {
        Ok(!self.contamination_entries(sample_id).await?.is_empty())
    }

    // ── External read models ──────────────────────────────────

    async fn participant(&self, participant_id: &str) -> Result<Option<ParticipantSummary>>;

    async fn participant_by_biobank_id(&self, biobank_id: &str) -> Result<Option<ParticipantSummary>>;

    /// Participant summaries modified strictly after `since` (all when `None`).
    async fn participants_modified_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ParticipantSummary>>;

    async fn stored_samples(&self, biobank_id: &str) -> Result<Vec<BiobankStoredSample>>;
}
