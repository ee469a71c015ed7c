use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kinds::{
    ContaminationCategory, DataFileKind, FileStatus, GenomeType, GrorConsent, JobKind, JobResult,
    JobStatus, ManifestKind, QcStatus, SetStatus, WorkflowState,
};

pub type MemberId = Uuid;
pub type JobRunId = Uuid;

// ── Sets and members ──────────────────────────────────────────

/// A named batch of specimens submitted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomicSet {
    pub id: Uuid,
    pub name: String,
    pub version: i32,
    pub status: SetStatus,
    pub file_path: Option<String>,
    pub created: DateTime<Utc>,
}

/// Stage of the pipeline whose job run is stamped on a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    ReconcileMetrics,
    GcManifest,
    Aw1f,
    Aw2f,
    GemA1,
    GemA2,
    GemA3,
    CvlW1,
    CvlW2,
    CvlW3,
    CvlAw1c,
    CvlAw1cf,
    Aw3,
    Aw4,
}

/// Per-stage job-run foreign keys carried by a member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageStamps {
    pub reconcile_metrics: Option<JobRunId>,
    pub gc_manifest: Option<JobRunId>,
    pub aw1f: Option<JobRunId>,
    pub aw2f: Option<JobRunId>,
    pub gem_a1: Option<JobRunId>,
    pub gem_a2: Option<JobRunId>,
    pub gem_a3: Option<JobRunId>,
    pub cvl_w1: Option<JobRunId>,
    pub cvl_w2: Option<JobRunId>,
    pub cvl_w3: Option<JobRunId>,
    pub cvl_aw1c: Option<JobRunId>,
    pub cvl_aw1cf: Option<JobRunId>,
    pub aw3: Option<JobRunId>,
    pub aw4: Option<JobRunId>,
}

impl StageStamps {
    fn slot(&mut self, stage: Stage) -> &mut Option<JobRunId> {
        match stage {
            Stage::ReconcileMetrics => &mut self.reconcile_metrics,
            Stage::GcManifest => &mut self.gc_manifest,
            Stage::Aw1f => &mut self.aw1f,
            Stage::Aw2f => &mut self.aw2f,
            Stage::GemA1 => &mut self.gem_a1,
            Stage::GemA2 => &mut self.gem_a2,
            Stage::GemA3 => &mut self.gem_a3,
            Stage::CvlW1 => &mut self.cvl_w1,
            Stage::CvlW2 => &mut self.cvl_w2,
            Stage::CvlW3 => &mut self.cvl_w3,
            Stage::CvlAw1c => &mut self.cvl_aw1c,
            Stage::CvlAw1cf => &mut self.cvl_aw1cf,
            Stage::Aw3 => &mut self.aw3,
            Stage::Aw4 => &mut self.aw4,
        }
    }

    pub fn get(&self, stage: Stage) -> Option<JobRunId> {
        match stage {
            Stage::ReconcileMetrics => self.reconcile_metrics,
            Stage::GcManifest => self.gc_manifest,
            Stage::Aw1f => self.aw1f,
            Stage::Aw2f => self.aw2f,
            Stage::GemA1 => self.gem_a1,
            Stage::GemA2 => self.gem_a2,
            Stage::GemA3 => self.gem_a3,
            Stage::CvlW1 => self.cvl_w1,
            Stage::CvlW2 => self.cvl_w2,
            Stage::CvlW3 => self.cvl_w3,
            Stage::CvlAw1c => self.cvl_aw1c,
            Stage::CvlAw1cf => self.cvl_aw1cf,
            Stage::Aw3 => self.aw3,
            Stage::Aw4 => self.aw4,
        }
    }

    pub fn set(&mut self, stage: Stage, job_run_id: JobRunId) {
        *self.slot(stage) = Some(job_run_id);
    }
}

/// One participant specimen tracked for one genome type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomicSetMember {
    pub id: MemberId,
    pub genomic_set_id: Option<Uuid>,
    pub participant_id: Option<String>,
    pub biobank_id: String,
    pub genome_type: GenomeType,
    pub collection_tube_id: Option<String>,
    pub sample_id: Option<String>,
    /// External vocabulary: `F`, `M` or `NA`.
    pub sex_at_birth: String,
    pub sex_at_birth_flagged: bool,
    pub ai_an: bool,
    pub ny_flag: bool,
    pub gc_site_id: Option<String>,
    pub package_id: Option<String>,
    pub box_storage_unit_id: Option<String>,
    pub box_id_plate_id: Option<String>,
    pub well_box_position: Option<String>,
    pub sample_type: Option<String>,
    pub test_name: Option<String>,
    pub failure_mode: Option<String>,
    pub failure_mode_desc: Option<String>,
    pub qc_status: QcStatus,
    pub gem_pass: Option<bool>,
    pub drc_fingerprint_path: Option<String>,
    pub workflow_state: WorkflowState,
    pub workflow_state_modified: DateTime<Utc>,
    /// Outbound manifest that first listed this member.
    pub manifest_file_id: Option<Uuid>,
    pub aw1_file_processed_id: Option<Uuid>,
    pub stamps: StageStamps,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl GenomicSetMember {
    /// A fresh member in the initial `AW0` state.
    pub fn new(biobank_id: impl Into<String>, genome_type: GenomeType, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            genomic_set_id: None,
            participant_id: None,
            biobank_id: biobank_id.into(),
            genome_type,
            collection_tube_id: None,
            sample_id: None,
            sex_at_birth: "NA".to_string(),
            sex_at_birth_flagged: false,
            ai_an: false,
            ny_flag: false,
            gc_site_id: None,
            package_id: None,
            box_storage_unit_id: None,
            box_id_plate_id: None,
            well_box_position: None,
            sample_type: None,
            test_name: None,
            failure_mode: None,
            failure_mode_desc: None,
            qc_status: QcStatus::Unset,
            gem_pass: None,
            drc_fingerprint_path: None,
            workflow_state: WorkflowState::Aw0,
            workflow_state_modified: now,
            manifest_file_id: None,
            aw1_file_processed_id: None,
            stamps: StageStamps::default(),
            created: now,
            modified: now,
        }
    }

    /// Move to `state` and record when it happened.
    pub fn set_state(&mut self, state: WorkflowState, now: DateTime<Utc>) {
        if self.workflow_state != state {
            self.workflow_state = state;
            self.workflow_state_modified = now;
        }
        self.modified = now;
    }
}

// ── Ledger rows ───────────────────────────────────────────────

/// One execution of any job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomicJobRun {
    pub id: JobRunId,
    pub job_kind: JobKind,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub result: Option<JobResult>,
    pub message: Option<String>,
}

/// One inbound or outbound file touched by a job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomicFileProcessed {
    pub id: Uuid,
    pub job_run_id: JobRunId,
    pub bucket_name: String,
    pub file_path: String,
    pub file_name: String,
    pub upload_date: Option<DateTime<Utc>>,
    pub status: FileStatus,
    pub file_result: JobResult,
    pub record_count: i64,
}

impl GenomicFileProcessed {
    /// `bucket/path`, the idempotency key for ingestion.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.bucket_name, self.file_path)
    }
}

/// A manifest exchanged with an external partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomicManifestFile {
    pub id: Uuid,
    pub manifest_kind: ManifestKind,
    pub bucket_name: String,
    pub file_path: String,
    pub file_name: String,
    pub record_count: i64,
    pub upload_date: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

/// Round-trip bookkeeping between an outbound manifest and the rows a
/// partner sent back for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomicManifestFeedback {
    pub id: Uuid,
    pub input_manifest_file_id: Uuid,
    pub feedback_manifest_file_id: Option<Uuid>,
    pub feedback_record_count: i64,
    pub feedback_complete: bool,
    pub feedback_complete_date: Option<DateTime<Utc>>,
    pub aw2f_job_run_id: Option<JobRunId>,
    pub aw2f_manifest_file_id: Option<Uuid>,
}

/// Presence of one expected raw data file, recorded by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFileRecord {
    pub kind: DataFileKind,
    pub received: bool,
    pub path: Option<String>,
}

/// QC metrics for one member from one AW2 manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcValidationMetrics {
    pub id: Uuid,
    pub member_id: MemberId,
    pub genome_type: GenomeType,
    pub file_processed_id: Uuid,
    pub lims_id: Option<String>,
    pub chipwellbarcode: Option<String>,
    pub call_rate: Option<String>,
    pub mean_coverage: Option<String>,
    pub genome_coverage: Option<String>,
    pub aouhdr_coverage: Option<String>,
    pub sex_concordance: Option<String>,
    pub sex_ploidy: Option<String>,
    pub aligned_q30_bases: Option<String>,
    pub array_concordance: Option<String>,
    pub contamination: Option<f64>,
    pub contamination_category: ContaminationCategory,
    pub processing_status: Option<String>,
    pub notes: Option<String>,
    pub site_id: Option<String>,
    pub reconcile_job_run_id: Option<JobRunId>,
    pub data_files: Vec<DataFileRecord>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl GcValidationMetrics {
    /// Names of expected files recorded as absent.
    pub fn missing_files(&self) -> Vec<DataFileKind> {
        self.data_files
            .iter()
            .filter(|f| !f.received)
            .map(|f| f.kind)
            .collect()
    }
}

/// Append-only marker that a sample was contaminated in a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomicSampleContamination {
    pub id: Uuid,
    pub sample_id: String,
    pub failed_in_job: JobRunId,
    pub created: DateTime<Utc>,
}

// ── External read models ──────────────────────────────────────

/// Consent and demographic summary owned by the participant domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub participant_id: String,
    pub biobank_id: String,
    pub sex_at_birth: Option<String>,
    pub state: Option<String>,
    pub ai_an: bool,
    pub consent_for_study_enrollment: bool,
    pub consent_for_genomics_ror: GrorConsent,
    pub consent_for_genomics_ror_authored: Option<DateTime<Utc>>,
    pub withdrawn: bool,
    pub withdrawal_authored: Option<DateTime<Utc>>,
    pub dna_sample_received: bool,
    pub last_modified: DateTime<Utc>,
}

impl ParticipantSummary {
    pub fn has_gror(&self) -> bool {
        self.consent_for_genomics_ror == GrorConsent::Submitted
    }

    pub fn is_new_york(&self) -> bool {
        self.state.as_deref() == Some("PIIState_NY")
    }
}

/// A specimen the biobank holds for a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiobankStoredSample {
    pub biobank_stored_sample_id: String,
    pub biobank_id: String,
    pub test: String,
    pub confirmed: Option<DateTime<Utc>>,
    pub disposed: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl BiobankStoredSample {
    pub fn is_available(&self) -> bool {
        self.disposed.is_none()
    }
}
