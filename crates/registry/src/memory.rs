use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use genomic_core::{
    BiobankStoredSample, GcValidationMetrics, GenomeType, GenomicFileProcessed, GenomicJobRun,
    GenomicManifestFeedback, GenomicManifestFile, GenomicSampleContamination, GenomicSet,
    GenomicSetMember, JobKind, JobRunId, JobStatus, ManifestKind, MemberId, ParticipantSummary,
    WorkflowState,
};

use crate::{Registry, RegistryError, Result, UnitOfWork};

#[derive(Debug, Default)]
struct Tables {
    job_runs: Vec<GenomicJobRun>,
    locks: HashMap<JobKind, JobRunId>,
    sets: Vec<GenomicSet>,
    members: Vec<GenomicSetMember>,
    files: Vec<GenomicFileProcessed>,
    manifests: Vec<GenomicManifestFile>,
    feedback: Vec<GenomicManifestFeedback>,
    metrics: Vec<GcValidationMetrics>,
    contamination: Vec<GenomicSampleContamination>,
    participants: Vec<ParticipantSummary>,
    stored_samples: Vec<BiobankStoredSample>,
}

/// Insert or replace by key, keeping first-insert order.
fn upsert_by<T, K: PartialEq>(table: &mut Vec<T>, item: T, key: impl Fn(&T) -> K) {
    let k = key(&item);
    match table.iter_mut().find(|existing| key(existing) == k) {
        Some(slot) => *slot = item,
        None => table.push(item),
    }
}

/// Registry held entirely in process memory.
///
/// `commit` applies a whole unit under one write lock, so readers never see
/// half of it.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    tables: RwLock<Tables>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| RegistryError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| RegistryError::Poisoned)
    }

    // ── Seeding external read models ──────────────────────────

    pub fn put_participant(&self, participant: ParticipantSummary) -> Result<()> {
        upsert_by(&mut self.write()?.participants, participant, |p| p.participant_id.clone());
        Ok(())
    }

    pub fn put_stored_sample(&self, sample: BiobankStoredSample) -> Result<()> {
        upsert_by(&mut self.write()?.stored_samples, sample, |s| {
            s.biobank_stored_sample_id.clone()
        });
        Ok(())
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn all_members(&self) -> Result<Vec<GenomicSetMember>> {
        Ok(self.read()?.members.clone())
    }

    pub fn all_sets(&self) -> Result<Vec<GenomicSet>> {
        Ok(self.read()?.sets.clone())
    }

    pub fn all_metrics(&self) -> Result<Vec<GcValidationMetrics>> {
        Ok(self.read()?.metrics.clone())
    }

    pub fn all_contamination(&self) -> Result<Vec<GenomicSampleContamination>> {
        Ok(self.read()?.contamination.clone())
    }

    pub fn all_files(&self) -> Result<Vec<GenomicFileProcessed>> {
        Ok(self.read()?.files.clone())
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn open_job_run(&self, run: &GenomicJobRun) -> Result<()> {
        upsert_by(&mut self.write()?.job_runs, run.clone(), |r| r.id);
        Ok(())
    }

    async fn close_job_run(&self, run: &GenomicJobRun) -> Result<()> {
        upsert_by(&mut self.write()?.job_runs, run.clone(), |r| r.id);
        Ok(())
    }

    async fn job_runs(&self, kind: JobKind) -> Result<Vec<GenomicJobRun>> {
        let mut runs: Vec<GenomicJobRun> = self
            .read()?
            .job_runs
            .iter()
            .filter(|r| r.job_kind == kind)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(runs)
    }

    async fn last_successful_run(&self, kind: JobKind) -> Result<Option<GenomicJobRun>> {
        Ok(self
            .job_runs(kind)
            .await?
            .into_iter()
            .find(|r| r.status == JobStatus::Completed && r.result.is_some_and(|res| res.is_success())))
    }

    async fn try_acquire_job_lock(&self, kind: JobKind, run_id: JobRunId) -> Result<bool> {
        let mut tables = self.write()?;
        if tables.locks.contains_key(&kind) {
            return Ok(false);
        }
        tables.locks.insert(kind, run_id);
        Ok(true)
    }

    async fn release_job_lock(&self, kind: JobKind) -> Result<()> {
        self.write()?.locks.remove(&kind);
        Ok(())
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<()> {
        let mut tables = self.write()?;
        for set in unit.sets {
            upsert_by(&mut tables.sets, set, |s| s.id);
        }
        for member in unit.members {
            upsert_by(&mut tables.members, member, |m| m.id);
        }
        for file in unit.files {
            upsert_by(&mut tables.files, file, |f| f.id);
        }
        for manifest in unit.manifests {
            upsert_by(&mut tables.manifests, manifest, |m| m.id);
        }
        for feedback in unit.feedback {
            upsert_by(&mut tables.feedback, feedback, |f| f.id);
        }
        for metrics in unit.metrics {
            upsert_by(&mut tables.metrics, metrics, |m| m.id);
        }
        tables.contamination.extend(unit.contamination);
        Ok(())
    }

    async fn file_processed(&self, bucket: &str, path: &str) -> Result<Option<GenomicFileProcessed>> {
        Ok(self
            .read()?
            .files
            .iter()
            .find(|f| f.bucket_name == bucket && f.file_path == path)
            .cloned())
    }

    async fn file_processed_by_id(&self, id: Uuid) -> Result<Option<GenomicFileProcessed>> {
        Ok(self.read()?.files.iter().find(|f| f.id == id).cloned())
    }

    async fn files_for_job_run(&self, job_run_id: JobRunId) -> Result<Vec<GenomicFileProcessed>> {
        Ok(self
            .read()?
            .files
            .iter()
            .filter(|f| f.job_run_id == job_run_id)
            .cloned()
            .collect())
    }

    async fn manifest_file(&self, id: Uuid) -> Result<Option<GenomicManifestFile>> {
        Ok(self.read()?.manifests.iter().find(|m| m.id == id).cloned())
    }

    async fn manifest_file_by_path(&self, bucket: &str, path: &str) -> Result<Option<GenomicManifestFile>> {
        Ok(self
            .read()?
            .manifests
            .iter()
            .find(|m| m.bucket_name == bucket && m.file_path == path)
            .cloned())
    }

    async fn manifest_files(&self, kind: ManifestKind) -> Result<Vec<GenomicManifestFile>> {
        Ok(self
            .read()?
            .manifests
            .iter()
            .filter(|m| m.manifest_kind == kind)
            .cloned()
            .collect())
    }

    async fn feedback_for_manifest(&self, input_manifest_file_id: Uuid) -> Result<Option<GenomicManifestFeedback>> {
        Ok(self
            .read()?
            .feedback
            .iter()
            .find(|f| f.input_manifest_file_id == input_manifest_file_id)
            .cloned())
    }

    async fn feedback_awaiting_aw2f(&self) -> Result<Vec<GenomicManifestFeedback>> {
        Ok(self
            .read()?
            .feedback
            .iter()
            .filter(|f| f.feedback_complete && f.aw2f_job_run_id.is_none())
            .cloned()
            .collect())
    }

    async fn max_set_version(&self, name: &str) -> Result<Option<i32>> {
        Ok(self
            .read()?
            .sets
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.version)
            .max())
    }

    async fn member(&self, id: MemberId) -> Result<Option<GenomicSetMember>> {
        Ok(self.read()?.members.iter().find(|m| m.id == id).cloned())
    }

    async fn members_by_biobank_id(&self, biobank_id: &str) -> Result<Vec<GenomicSetMember>> {
        Ok(self
            .read()?
            .members
            .iter()
            .filter(|m| m.biobank_id == biobank_id)
            .cloned()
            .collect())
    }

    async fn members_by_sample_id(&self, sample_id: &str) -> Result<Vec<GenomicSetMember>> {
        Ok(self
            .read()?
            .members
            .iter()
            .filter(|m| m.sample_id.as_deref() == Some(sample_id))
            .cloned()
            .collect())
    }

    async fn members_in_states(
        &self,
        states: &[WorkflowState],
        genome_type: Option<GenomeType>,
    ) -> Result<Vec<GenomicSetMember>> {
        let mut members: Vec<GenomicSetMember> = self
            .read()?
            .members
            .iter()
            .filter(|m| states.contains(&m.workflow_state))
            .filter(|m| genome_type.is_none_or(|g| m.genome_type == g))
            .cloned()
            .collect();
        members.sort_by_key(|m| m.created);
        Ok(members)
    }

    async fn members_for_manifest(&self, manifest_file_id: Uuid) -> Result<Vec<GenomicSetMember>> {
        Ok(self
            .read()?
            .members
            .iter()
            .filter(|m| m.manifest_file_id == Some(manifest_file_id))
            .cloned()
            .collect())
    }

    async fn metrics_for_member(&self, member_id: MemberId) -> Result<Option<GcValidationMetrics>> {
        Ok(self
            .read()?
            .metrics
            .iter()
            .filter(|m| m.member_id == member_id)
            .max_by_key(|m| m.created)
            .cloned())
    }

    async fn unreconciled_metrics(&self, genome_type: GenomeType) -> Result<Vec<GcValidationMetrics>> {
        let mut rows: Vec<GcValidationMetrics> = self
            .read()?
            .metrics
            .iter()
            .filter(|m| m.genome_type == genome_type && m.reconcile_job_run_id.is_none())
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created);
        Ok(rows)
    }

    async fn contamination_entries(&self, sample_id: &str) -> Result<Vec<GenomicSampleContamination>> {
        Ok(self
            .read()?
            .contamination
            .iter()
            .filter(|c| c.sample_id == sample_id)
            .cloned()
            .collect())
    }

    async fn participant(&self, participant_id: &str) -> Result<Option<ParticipantSummary>> {
        Ok(self
            .read()?
            .participants
            .iter()
            .find(|p| p.participant_id == participant_id)
            .cloned())
    }

    async fn participant_by_biobank_id(&self, biobank_id: &str) -> Result<Option<ParticipantSummary>> {
        Ok(self
            .read()?
            .participants
            .iter()
            .find(|p| p.biobank_id == biobank_id)
            .cloned())
    }

    async fn participants_modified_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ParticipantSummary>> {
        let mut rows: Vec<ParticipantSummary> = self
            .read()?
            .participants
            .iter()
            .filter(|p| since.is_none_or(|t| p.last_modified > t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.biobank_id.cmp(&b.biobank_id));
        Ok(rows)
    }

    async fn stored_samples(&self, biobank_id: &str) -> Result<Vec<BiobankStoredSample>> {
        Ok(self
            .read()?
            .stored_samples
            .iter()
            .filter(|s| s.biobank_id == biobank_id)
            .cloned()
            .collect())
    }
}
