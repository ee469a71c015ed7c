//! Inbound manifest ingestion.
//!
//! Each file is validated (name, then structure), applied row by row to the
//! registry, and committed together with its [`GenomicFileProcessed`] record
//! in one [`UnitOfWork`]. Validation failures are recorded on that record and
//! never abort the batch; registry or storage failures do.

mod control;
mod exchange;
mod gc_manifest;
mod metrics;

use tracing::{debug, info, warn};
use uuid::Uuid;

use genomic_core::manifest::{parse_file_name, FileNameParts};
use genomic_core::{
    transition, FileStatus, GenomeType, GenomicFileProcessed, GenomicSetMember, JobResult,
    ManifestKind, PipelineError, WorkflowEvent, WorkflowState,
};
use genomic_notify::AlertGroup;
use genomic_registry::UnitOfWork;
use genomic_storage::{ObjectInfo, StorageError};

use crate::context::JobContext;
use crate::table::{read_manifest, ManifestTable, Row};

/// A single object an ingestion run is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTarget {
    pub bucket: String,
    pub path: String,
}

/// What one file's rows are being applied under.
pub(crate) struct FileScope<'f> {
    pub kind: ManifestKind,
    pub file: &'f GenomicFileProcessed,
    pub parts: &'f FileNameParts,
}

impl FileScope<'_> {
    /// Genome lane of the file; kinds without a lane token default by kind.
    pub fn genome_type(&self) -> GenomeType {
        self.parts.genome_type.unwrap_or(match self.kind {
            ManifestKind::GemA2 | ManifestKind::Aw2Array | ManifestKind::Aw4Array => GenomeType::Array,
            _ => GenomeType::Wgs,
        })
    }
}

/// Alert produced while applying a file, raised once the file commits.
pub(crate) struct PendingAlert {
    pub kind: &'static str,
    pub bucket: String,
    pub groups: Vec<AlertGroup>,
}

/// Ingest every unprocessed file of `kinds`, or only `target` when given.
///
/// Returns the folded per-file result; `NoFilesFound` when nothing was
/// pending.
pub async fn run(
    ctx: &mut JobContext<'_>,
    kinds: &[ManifestKind],
    target: Option<&ObjectTarget>,
) -> Result<JobResult, PipelineError> {
    let pending = match target {
        Some(target) => {
            let object = ctx
                .storage
                .head(&target.bucket, &target.path)
                .await?
                .ok_or_else(|| PipelineError::Dependency(format!("object not found: {}/{}", target.bucket, target.path)))?;
            vec![(kind_for_path(kinds, &object.path), object)]
        }
        None => pending_files(ctx, kinds).await?,
    };

    if pending.is_empty() {
        info!(job_run_id = %ctx.run_id(), "no new manifests");
        return Ok(JobResult::NoFilesFound);
    }

    let mut results = Vec::with_capacity(pending.len());
    for (kind, object) in pending {
        let file = ingest_object(ctx, kind, &object).await?;
        results.push(file.file_result);
    }
    Ok(fold_results(&results))
}

/// Ingest one object as a manifest of `kind`.
pub async fn ingest_manifest(
    ctx: &mut JobContext<'_>,
    bucket: &str,
    path: &str,
    kind: ManifestKind,
) -> Result<GenomicFileProcessed, PipelineError> {
    let object = ctx
        .storage
        .head(bucket, path)
        .await?
        .ok_or_else(|| PipelineError::Dependency(format!("object not found: {bucket}/{path}")))?;
    ingest_object(ctx, kind, &object).await
}

/// Worst per-file result; `NoFilesFound` for an empty batch.
pub fn fold_results(results: &[JobResult]) -> JobResult {
    results
        .iter()
        .copied()
        .max_by_key(JobResult::severity)
        .unwrap_or(JobResult::NoFilesFound)
}

fn kind_for_path(kinds: &[ManifestKind], path: &str) -> ManifestKind {
    kinds
        .iter()
        .copied()
        .find(|k| k.descriptor().folders.iter().any(|f| path.starts_with(&format!("{f}/"))))
        .or_else(|| kinds.first().copied())
        .unwrap_or(ManifestKind::Aw1)
}

async fn pending_files(
    ctx: &JobContext<'_>,
    kinds: &[ManifestKind],
) -> Result<Vec<(ManifestKind, ObjectInfo)>, PipelineError> {
    let mut pending = Vec::new();
    for kind in kinds {
        let descriptor = kind.descriptor();
        for bucket in ctx.config.buckets.for_role(descriptor.bucket) {
            for folder in descriptor.folders {
                for object in ctx.storage.list(bucket, folder).await? {
                    if !object.file_name.to_ascii_lowercase().ends_with(".csv") {
                        continue;
                    }
                    if ctx.registry.file_processed(bucket, &object.path).await?.is_some() {
                        debug!(file = %object.full_path(), "already processed");
                        continue;
                    }
                    pending.push((*kind, object));
                }
            }
        }
    }
    Ok(pending)
}

async fn ingest_object(
    ctx: &mut JobContext<'_>,
    kind: ManifestKind,
    object: &ObjectInfo,
) -> Result<GenomicFileProcessed, PipelineError> {
    let mut file = match ctx.registry.file_processed(&object.bucket, &object.path).await? {
        Some(existing) => existing,
        None => GenomicFileProcessed {
            id: Uuid::new_v4(),
            job_run_id: ctx.run_id(),
            bucket_name: object.bucket.clone(),
            file_path: object.path.clone(),
            file_name: object.file_name.clone(),
            upload_date: None,
            status: FileStatus::Processing,
            file_result: JobResult::Success,
            record_count: 0,
        },
    };
    file.job_run_id = ctx.run_id();
    file.upload_date = Some(object.last_modified);
    file.status = FileStatus::Processing;

    let mut unit = UnitOfWork::new();
    let mut alert = None;
    match load(ctx, kind, object).await? {
        Ok((parts, table)) => {
            let scope = FileScope {
                kind,
                file: &file,
                parts: &parts,
            };
            alert = apply(ctx, &mut unit, &scope, &table).await?;
            file.file_result = JobResult::Success;
            file.record_count = table.rows.len() as i64;
        }
        Err(e) => {
            warn!(job_run_id = %ctx.run_id(), file = %file.full_path(), error = %e, "manifest rejected");
            file.file_result = match e {
                PipelineError::InvalidFilename { .. } => JobResult::InvalidFileName,
                _ => JobResult::InvalidFileStructure,
            };
            file.record_count = 0;
        }
    }

    file.status = FileStatus::Processed;
    unit.put_file(file.clone());
    ctx.registry.commit(unit).await?;

    info!(
        job_run_id = %ctx.run_id(),
        kind = %kind,
        file = %file.full_path(),
        result = %file.file_result,
        records = file.record_count,
        "manifest ingested"
    );

    if let Some(alert) = alert {
        ctx.raise(alert.kind, alert.bucket, alert.groups);
    }
    ctx.files.push(file.clone());
    Ok(file)
}

/// Validate name and structure. The outer error aborts the run; the inner
/// one is a file-level rejection.
async fn load(
    ctx: &JobContext<'_>,
    kind: ManifestKind,
    object: &ObjectInfo,
) -> Result<Result<(FileNameParts, ManifestTable), PipelineError>, PipelineError> {
    let parts = match parse_file_name(kind, &object.path) {
        Ok(parts) => parts,
        Err(e) => return Ok(Err(e)),
    };
    let text = match ctx.storage.read_to_string(&object.bucket, &object.path).await {
        Ok(text) => text,
        Err(StorageError::Encoding(_)) => {
            return Ok(Err(PipelineError::InvalidStructure {
                file: object.file_name.clone(),
                reason: "not valid UTF-8".into(),
            }))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(read_manifest(kind, &object.file_name, &text).map(|table| (parts, table)))
}

async fn apply(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    scope: &FileScope<'_>,
    table: &ManifestTable,
) -> Result<Option<PendingAlert>, PipelineError> {
    match scope.kind {
        ManifestKind::Aw1 | ManifestKind::Aw1c => gc_manifest::apply_gc_manifest(ctx, unit, scope, table).await,
        ManifestKind::Aw1f | ManifestKind::Aw1cf => {
            gc_manifest::apply_failure_manifest(ctx, unit, scope, table).await
        }
        ManifestKind::Aw2Array | ManifestKind::Aw2Wgs => metrics::apply_metrics(ctx, unit, scope, table).await,
        ManifestKind::GemA2 => exchange::apply_gem_a2(ctx, unit, scope, table).await,
        ManifestKind::CvlW2 => exchange::apply_cvl_w2(ctx, unit, scope, table).await,
        ManifestKind::Aw4Array | ManifestKind::Aw4Wgs => exchange::apply_aw4(ctx, unit, scope, table).await,
        other => Err(PipelineError::Config(format!("{other} is not an inbound manifest"))),
    }
}

// ── Row helpers ───────────────────────────────────────────────

/// Biobank id of a row with the prefix removed.
pub(crate) fn row_biobank_id(ctx: &JobContext<'_>, scope: &FileScope<'_>, row: &Row) -> Option<String> {
    match row.get("biobank_id") {
        Some(raw) => Some(ctx.strip_prefix(raw)),
        None => {
            warn!(file = %scope.file.file_name, "row without biobank id skipped");
            None
        }
    }
}

/// A member as this unit currently sees it.
fn staged(unit: &UnitOfWork, member: GenomicSetMember) -> GenomicSetMember {
    unit.member(member.id).cloned().unwrap_or(member)
}

async fn lane_members(
    ctx: &JobContext<'_>,
    unit: &UnitOfWork,
    biobank_id: &str,
    genome_type: GenomeType,
) -> Result<Vec<GenomicSetMember>, PipelineError> {
    Ok(ctx
        .registry
        .members_by_biobank_id(biobank_id)
        .await?
        .into_iter()
        .map(|m| staged(unit, m))
        .filter(|m| m.genome_type == genome_type && m.workflow_state != WorkflowState::ControlSample)
        .collect())
}

/// Resolve a genome-center manifest row: a member whose tube or sample id
/// matches wins, otherwise the oldest member of the lane.
pub(crate) async fn resolve_member(
    ctx: &JobContext<'_>,
    unit: &UnitOfWork,
    biobank_id: &str,
    genome_type: GenomeType,
    tube_id: Option<&str>,
    sample_id: Option<&str>,
) -> Result<Option<GenomicSetMember>, PipelineError> {
    let members = lane_members(ctx, unit, biobank_id, genome_type).await?;
    let exact = members.iter().position(|m| {
        (tube_id.is_some() && m.collection_tube_id.as_deref() == tube_id)
            || (sample_id.is_some() && m.sample_id.as_deref() == sample_id)
    });
    Ok(match exact {
        Some(i) => members.into_iter().nth(i),
        None => members.into_iter().next(),
    })
}

/// Member keyed by biobank id + sample id.
pub(crate) async fn member_by_sample(
    ctx: &JobContext<'_>,
    unit: &UnitOfWork,
    biobank_id: &str,
    sample_id: &str,
    genome_type: GenomeType,
) -> Result<Option<GenomicSetMember>, PipelineError> {
    Ok(lane_members(ctx, unit, biobank_id, genome_type)
        .await?
        .into_iter()
        .find(|m| m.sample_id.as_deref() == Some(sample_id)))
}

/// Target state of `event`, or `None` (logged) when the member may not take it.
pub(crate) fn next_state(
    scope: &FileScope<'_>,
    member: &GenomicSetMember,
    event: WorkflowEvent,
) -> Option<WorkflowState> {
    match transition(member.workflow_state, event) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(
                file = %scope.file.file_name,
                biobank_id = %member.biobank_id,
                error = %e,
                "row rejected"
            );
            None
        }
    }
}
