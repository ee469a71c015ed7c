//! Outbound manifest generation.
//!
//! A generator selects eligible members, renders rows in the kind's column
//! order, writes the CSV to the kind's bucket folder, and commits the
//! file/manifest ledger rows together with every member it stamped.

mod aw2f;
mod aw3;
mod new_participant;
mod partner;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use genomic_core::manifest::outbound_file_name;
use genomic_core::{
    transition, FileStatus, GenomeType, GenomicFileProcessed, GenomicManifestFile,
    GenomicSetMember, JobResult, ManifestKind, ParticipantSummary, PipelineError, Stage,
    WorkflowEvent,
};
use genomic_registry::UnitOfWork;

use crate::context::JobContext;
use crate::table::{write_manifest, OutboundRow};

/// A manifest written by a generator run.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedManifest {
    pub kind: ManifestKind,
    pub file: GenomicFileProcessed,
    pub manifest: Option<GenomicManifestFile>,
}

/// A rendered manifest waiting to be written.
pub(crate) struct Outbound {
    pub kind: ManifestKind,
    pub bucket: String,
    pub file_name: String,
    /// Id of the manifest-file row, known up front so members can point to it.
    pub manifest_id: Uuid,
    pub rows: Vec<OutboundRow>,
}

impl Outbound {
    /// A timestamp-named manifest in the kind's only bucket.
    pub fn standard(ctx: &JobContext<'_>, kind: ManifestKind, rows: Vec<OutboundRow>) -> Self {
        let bucket = ctx
            .config
            .buckets
            .for_role(kind.descriptor().bucket)
            .first()
            .map(|b| b.to_string())
            .unwrap_or_default();
        Self {
            kind,
            bucket,
            file_name: outbound_file_name(kind, ctx.as_of),
            manifest_id: Uuid::new_v4(),
            rows,
        }
    }

    pub fn path(&self) -> String {
        outbound_path(self.kind, &self.file_name)
    }
}

pub(crate) fn outbound_path(kind: ManifestKind, file_name: &str) -> String {
    match kind.descriptor().folders.first() {
        Some(folder) => format!("{folder}/{file_name}"),
        None => file_name.to_string(),
    }
}

/// Generate one manifest kind; `NoFilesFound` when nobody is eligible.
pub async fn generate(ctx: &mut JobContext<'_>, kind: ManifestKind) -> Result<JobResult, PipelineError> {
    let produced = match kind {
        ManifestKind::NewParticipant => new_participant::generate(ctx).await?,
        ManifestKind::GemA1 => partner::gem_a1(ctx).await?,
        ManifestKind::GemA3 => partner::gem_a3(ctx).await?,
        ManifestKind::CvlW1 => partner::cvl_request(ctx, ManifestKind::CvlW1).await?,
        ManifestKind::CvlW3 => partner::cvl_request(ctx, ManifestKind::CvlW3).await?,
        ManifestKind::Aw3Array => aw3::generate(ctx, GenomeType::Array).await?,
        ManifestKind::Aw3Wgs => aw3::generate(ctx, GenomeType::Wgs).await?,
        ManifestKind::Aw2f => aw2f::generate(ctx).await?,
        other => return Err(PipelineError::Config(format!("{other} is not an outbound manifest"))),
    };

    if produced.is_empty() {
        info!(job_run_id = %ctx.run_id(), kind = %kind, "no eligible members");
        return Ok(JobResult::NoFilesFound);
    }
    Ok(JobResult::Success)
}

/// Write `out` to storage, then commit its ledger rows with `unit`.
pub(crate) async fn publish(
    ctx: &mut JobContext<'_>,
    mut unit: UnitOfWork,
    out: Outbound,
) -> Result<GeneratedManifest, PipelineError> {
    let path = out.path();
    let text = write_manifest(out.kind, &out.rows)?;
    ctx.storage.write(&out.bucket, &path, text.into_bytes()).await?;

    let record_count = out.rows.len() as i64;
    let file = GenomicFileProcessed {
        id: Uuid::new_v4(),
        job_run_id: ctx.run_id(),
        bucket_name: out.bucket.clone(),
        file_path: path.clone(),
        file_name: out.file_name.clone(),
        upload_date: Some(ctx.as_of),
        status: FileStatus::Processed,
        file_result: JobResult::Success,
        record_count,
    };
    let manifest = out.kind.descriptor().partner_facing.then(|| GenomicManifestFile {
        id: out.manifest_id,
        manifest_kind: out.kind,
        bucket_name: out.bucket.clone(),
        file_path: path,
        file_name: out.file_name.clone(),
        record_count,
        upload_date: Some(ctx.as_of),
        created: ctx.as_of,
    });

    unit.put_file(file.clone());
    if let Some(manifest) = &manifest {
        unit.put_manifest(manifest.clone());
    }
    ctx.registry.commit(unit).await?;

    info!(
        job_run_id = %ctx.run_id(),
        kind = %out.kind,
        file = %file.full_path(),
        records = record_count,
        "manifest generated"
    );
    ctx.files.push(file.clone());
    Ok(GeneratedManifest {
        kind: out.kind,
        file,
        manifest,
    })
}

// ── Member helpers ────────────────────────────────────────────

/// Transition and stamp a member for an outbound stage; `false` (logged)
/// when the member may not take the event.
pub(crate) fn advance(
    ctx: &JobContext<'_>,
    member: &mut GenomicSetMember,
    event: WorkflowEvent,
    stage: Stage,
) -> bool {
    match transition(member.workflow_state, event) {
        Ok(next) => {
            member.stamps.set(stage, ctx.run_id());
            member.set_state(next, ctx.as_of);
            true
        }
        Err(e) => {
            warn!(biobank_id = %member.biobank_id, error = %e, "member not eligible");
            false
        }
    }
}

/// Participant summary behind a member.
pub(crate) async fn participant_of(
    ctx: &JobContext<'_>,
    member: &GenomicSetMember,
) -> Result<Option<ParticipantSummary>, PipelineError> {
    if let Some(id) = &member.participant_id {
        if let Some(summary) = ctx.registry.participant(id).await? {
            return Ok(Some(summary));
        }
    }
    Ok(ctx.registry.participant_by_biobank_id(&member.biobank_id).await?)
}

pub(crate) fn timestamp(value: Option<chrono::DateTime<chrono::Utc>>) -> String {
    value
        .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_default()
}
