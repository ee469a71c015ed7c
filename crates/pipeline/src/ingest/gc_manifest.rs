//! Genome-center sample manifests (AW1, AW1C) and their failure variants
//! (AW1F, AW1CF).

use tracing::{debug, info, warn};
use uuid::Uuid;

use genomic_core::{
    GenomicManifestFeedback, GenomicManifestFile, GenomicSampleContamination, ManifestKind,
    PipelineError, Stage, WorkflowEvent,
};
use genomic_notify::AlertGroup;
use genomic_registry::UnitOfWork;

use super::control::record_control_sample;
use super::{next_state, resolve_member, row_biobank_id, FileScope, PendingAlert};
use crate::alerts::{member_line, FAILURE_MANIFEST};
use crate::context::JobContext;
use crate::table::ManifestTable;

pub(crate) async fn apply_gc_manifest(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    scope: &FileScope<'_>,
    table: &ManifestTable,
) -> Result<Option<PendingAlert>, PipelineError> {
    let cvl = scope.kind == ManifestKind::Aw1c;
    let genome_type = scope.genome_type();
    let package = if cvl {
        None
    } else {
        Some(record_package(ctx, unit, scope, table.rows.len()).await?)
    };

    for row in &table.rows {
        let Some(biobank_id) = row_biobank_id(ctx, scope, row) else {
            continue;
        };
        if ctx.config.thresholds.is_control_biobank_id(&biobank_id) {
            record_control_sample(ctx, unit, scope, row, &biobank_id).await?;
            continue;
        }

        if let Some(test_name) = row.get("test_name") {
            let agrees = test_name.eq_ignore_ascii_case(genome_type.as_str())
                || (cvl && test_name.eq_ignore_ascii_case("aou_cvl"));
            if !agrees {
                warn!(
                    file = %scope.file.file_name,
                    biobank_id = %biobank_id,
                    test_name,
                    genome_type = %genome_type,
                    "test name disagrees with genome type; row rejected"
                );
                continue;
            }
        }

        let sample_id = row.get("sample_id");
        let tube_id = row.get("collection_tube_id");
        let Some(mut member) = resolve_member(ctx, unit, &biobank_id, genome_type, tube_id, sample_id).await? else {
            warn!(file = %scope.file.file_name, biobank_id = %biobank_id, "no member for row");
            continue;
        };

        let event = if cvl {
            WorkflowEvent::CvlAw1cIngested
        } else if row.get("failure_mode").is_some() {
            WorkflowEvent::GcFailureReported
        } else {
            WorkflowEvent::GcManifestIngested
        };
        let Some(next) = next_state(scope, &member, event) else {
            continue;
        };

        supersede(ctx, unit, member.sample_id.as_deref(), sample_id);
        supersede(ctx, unit, member.collection_tube_id.as_deref(), tube_id);

        let first_sighting = member.aw1_file_processed_id != Some(scope.file.id);
        if let Some(sample_id) = sample_id {
            member.sample_id = Some(sample_id.to_string());
        }
        if let Some(tube_id) = tube_id {
            member.collection_tube_id = Some(tube_id.to_string());
        }
        if let Some(site) = &scope.parts.site {
            member.gc_site_id = Some(site.clone());
        }
        member.package_id = row.owned("package_id");
        member.box_storage_unit_id = row.owned("box_storageunit_id");
        member.box_id_plate_id = row.owned("box_id_plate_id");
        member.well_box_position = row.owned("well_position");
        member.sample_type = row.owned("sample_type");
        member.test_name = row.owned("test_name");
        member.failure_mode = row.owned("failure_mode");
        member.failure_mode_desc = row.owned("failure_mode_desc");

        if cvl {
            member.stamps.set(Stage::CvlAw1c, ctx.run_id());
        } else {
            member.stamps.set(Stage::GcManifest, ctx.run_id());
            member.aw1_file_processed_id = Some(scope.file.id);
        }
        member.set_state(next, ctx.as_of);

        if let (true, Some(package), Some(input)) = (first_sighting, &package, member.manifest_file_id) {
            count_feedback(ctx, unit, input, package.id).await?;
        }
        unit.put_member(member);
    }

    Ok(None)
}

pub(crate) async fn apply_failure_manifest(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    scope: &FileScope<'_>,
    table: &ManifestTable,
) -> Result<Option<PendingAlert>, PipelineError> {
    let (event, stage) = match scope.kind {
        ManifestKind::Aw1cf => (WorkflowEvent::CvlFailureManifestIngested, Stage::CvlAw1cf),
        _ => (WorkflowEvent::FailureManifestIngested, Stage::Aw1f),
    };
    let mut failed = Vec::new();

    for row in &table.rows {
        let Some(biobank_id) = row_biobank_id(ctx, scope, row) else {
            continue;
        };
        if ctx.config.thresholds.is_control_biobank_id(&biobank_id) {
            debug!(file = %scope.file.file_name, biobank_id = %biobank_id, "control row in failure manifest ignored");
            continue;
        }
        let Some(mode) = row.get("failure_mode") else {
            continue;
        };

        let sample_id = row.get("sample_id");
        let tube_id = row.get("collection_tube_id");
        let Some(mut member) =
            resolve_member(ctx, unit, &biobank_id, scope.genome_type(), tube_id, sample_id).await?
        else {
            warn!(file = %scope.file.file_name, biobank_id = %biobank_id, "no member for failure row");
            continue;
        };
        let Some(next) = next_state(scope, &member, event) else {
            continue;
        };

        let desc = row.owned("failure_mode_desc");
        member.failure_mode = Some(mode.to_string());
        member.failure_mode_desc = desc.clone();
        member.stamps.set(stage, ctx.run_id());
        member.set_state(next, ctx.as_of);

        let detail = match &desc {
            Some(desc) => format!("{mode}: {desc}"),
            None => mode.to_string(),
        };
        failed.push(member_line(&member, detail));
        unit.put_member(member);
    }

    Ok(Some(PendingAlert {
        kind: FAILURE_MANIFEST,
        bucket: scope.file.bucket_name.clone(),
        groups: vec![AlertGroup {
            file: scope.file.file_name.clone(),
            members: failed,
        }],
    }))
}

/// Ledger entry for an id a genome center replaced.
fn supersede(ctx: &JobContext<'_>, unit: &mut UnitOfWork, stored: Option<&str>, incoming: Option<&str>) {
    let (Some(old), Some(new)) = (stored, incoming) else {
        return;
    };
    if old == new {
        return;
    }
    info!(job_run_id = %ctx.run_id(), old, new, "superseded id written to contamination ledger");
    unit.append_contamination(GenomicSampleContamination {
        id: Uuid::new_v4(),
        sample_id: old.to_string(),
        failed_in_job: ctx.run_id(),
        created: ctx.as_of,
    });
}

/// Record the AW1 package itself as a manifest file, reusing the row on
/// re-ingestion.
async fn record_package(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    scope: &FileScope<'_>,
    rows: usize,
) -> Result<GenomicManifestFile, PipelineError> {
    let file = scope.file;
    let existing = ctx
        .registry
        .manifest_file_by_path(&file.bucket_name, &file.file_path)
        .await?;
    let manifest = GenomicManifestFile {
        id: existing.as_ref().map(|m| m.id).unwrap_or_else(Uuid::new_v4),
        manifest_kind: scope.kind,
        bucket_name: file.bucket_name.clone(),
        file_path: file.file_path.clone(),
        file_name: file.file_name.clone(),
        record_count: rows as i64,
        upload_date: file.upload_date,
        created: existing.map(|m| m.created).unwrap_or(ctx.as_of),
    };
    unit.put_manifest(manifest.clone());
    Ok(manifest)
}

/// Count one returned row against the outbound manifest that listed it.
async fn count_feedback(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    input_manifest_file_id: Uuid,
    package_id: Uuid,
) -> Result<(), PipelineError> {
    let current = match unit.feedback_for(input_manifest_file_id).cloned() {
        Some(feedback) => Some(feedback),
        None => ctx.registry.feedback_for_manifest(input_manifest_file_id).await?,
    };
    let mut feedback = current.unwrap_or_else(|| GenomicManifestFeedback {
        id: Uuid::new_v4(),
        input_manifest_file_id,
        feedback_manifest_file_id: None,
        feedback_record_count: 0,
        feedback_complete: false,
        feedback_complete_date: None,
        aw2f_job_run_id: None,
        aw2f_manifest_file_id: None,
    });

    feedback.feedback_record_count += 1;
    feedback.feedback_manifest_file_id = Some(package_id);
    if !feedback.feedback_complete {
        let expected = ctx
            .registry
            .manifest_file(input_manifest_file_id)
            .await?
            .map(|m| m.record_count)
            .unwrap_or(0);
        if feedback.feedback_record_count >= expected {
            feedback.feedback_complete = true;
            feedback.feedback_complete_date = Some(ctx.as_of);
            info!(
                job_run_id = %ctx.run_id(),
                manifest = %input_manifest_file_id,
                records = feedback.feedback_record_count,
                "manifest feedback complete"
            );
        }
    }
    unit.put_feedback(feedback);
    Ok(())
}
