//! Partner responses: GEM A2, CVL W2 and DRC AW4.

use tracing::warn;

use genomic_core::{
    parse_yes_no, GenomeType, GenomicSetMember, PipelineError, QcStatus, Stage, WorkflowEvent,
};
use genomic_registry::UnitOfWork;

use super::{member_by_sample, next_state, row_biobank_id, FileScope, PendingAlert};
use crate::context::JobContext;
use crate::table::{ManifestTable, Row};

/// Member named by a response row, keyed by biobank id + sample id.
async fn row_member(
    ctx: &JobContext<'_>,
    unit: &UnitOfWork,
    scope: &FileScope<'_>,
    row: &Row,
    genome_type: GenomeType,
) -> Result<Option<GenomicSetMember>, PipelineError> {
    let Some(biobank_id) = row_biobank_id(ctx, scope, row) else {
        return Ok(None);
    };
    let Some(sample_id) = row.get("sample_id") else {
        warn!(file = %scope.file.file_name, biobank_id = %biobank_id, "row without sample id skipped");
        return Ok(None);
    };
    let member = member_by_sample(ctx, unit, &biobank_id, sample_id, genome_type).await?;
    if member.is_none() {
        warn!(file = %scope.file.file_name, biobank_id = %biobank_id, sample_id, "no member for row");
    }
    Ok(member)
}

pub(crate) async fn apply_gem_a2(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    scope: &FileScope<'_>,
    table: &ManifestTable,
) -> Result<Option<PendingAlert>, PipelineError> {
    for row in &table.rows {
        let Some(mut member) = row_member(ctx, unit, scope, row, GenomeType::Array).await? else {
            continue;
        };
        let Some(passed) = row.get("success").and_then(parse_yes_no) else {
            warn!(file = %scope.file.file_name, biobank_id = %member.biobank_id, "unreadable success flag");
            continue;
        };
        let event = if passed {
            WorkflowEvent::GemA2Accepted
        } else {
            WorkflowEvent::GemA2Rejected
        };
        let Some(next) = next_state(scope, &member, event) else {
            continue;
        };
        member.gem_pass = Some(passed);
        member.stamps.set(Stage::GemA2, ctx.run_id());
        member.set_state(next, ctx.as_of);
        unit.put_member(member);
    }
    Ok(None)
}

pub(crate) async fn apply_cvl_w2(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    scope: &FileScope<'_>,
    table: &ManifestTable,
) -> Result<Option<PendingAlert>, PipelineError> {
    for row in &table.rows {
        let Some(mut member) = row_member(ctx, unit, scope, row, GenomeType::Wgs).await? else {
            continue;
        };
        let Some(next) = next_state(scope, &member, WorkflowEvent::CvlW2Ingested) else {
            continue;
        };
        member.stamps.set(Stage::CvlW2, ctx.run_id());
        member.set_state(next, ctx.as_of);
        unit.put_member(member);
    }
    Ok(None)
}

pub(crate) async fn apply_aw4(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    scope: &FileScope<'_>,
    table: &ManifestTable,
) -> Result<Option<PendingAlert>, PipelineError> {
    let genome_type = scope.genome_type();
    for row in &table.rows {
        let Some(mut member) = row_member(ctx, unit, scope, row, genome_type).await? else {
            continue;
        };
        let Some(next) = next_state(scope, &member, WorkflowEvent::Aw4Ingested) else {
            continue;
        };
        match row.get("qc_status").map(str::to_ascii_uppercase).as_deref() {
            Some("PASS") => member.qc_status = QcStatus::Pass,
            Some("FAIL") => member.qc_status = QcStatus::Fail,
            Some(other) => warn!(file = %scope.file.file_name, qc_status = other, "unknown qc status ignored"),
            None => {}
        }
        if let Some(path) = row.owned("fingerprint_path") {
            member.drc_fingerprint_path = Some(path);
        }
        member.stamps.set(Stage::Aw4, ctx.run_id());
        member.set_state(next, ctx.as_of);
        unit.put_member(member);
    }
    Ok(None)
}
