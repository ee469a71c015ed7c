//! AW2 QC metrics.

use tracing::warn;
use uuid::Uuid;

use genomic_core::{
    ContaminationCategory, GcValidationMetrics, GenomicSetMember, PipelineError, QcStatus,
    WorkflowEvent,
};
use genomic_notify::AlertGroup;
use genomic_registry::UnitOfWork;

use super::control::record_control_sample;
use super::{member_by_sample, next_state, row_biobank_id, FileScope, PendingAlert};
use crate::alerts::{member_line, CONTAMINATION};
use crate::contamination::categorize;
use crate::context::JobContext;
use crate::table::{ManifestTable, Row};

pub(crate) async fn apply_metrics(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    scope: &FileScope<'_>,
    table: &ManifestTable,
) -> Result<Option<PendingAlert>, PipelineError> {
    let genome_type = scope.genome_type();
    let mut escalated = Vec::new();

    for row in &table.rows {
        let Some(biobank_id) = row_biobank_id(ctx, scope, row) else {
            continue;
        };
        if ctx.config.thresholds.is_control_biobank_id(&biobank_id) {
            record_control_sample(ctx, unit, scope, row, &biobank_id).await?;
            continue;
        }
        let Some(sample_id) = row.get("sample_id") else {
            warn!(file = %scope.file.file_name, biobank_id = %biobank_id, "metrics row without sample id skipped");
            continue;
        };
        let Some(mut member) = member_by_sample(ctx, unit, &biobank_id, sample_id, genome_type).await? else {
            warn!(file = %scope.file.file_name, biobank_id = %biobank_id, sample_id, "no member for metrics row");
            continue;
        };

        let failed = row
            .get("processing_status")
            .is_some_and(|s| s.eq_ignore_ascii_case("fail"));
        let event = if failed {
            WorkflowEvent::MetricsFailed
        } else {
            WorkflowEvent::MetricsIngested
        };
        let Some(next) = next_state(scope, &member, event) else {
            continue;
        };

        let mut metrics = current_cycle(ctx, unit, &member)
            .await?
            .unwrap_or_else(|| fresh(ctx, scope, &member));
        fill(&mut metrics, row, scope);
        metrics.modified = ctx.as_of;

        if let Some(contamination) = metrics.contamination {
            if contamination >= ctx.config.thresholds.contamination_flag {
                let category = categorize(ctx, unit, sample_id, contamination, &member).await?;
                metrics.contamination_category = category;
                if matches!(
                    category,
                    ContaminationCategory::ExtractBoth | ContaminationCategory::TerminalNoExtract
                ) {
                    let escalation = PipelineError::ContaminationEscalation {
                        sample_id: sample_id.to_string(),
                        category: category.to_string(),
                    };
                    warn!(job_run_id = %ctx.run_id(), error = %escalation, contamination, "escalating");
                    escalated.push(member_line(&member, format!("contamination {contamination}: {category}")));
                }
            }
        }

        member.qc_status = if failed { QcStatus::Fail } else { QcStatus::Pass };
        member.set_state(next, ctx.as_of);
        unit.put_metrics(metrics);
        unit.put_member(member);
    }

    Ok(Some(PendingAlert {
        kind: CONTAMINATION,
        bucket: scope.file.bucket_name.clone(),
        groups: vec![AlertGroup {
            file: scope.file.file_name.clone(),
            members: escalated,
        }],
    }))
}

/// The member's metrics row of the current reconciliation cycle, if any.
async fn current_cycle(
    ctx: &JobContext<'_>,
    unit: &UnitOfWork,
    member: &GenomicSetMember,
) -> Result<Option<GcValidationMetrics>, PipelineError> {
    let staged = unit.metrics.iter().find(|m| m.member_id == member.id).cloned();
    let latest = match staged {
        Some(m) => Some(m),
        None => ctx.registry.metrics_for_member(member.id).await?,
    };
    Ok(latest.filter(|m| m.reconcile_job_run_id.is_none()))
}

fn fresh(ctx: &JobContext<'_>, scope: &FileScope<'_>, member: &GenomicSetMember) -> GcValidationMetrics {
    GcValidationMetrics {
        id: Uuid::new_v4(),
        member_id: member.id,
        genome_type: member.genome_type,
        file_processed_id: scope.file.id,
        lims_id: None,
        chipwellbarcode: None,
        call_rate: None,
        mean_coverage: None,
        genome_coverage: None,
        aouhdr_coverage: None,
        sex_concordance: None,
        sex_ploidy: None,
        aligned_q30_bases: None,
        array_concordance: None,
        contamination: None,
        contamination_category: ContaminationCategory::Unset,
        processing_status: None,
        notes: None,
        site_id: None,
        reconcile_job_run_id: None,
        data_files: Vec::new(),
        created: ctx.as_of,
        modified: ctx.as_of,
    }
}

fn fill(metrics: &mut GcValidationMetrics, row: &Row, scope: &FileScope<'_>) {
    metrics.file_processed_id = scope.file.id;
    metrics.lims_id = row.owned("limsid");
    metrics.chipwellbarcode = row.owned("chipwellbarcode");
    metrics.call_rate = row.owned("call_rate");
    metrics.mean_coverage = row.owned("mean_coverage");
    metrics.genome_coverage = row.owned("genome_coverage");
    metrics.aouhdr_coverage = row.owned("aouhdr_coverage");
    metrics.sex_concordance = row.owned("sex_concordance");
    metrics.sex_ploidy = row.owned("sex_ploidy");
    metrics.aligned_q30_bases = row.owned("aligned_q30_bases");
    metrics.array_concordance = row.owned("array_concordance");
    metrics.contamination = row.get("contamination").and_then(|c| c.parse::<f64>().ok());
    metrics.contamination_category = ContaminationCategory::Unset;
    metrics.processing_status = row.owned("processing_status").map(|s| s.to_ascii_lowercase());
    metrics.notes = row.owned("notes");
    metrics.site_id = scope.parts.site.clone();
}
