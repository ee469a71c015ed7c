use tracing::warn;

use genomic_core::{
    DataFileKind, GcValidationMetrics, GenomeType, ManifestKind, PipelineError, QcStatus, Stage,
    WorkflowEvent, WorkflowState,
};
use genomic_registry::UnitOfWork;

use super::{advance, participant_of, publish, GeneratedManifest, Outbound};
use crate::context::JobContext;
use crate::table::OutboundRow;

/// Lane states past reconciliation, per genome type.
fn released_states(genome_type: GenomeType) -> &'static [WorkflowState] {
    match genome_type {
        GenomeType::Array => &[WorkflowState::GemReady, WorkflowState::A1, WorkflowState::A2],
        GenomeType::Wgs | GenomeType::Cvl => &[
            WorkflowState::CvlReady,
            WorkflowState::W1,
            WorkflowState::W2,
            WorkflowState::W3,
            WorkflowState::Aw1c,
        ],
    }
}

fn data_path(metrics: &GcValidationMetrics, kind: DataFileKind) -> Option<&str> {
    metrics
        .data_files
        .iter()
        .find(|f| f.kind == kind)
        .and_then(|f| f.path.as_deref())
}

pub(super) async fn generate(
    ctx: &mut JobContext<'_>,
    genome_type: GenomeType,
) -> Result<Vec<GeneratedManifest>, PipelineError> {
    let kind = match genome_type {
        GenomeType::Array => ManifestKind::Aw3Array,
        GenomeType::Wgs | GenomeType::Cvl => ManifestKind::Aw3Wgs,
    };
    let mut unit = UnitOfWork::new();
    let mut rows = Vec::new();

    for mut member in ctx
        .registry
        .members_in_states(released_states(genome_type), Some(genome_type))
        .await?
    {
        if member.qc_status == QcStatus::Fail || member.stamps.get(Stage::Aw3).is_some() {
            continue;
        }
        let Some(metrics) = ctx.registry.metrics_for_member(member.id).await? else {
            warn!(biobank_id = %member.biobank_id, "released member without metrics");
            continue;
        };
        let research_id = participant_of(ctx, &member)
            .await?
            .map(|p| p.participant_id)
            .or_else(|| member.participant_id.clone());

        let biobank_id = ctx.prefixed(&member.biobank_id);
        let contamination = metrics.contamination.map(|c| c.to_string());
        let row = OutboundRow::new()
            .set("biobank_id", biobank_id.clone())
            .set_opt("sample_id", member.sample_id.as_deref())
            .set("sex_at_birth", member.sex_at_birth.clone())
            .set_opt("site_id", member.gc_site_id.as_deref())
            .set_opt("contamination", contamination.as_deref())
            .set_opt("sex_concordance", metrics.sex_concordance.as_deref())
            .set_opt("processing_status", metrics.processing_status.as_deref())
            .set_opt("research_id", research_id.as_deref());
        let row = match genome_type {
            GenomeType::Array => row
                .set_opt("chipwellbarcode", metrics.chipwellbarcode.as_deref())
                .set_opt("red_idat_path", data_path(&metrics, DataFileKind::IdatRed))
                .set_opt("red_idat_md5_path", data_path(&metrics, DataFileKind::IdatRedMd5))
                .set_opt("green_idat_path", data_path(&metrics, DataFileKind::IdatGreen))
                .set_opt("green_idat_md5_path", data_path(&metrics, DataFileKind::IdatGreenMd5))
                .set_opt("vcf_path", data_path(&metrics, DataFileKind::Vcf))
                .set_opt("vcf_index_path", data_path(&metrics, DataFileKind::VcfTbi))
                .set_opt("vcf_md5_path", data_path(&metrics, DataFileKind::VcfMd5))
                .set_opt("callrate", metrics.call_rate.as_deref()),
            GenomeType::Wgs | GenomeType::Cvl => row
                .set(
                    "biobankidsampleid",
                    format!("{biobank_id}_{}", member.sample_id.as_deref().unwrap_or_default()),
                )
                .set_opt("vcf_hf_path", data_path(&metrics, DataFileKind::HfVcf))
                .set_opt("vcf_hf_index_path", data_path(&metrics, DataFileKind::HfVcfTbi))
                .set_opt("vcf_hf_md5_path", data_path(&metrics, DataFileKind::HfVcfMd5))
                .set_opt("vcf_raw_path", data_path(&metrics, DataFileKind::Vcf))
                .set_opt("vcf_raw_index_path", data_path(&metrics, DataFileKind::VcfTbi))
                .set_opt("vcf_raw_md5_path", data_path(&metrics, DataFileKind::VcfMd5))
                .set_opt("cram_path", data_path(&metrics, DataFileKind::Cram))
                .set_opt("cram_md5_path", data_path(&metrics, DataFileKind::CramMd5))
                .set_opt("crai_path", data_path(&metrics, DataFileKind::Crai))
                .set_opt("mean_coverage", metrics.mean_coverage.as_deref()),
        };

        if !advance(ctx, &mut member, WorkflowEvent::Aw3Sent, Stage::Aw3) {
            continue;
        }
        rows.push(row);
        unit.put_member(member);
    }

    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let out = Outbound::standard(ctx, kind, rows);
    Ok(vec![publish(ctx, unit, out).await?])
}
