//! Partner request manifests: GEM A1/A3 and CVL W1/W3.

use genomic_core::{
    yes_no, GenomeType, ManifestKind, PipelineError, Stage, WorkflowEvent, WorkflowState,
};
use genomic_registry::UnitOfWork;

use super::{advance, participant_of, publish, timestamp, GeneratedManifest, Outbound};
use crate::context::JobContext;
use crate::table::OutboundRow;

/// GemReady array members whose participant still consents to results.
pub(super) async fn gem_a1(ctx: &mut JobContext<'_>) -> Result<Vec<GeneratedManifest>, PipelineError> {
    let mut unit = UnitOfWork::new();
    let mut rows = Vec::new();

    for mut member in ctx
        .registry
        .members_in_states(&[WorkflowState::GemReady], Some(GenomeType::Array))
        .await?
    {
        let Some(participant) = participant_of(ctx, &member).await? else {
            continue;
        };
        if !participant.has_gror() || participant.withdrawn {
            continue;
        }
        let chipwellbarcode = ctx
            .registry
            .metrics_for_member(member.id)
            .await?
            .and_then(|m| m.chipwellbarcode)
            .unwrap_or_default();
        if !advance(ctx, &mut member, WorkflowEvent::GemA1Sent, Stage::GemA1) {
            continue;
        }
        rows.push(
            OutboundRow::new()
                .set("biobank_id", ctx.prefixed(&member.biobank_id))
                .set_opt("sample_id", member.sample_id.as_deref())
                .set("sex_at_birth", member.sex_at_birth.clone())
                .set("consent_for_ror", "Y")
                .set("date_of_consent_for_ror", timestamp(participant.consent_for_genomics_ror_authored))
                .set("chipwellbarcode", chipwellbarcode)
                .set_opt("genome_center", member.gc_site_id.as_deref()),
        );
        unit.put_member(member);
    }

    finish(ctx, unit, ManifestKind::GemA1, rows).await
}

/// Members at GEM whose consent lapsed or who withdrew, plus A3 members
/// who withdrew after their last A3.
pub(super) async fn gem_a3(ctx: &mut JobContext<'_>) -> Result<Vec<GeneratedManifest>, PipelineError> {
    let mut unit = UnitOfWork::new();
    let mut rows = Vec::new();

    for mut member in ctx
        .registry
        .members_in_states(
            &[WorkflowState::A1, WorkflowState::A2, WorkflowState::A3],
            Some(GenomeType::Array),
        )
        .await?
    {
        let Some(participant) = participant_of(ctx, &member).await? else {
            continue;
        };
        let eligible = if member.workflow_state == WorkflowState::A3 {
            participant.withdrawn
                && participant
                    .withdrawal_authored
                    .is_some_and(|at| at > member.workflow_state_modified)
        } else {
            !participant.has_gror() || participant.withdrawn
        };
        if !eligible {
            continue;
        }
        let removed = if participant.withdrawn {
            participant.withdrawal_authored
        } else {
            participant.consent_for_genomics_ror_authored
        };
        if !advance(ctx, &mut member, WorkflowEvent::GemA3Sent, Stage::GemA3) {
            continue;
        }
        // set_state leaves the timestamp alone on A3 -> A3.
        member.workflow_state_modified = ctx.as_of;
        rows.push(
            OutboundRow::new()
                .set("biobank_id", ctx.prefixed(&member.biobank_id))
                .set_opt("sample_id", member.sample_id.as_deref())
                .set("date_of_consent_removal", timestamp(removed)),
        );
        unit.put_member(member);
    }

    finish(ctx, unit, ManifestKind::GemA3, rows).await
}

/// W1 asks the CVL site to validate CvlReady members; W3 sends the W2
/// responses on for extraction.
pub(super) async fn cvl_request(
    ctx: &mut JobContext<'_>,
    kind: ManifestKind,
) -> Result<Vec<GeneratedManifest>, PipelineError> {
    let (source, event, stage, needs_consent) = match kind {
        ManifestKind::CvlW3 => (WorkflowState::W2, WorkflowEvent::CvlW3Sent, Stage::CvlW3, false),
        _ => (WorkflowState::CvlReady, WorkflowEvent::CvlW1Sent, Stage::CvlW1, true),
    };
    let mut unit = UnitOfWork::new();
    let mut rows = Vec::new();

    for mut member in ctx
        .registry
        .members_in_states(&[source], Some(GenomeType::Wgs))
        .await?
    {
        if needs_consent {
            let consenting = participant_of(ctx, &member)
                .await?
                .is_some_and(|p| p.has_gror() && !p.withdrawn);
            if !consenting {
                continue;
            }
        }
        if !advance(ctx, &mut member, event, stage) {
            continue;
        }
        rows.push(
            OutboundRow::new()
                .set("value", ctx.prefixed(&member.biobank_id))
                .set("biobank_id", member.biobank_id.clone())
                .set_opt("sample_id", member.sample_id.as_deref())
                .set("sex_at_birth", member.sex_at_birth.clone())
                .set("genome_type", GenomeType::Cvl.as_str())
                .set("ny_flag", yes_no(member.ny_flag))
                .set("ai_an", yes_no(member.ai_an))
                .set("validation_passed", "Y"),
        );
        unit.put_member(member);
    }

    finish(ctx, unit, kind, rows).await
}

async fn finish(
    ctx: &mut JobContext<'_>,
    unit: UnitOfWork,
    kind: ManifestKind,
    rows: Vec<OutboundRow>,
) -> Result<Vec<GeneratedManifest>, PipelineError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let out = Outbound::standard(ctx, kind, rows);
    Ok(vec![publish(ctx, unit, out).await?])
}
