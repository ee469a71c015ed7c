use tracing::{info, warn};
use uuid::Uuid;

use genomic_core::{
    map_sex_at_birth, yes_no, GenomeType, GenomicManifestFeedback, GenomicSet, GenomicSetMember,
    JobKind, ManifestKind, ParticipantSummary, PipelineError, SetStatus,
};
use genomic_registry::UnitOfWork;

use super::{publish, GeneratedManifest, Outbound};
use crate::context::JobContext;
use crate::table::OutboundRow;

/// Name shared by every versioned new-participant set.
pub const SET_NAME: &str = "new_participant_workflow";

/// Genome lanes every new participant is enrolled in.
const LANES: [GenomeType; 2] = [GenomeType::Array, GenomeType::Wgs];

pub(super) async fn generate(ctx: &mut JobContext<'_>) -> Result<Vec<GeneratedManifest>, PipelineError> {
    let since = ctx
        .registry
        .last_successful_run(JobKind::NewParticipantWorkflow)
        .await?
        .map(|run| run.start_time);

    let mut eligible = Vec::new();
    for participant in ctx.registry.participants_modified_since(since).await? {
        if !participant.consent_for_study_enrollment || !participant.dna_sample_received || participant.withdrawn {
            continue;
        }
        if !ctx.registry.members_by_biobank_id(&participant.biobank_id).await?.is_empty() {
            continue;
        }
        match earliest_sample(ctx, &participant).await? {
            Some(tube) => eligible.push((participant, tube)),
            None => warn!(
                biobank_id = %participant.biobank_id,
                "participant has no confirmed stored sample; skipped"
            ),
        }
    }
    if eligible.is_empty() {
        return Ok(Vec::new());
    }

    let version = ctx.registry.max_set_version(SET_NAME).await?.unwrap_or(0) + 1;
    let mut out = Outbound::standard(ctx, ManifestKind::NewParticipant, Vec::new());
    let set = GenomicSet {
        id: Uuid::new_v4(),
        name: SET_NAME.to_string(),
        version,
        status: SetStatus::Created,
        file_path: Some(format!("{}/{}", out.bucket, out.path())),
        created: ctx.as_of,
    };

    let mut unit = UnitOfWork::new();
    for (participant, tube) in &eligible {
        let (sex, flagged) = map_sex_at_birth(participant.sex_at_birth.as_deref());
        for genome_type in LANES {
            let mut member = GenomicSetMember::new(participant.biobank_id.clone(), genome_type, ctx.as_of);
            member.genomic_set_id = Some(set.id);
            member.participant_id = Some(participant.participant_id.clone());
            member.collection_tube_id = Some(tube.clone());
            member.sex_at_birth = sex.to_string();
            member.sex_at_birth_flagged = flagged;
            member.ai_an = participant.ai_an;
            member.ny_flag = participant.is_new_york();
            member.manifest_file_id = Some(out.manifest_id);

            out.rows.push(
                OutboundRow::new()
                    .set("value", ctx.prefixed(&member.biobank_id))
                    .set("biobank_id", member.biobank_id.clone())
                    .set("collection_tubeid", tube.clone())
                    .set("sex_at_birth", sex)
                    .set("genome_type", genome_type.as_str())
                    .set("ny_flag", yes_no(member.ny_flag))
                    .set("ai_an", yes_no(member.ai_an))
                    .set("validation_passed", "Y"),
            );
            unit.put_member(member);
        }
    }

    unit.put_feedback(GenomicManifestFeedback {
        id: Uuid::new_v4(),
        input_manifest_file_id: out.manifest_id,
        feedback_manifest_file_id: None,
        feedback_record_count: 0,
        feedback_complete: false,
        feedback_complete_date: None,
        aw2f_job_run_id: None,
        aw2f_manifest_file_id: None,
    });
    info!(
        job_run_id = %ctx.run_id(),
        set = SET_NAME,
        version,
        participants = eligible.len(),
        "new genomic set created"
    );
    unit.put_set(set);

    Ok(vec![publish(ctx, unit, out).await?])
}

/// Collection tube of the participant's earliest confirmed, non-disposed
/// stored sample.
async fn earliest_sample(
    ctx: &JobContext<'_>,
    participant: &ParticipantSummary,
) -> Result<Option<String>, PipelineError> {
    Ok(ctx
        .registry
        .stored_samples(&participant.biobank_id)
        .await?
        .into_iter()
        .filter(|s| s.is_available())
        .filter_map(|s| s.confirmed.map(|at| (at, s.biobank_stored_sample_id)))
        .min_by_key(|(at, _)| *at)
        .map(|(_, id)| id))
}
