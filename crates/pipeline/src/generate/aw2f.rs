//! AW2F contamination feedback to genome centers.
//!
//! Once every row of an outbound new-participant manifest has come back in
//! an AW1 package and every returned member has metrics, each AW1 package
//! gets one feedback file in its genome-center bucket.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};
use uuid::Uuid;

use genomic_core::manifest::file_name_of;
use genomic_core::{
    yes_no, GcValidationMetrics, GenomicSetMember, ManifestKind, MemberId, PipelineError, Stage,
};
use genomic_registry::UnitOfWork;

use super::{participant_of, publish, GeneratedManifest, Outbound};
use crate::context::JobContext;
use crate::table::OutboundRow;

pub(super) async fn generate(ctx: &mut JobContext<'_>) -> Result<Vec<GeneratedManifest>, PipelineError> {
    let mut produced = Vec::new();

    for mut feedback in ctx.registry.feedback_awaiting_aw2f().await? {
        let mut packages: BTreeMap<Uuid, Vec<GenomicSetMember>> = BTreeMap::new();
        for member in ctx.registry.members_for_manifest(feedback.input_manifest_file_id).await? {
            if let Some(aw1) = member.aw1_file_processed_id {
                packages.entry(aw1).or_default().push(member);
            }
        }

        let mut metrics: HashMap<MemberId, GcValidationMetrics> = HashMap::new();
        for member in packages.values().flatten() {
            if let Some(m) = ctx.registry.metrics_for_member(member.id).await? {
                metrics.insert(member.id, m);
            }
        }
        let total: usize = packages.values().map(Vec::len).sum();
        if total == 0 || metrics.len() < total {
            debug!(
                manifest = %feedback.input_manifest_file_id,
                members = total,
                with_metrics = metrics.len(),
                "feedback not ready for AW2F"
            );
            continue;
        }

        // packages sent by an earlier run that stopped before the last one
        let (sent, unsent): (Vec<_>, Vec<_>) = packages
            .into_iter()
            .partition(|(_, members)| members.iter().all(|m| m.stamps.get(Stage::Aw2f).is_some()));
        let mut resolved = Vec::with_capacity(unsent.len());
        for (aw1_id, members) in unsent {
            match ctx.registry.file_processed_by_id(aw1_id).await? {
                Some(aw1) => resolved.push((aw1, members)),
                None => warn!(file_processed_id = %aw1_id, "AW1 package record missing"),
            }
        }
        let Some(last) = resolved.len().checked_sub(1) else {
            let earlier = sent
                .first()
                .and_then(|(_, members)| members.first())
                .and_then(|m| m.stamps.get(Stage::Aw2f));
            if let Some(earlier) = earlier {
                debug!(manifest = %feedback.input_manifest_file_id, "every package already has AW2F");
                feedback.aw2f_job_run_id = Some(earlier);
                let mut unit = UnitOfWork::new();
                unit.put_feedback(feedback);
                ctx.registry.commit(unit).await?;
            }
            continue;
        };
        if !sent.is_empty() {
            debug!(
                manifest = %feedback.input_manifest_file_id,
                skipped = sent.len(),
                "packages already sent by an earlier AW2F run"
            );
        }

        for (index, (aw1, members)) in resolved.into_iter().enumerate() {
            let stem = file_name_of(&aw1.file_name).trim_end_matches(".csv");
            let mut out = Outbound {
                kind: ManifestKind::Aw2f,
                bucket: aw1.bucket_name.clone(),
                file_name: format!("{stem}_contamination_{}.csv", ctx.as_of.format("%Y-%m-%d-%H-%M-%S")),
                manifest_id: Uuid::new_v4(),
                rows: Vec::new(),
            };

            let mut unit = UnitOfWork::new();
            for mut member in members {
                let Some(m) = metrics.get(&member.id) else {
                    continue;
                };
                let gror = participant_of(ctx, &member).await?.is_some_and(|p| p.has_gror());
                let biobank_id = ctx.prefixed(&member.biobank_id);
                let sample_id = member.sample_id.clone().unwrap_or_default();
                out.rows.push(
                    OutboundRow::new()
                        .set_opt("package_id", member.package_id.as_deref())
                        .set("biobankid_sampleid", format!("{biobank_id}_{sample_id}"))
                        .set_opt("box_storageunit_id", member.box_storage_unit_id.as_deref())
                        .set_opt("box_id_plate_id", member.box_id_plate_id.as_deref())
                        .set_opt("well_position", member.well_box_position.as_deref())
                        .set("sample_id", sample_id)
                        .set_opt("collection_tube_id", member.collection_tube_id.as_deref())
                        .set("biobank_id", biobank_id)
                        .set("sex_at_birth", member.sex_at_birth.clone())
                        .set("ny_state_y_n", yes_no(member.ny_flag))
                        .set_opt("sample_type", member.sample_type.as_deref())
                        .set_opt("test_name", member.test_name.as_deref())
                        .set_opt("failure_mode", member.failure_mode.as_deref())
                        .set_opt("failure_mode_desc", member.failure_mode_desc.as_deref())
                        .set_opt("processing_status", m.processing_status.as_deref())
                        .set("contamination", m.contamination.map(|c| c.to_string()).unwrap_or_default())
                        .set("contamination_category", m.contamination_category.as_str())
                        .set("consent_for_ror", yes_no(gror)),
                );
                member.stamps.set(Stage::Aw2f, ctx.run_id());
                member.modified = ctx.as_of;
                unit.put_member(member);
            }

            if index == last {
                feedback.aw2f_job_run_id = Some(ctx.run_id());
                feedback.aw2f_manifest_file_id = Some(out.manifest_id);
                unit.put_feedback(feedback.clone());
            }
            produced.push(publish(ctx, unit, out).await?);
        }
    }

    Ok(produced)
}
