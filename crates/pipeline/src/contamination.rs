//! Contamination categorization for QC metrics.

use uuid::Uuid;

use genomic_core::config::ThresholdConfig;
use genomic_core::{
    ContaminationCategory, GenomicSampleContamination, GenomicSetMember, PipelineError,
};
use genomic_registry::UnitOfWork;

use crate::context::JobContext;

/// Where a contamination value falls relative to the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Clean,
    Flagged,
    Extract,
}

fn band(contamination: f64, thresholds: &ThresholdConfig) -> Band {
    if contamination < thresholds.contamination_flag {
        Band::Clean
    } else if contamination <= thresholds.contamination_extract {
        Band::Flagged
    } else {
        Band::Extract
    }
}

/// Decide what to do with a contaminated sample and append a ledger row for
/// it to `unit`.
///
/// Above the extract threshold the participant's other stored samples are
/// searched for one of a different test type that is neither disposed nor
/// already in the ledger (committed or staged in `unit`).
pub async fn categorize(
    ctx: &JobContext<'_>,
    unit: &mut UnitOfWork,
    sample_id: &str,
    contamination: f64,
    member: &GenomicSetMember,
) -> Result<ContaminationCategory, PipelineError> {
    let category = match band(contamination, &ctx.config.thresholds) {
        Band::Clean => ContaminationCategory::NoExtract,
        Band::Flagged => {
            let gror = ctx
                .registry
                .participant_by_biobank_id(&member.biobank_id)
                .await?
                .is_some_and(|p| p.has_gror());
            if gror {
                ContaminationCategory::ExtractWgs
            } else {
                ContaminationCategory::NoExtract
            }
        }
        Band::Extract => {
            if find_alternate_sample(ctx, unit, sample_id, &member.biobank_id).await?.is_some() {
                ContaminationCategory::ExtractBoth
            } else {
                ContaminationCategory::TerminalNoExtract
            }
        }
    };

    unit.append_contamination(GenomicSampleContamination {
        id: Uuid::new_v4(),
        sample_id: sample_id.to_string(),
        failed_in_job: ctx.run_id(),
        created: ctx.as_of,
    });

    tracing::info!(
        job_run_id = %ctx.run_id(),
        sample_id,
        biobank_id = %member.biobank_id,
        contamination,
        category = %category,
        "sample categorized"
    );
    Ok(category)
}

async fn find_alternate_sample(
    ctx: &JobContext<'_>,
    unit: &UnitOfWork,
    sample_id: &str,
    biobank_id: &str,
) -> Result<Option<String>, PipelineError> {
    let samples = ctx.registry.stored_samples(biobank_id).await?;
    let evaluated_test = samples
        .iter()
        .find(|s| s.biobank_stored_sample_id == sample_id)
        .map(|s| s.test.clone());

    for sample in samples.iter().filter(|s| {
        s.is_available()
            && s.biobank_stored_sample_id != sample_id
            && evaluated_test.as_deref() != Some(s.test.as_str())
    }) {
        let id = sample.biobank_stored_sample_id.as_str();
        if unit.stages_contamination(id) || ctx.registry.is_sample_contaminated(id).await? {
            continue;
        }
        return Ok(Some(id.to_string()));
    }
    Ok(None)
}
