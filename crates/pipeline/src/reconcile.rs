//! Reconciliation of AW2 metrics against raw data files in genome-center
//! buckets.
//!
//! A member is complete when every file its genome type requires is present
//! under the raw-data folder of its site's bucket. File names match
//! case-insensitively. Each bucket is listed at most once per run.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, info, warn};

use genomic_core::{
    transition, DataFileKind, DataFileRecord, GcValidationMetrics, GenomeType, GenomicSetMember,
    JobResult, MemberId, PipelineError, Stage, WorkflowEvent, WorkflowState,
};
use genomic_notify::{AlertGroup, AlertMember};
use genomic_registry::UnitOfWork;

use crate::alerts::{member_line, MISSING_DATA};
use crate::context::JobContext;

const ARRAY_RAW_DATA: &str = "Genotyping_sample_raw_data";
const WGS_RAW_DATA: &str = "Wgs_sample_raw_data";

pub fn raw_data_folder(genome_type: GenomeType) -> &'static str {
    match genome_type {
        GenomeType::Array => ARRAY_RAW_DATA,
        GenomeType::Wgs | GenomeType::Cvl => WGS_RAW_DATA,
    }
}

/// Lower-cased file name → `bucket/path`.
type Listing = HashMap<String, String>;

pub async fn reconcile(ctx: &mut JobContext<'_>, genome_type: GenomeType) -> Result<JobResult, PipelineError> {
    let candidates = candidates(ctx, genome_type).await?;
    if candidates.is_empty() {
        info!(job_run_id = %ctx.run_id(), genome_type = %genome_type, "nothing to reconcile");
        return Ok(JobResult::NoFilesFound);
    }

    let mut listings: HashMap<String, Listing> = HashMap::new();
    let mut newly_missing: BTreeMap<String, Vec<AlertMember>> = BTreeMap::new();
    let mut alert_buckets = BTreeSet::new();
    let mut complete = 0usize;
    let mut gaps = 0usize;

    for (mut member, mut metrics) in candidates {
        let Some(site) = member.gc_site_id.clone().or_else(|| metrics.site_id.clone()) else {
            warn!(biobank_id = %member.biobank_id, "member has no genome-center site");
            continue;
        };
        let Some(bucket) = ctx.config.buckets.genome_center(&site).map(str::to_string) else {
            warn!(biobank_id = %member.biobank_id, site = %site, "no bucket configured for site");
            continue;
        };
        let Some(stem) = file_stem(ctx, genome_type, &site, &member, &metrics) else {
            warn!(biobank_id = %member.biobank_id, "not enough metrics to name data files");
            continue;
        };

        if !listings.contains_key(&bucket) {
            let listing = ctx
                .storage
                .list(&bucket, raw_data_folder(genome_type))
                .await?
                .into_iter()
                .map(|o| (o.file_name.to_lowercase(), o.full_path()))
                .collect();
            listings.insert(bucket.clone(), listing);
        }
        let listing = &listings[&bucket];

        let previously_missing = metrics.missing_files();
        metrics.data_files = DataFileKind::expected_for(genome_type)
            .iter()
            .map(|kind| {
                let path = listing.get(&format!("{stem}{}", kind.suffix()).to_lowercase()).cloned();
                DataFileRecord {
                    kind: *kind,
                    received: path.is_some(),
                    path,
                }
            })
            .collect();
        let missing = metrics.missing_files();

        let event = if missing.is_empty() {
            match genome_type {
                GenomeType::Array => WorkflowEvent::ArrayDataReconciled,
                GenomeType::Wgs | GenomeType::Cvl => WorkflowEvent::WgsDataReconciled,
            }
        } else {
            WorkflowEvent::DataMissing
        };
        let next = match transition(member.workflow_state, event) {
            Ok(next) => next,
            Err(e) => {
                warn!(biobank_id = %member.biobank_id, error = %e, "member skipped");
                continue;
            }
        };

        if missing.is_empty() {
            metrics.reconcile_job_run_id = Some(ctx.run_id());
            member.stamps.set(Stage::ReconcileMetrics, ctx.run_id());
            complete += 1;
        } else {
            gaps += 1;
            let names = |kinds: &[DataFileKind]| {
                kinds
                    .iter()
                    .map(|k| format!("{stem}{}", k.suffix()))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let gap = PipelineError::ReconciliationGap {
                member: member.biobank_id.clone(),
                files: names(&missing),
            };
            let fresh: Vec<DataFileKind> = missing
                .iter()
                .copied()
                .filter(|k| !previously_missing.contains(k))
                .collect();
            if fresh.is_empty() {
                debug!(error = %gap, "gap already alerted");
            } else {
                warn!(job_run_id = %ctx.run_id(), error = %gap, "data files missing");
                let aw2_file = ctx
                    .registry
                    .file_processed_by_id(metrics.file_processed_id)
                    .await?
                    .map(|f| f.file_name)
                    .unwrap_or_else(|| metrics.file_processed_id.to_string());
                newly_missing
                    .entry(aw2_file)
                    .or_default()
                    .push(member_line(&member, names(&fresh)));
                alert_buckets.insert(bucket.clone());
            }
        }

        member.set_state(next, ctx.as_of);
        metrics.modified = ctx.as_of;
        let mut unit = UnitOfWork::new();
        unit.put_metrics(metrics);
        unit.put_member(member);
        ctx.registry.commit(unit).await?;
    }

    if !newly_missing.is_empty() {
        let groups = newly_missing
            .into_iter()
            .map(|(file, members)| AlertGroup { file, members })
            .collect();
        let buckets: Vec<String> = alert_buckets.into_iter().collect();
        ctx.raise(MISSING_DATA, buckets.join(", "), groups);
    }

    info!(
        job_run_id = %ctx.run_id(),
        genome_type = %genome_type,
        complete,
        gaps,
        buckets_listed = listings.len(),
        "reconciliation finished"
    );
    Ok(JobResult::Success)
}

/// Members awaiting reconciliation with their latest metrics row: metrics
/// never reconciled whose member sits in AW2, and the AW2_MISSING queue.
async fn candidates(
    ctx: &JobContext<'_>,
    genome_type: GenomeType,
) -> Result<Vec<(GenomicSetMember, GcValidationMetrics)>, PipelineError> {
    let mut order: Vec<MemberId> = Vec::new();
    let mut seen = HashSet::new();
    for metrics in ctx.registry.unreconciled_metrics(genome_type).await? {
        if seen.insert(metrics.member_id) {
            order.push(metrics.member_id);
        }
    }
    for member in ctx
        .registry
        .members_in_states(&[WorkflowState::Aw2Missing], Some(genome_type))
        .await?
    {
        if seen.insert(member.id) {
            order.push(member.id);
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for id in order {
        let Some(member) = ctx.registry.member(id).await? else {
            continue;
        };
        if !matches!(member.workflow_state, WorkflowState::Aw2 | WorkflowState::Aw2Missing) {
            continue;
        }
        let Some(metrics) = ctx.registry.metrics_for_member(id).await? else {
            continue;
        };
        if metrics.reconcile_job_run_id.is_some() {
            continue;
        }
        out.push((member, metrics));
    }
    Ok(out)
}

/// File-name stem shared by every raw data file of a member.
///
/// Arrays use the chip-well barcode; WGS files are named
/// `{site}_{prefix}{biobank_id}_{sample_id}_{lims_id}`.
fn file_stem(
    ctx: &JobContext<'_>,
    genome_type: GenomeType,
    site: &str,
    member: &GenomicSetMember,
    metrics: &GcValidationMetrics,
) -> Option<String> {
    match genome_type {
        GenomeType::Array => metrics.chipwellbarcode.clone(),
        GenomeType::Wgs | GenomeType::Cvl => {
            let sample_id = member.sample_id.as_deref()?;
            let lims_id = metrics.lims_id.as_deref()?;
            Some(format!(
                "{site}_{}_{sample_id}_{lims_id}",
                ctx.prefixed(&member.biobank_id)
            ))
        }
    }
}
