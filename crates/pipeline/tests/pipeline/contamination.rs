use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use genomic_core::{
    ContaminationCategory, GenomeType, GenomicJobRun, GenomicSampleContamination, GenomicSetMember,
    GrorConsent, JobKind, JobStatus, PipelineConfig,
};
use genomic_pipeline::contamination::categorize;
use genomic_pipeline::JobContext;
use genomic_registry::{MemoryRegistry, Registry, UnitOfWork};
use genomic_storage::StorageGateway;

use crate::helpers::*;

const BIOBANK_ID: &str = "100000001";
const SAMPLE_ID: &str = "TUBE-1";

struct Bench {
    registry: Arc<MemoryRegistry>,
    config: PipelineConfig,
    storage: StorageGateway,
    run: GenomicJobRun,
    member: GenomicSetMember,
}

impl Bench {
    fn new() -> Self {
        let config = PipelineConfig::default();
        let registry = Arc::new(MemoryRegistry::new());
        registry.put_participant(participant(BIOBANK_ID, at(1, 0))).unwrap();
        registry
            .put_stored_sample(stored_sample(BIOBANK_ID, SAMPLE_ID, "1ED04", at(1, 0)))
            .unwrap();
        let storage = StorageGateway::in_memory(config.buckets.all());
        let mut member = GenomicSetMember::new(BIOBANK_ID, GenomeType::Array, at(2, 0));
        member.sample_id = Some(SAMPLE_ID.into());
        Self {
            registry,
            config,
            storage,
            run: job_run(at(4, 0)),
            member,
        }
    }

    fn add_sample(&self, id: &str, test: &str) {
        self.registry
            .put_stored_sample(stored_sample(BIOBANK_ID, id, test, at(1, 0)))
            .unwrap();
    }

    async fn categorize(&self, contamination: f64) -> (ContaminationCategory, UnitOfWork) {
        let ctx = JobContext::new(&self.run, &self.config, self.registry.as_ref(), &self.storage);
        let mut unit = UnitOfWork::new();
        let category = categorize(&ctx, &mut unit, SAMPLE_ID, contamination, &self.member)
            .await
            .unwrap();
        (category, unit)
    }
}

fn job_run(start: DateTime<Utc>) -> GenomicJobRun {
    GenomicJobRun {
        id: Uuid::new_v4(),
        job_kind: JobKind::Aw2Metrics,
        start_time: start,
        end_time: None,
        status: JobStatus::Running,
        result: None,
        message: None,
    }
}

#[tokio::test]
async fn heavy_contamination_without_alternate_is_terminal() {
    let bench = Bench::new();
    let (category, _) = bench.categorize(0.09).await;
    assert_eq!(category, ContaminationCategory::TerminalNoExtract);
}

#[tokio::test]
async fn heavy_contamination_with_clean_alternate_extracts_both() {
    let bench = Bench::new();
    bench.add_sample("SAL-1", "1SAL2");
    let (category, _) = bench.categorize(0.09).await;
    assert_eq!(category, ContaminationCategory::ExtractBoth);
}

#[tokio::test]
async fn alternate_already_in_the_ledger_is_not_used() {
    let bench = Bench::new();
    bench.add_sample("SAL-1", "1SAL2");
    let mut unit = UnitOfWork::new();
    unit.append_contamination(GenomicSampleContamination {
        id: Uuid::new_v4(),
        sample_id: "SAL-1".into(),
        failed_in_job: Uuid::new_v4(),
        created: at(3, 0),
    });
    bench.registry.commit(unit).await.unwrap();

    let (category, _) = bench.categorize(0.09).await;
    assert_eq!(category, ContaminationCategory::TerminalNoExtract);
}

#[tokio::test]
async fn alternate_of_the_same_test_is_not_used() {
    let bench = Bench::new();
    bench.add_sample("TUBE-2", "1ED04");
    let (category, _) = bench.categorize(0.09).await;
    assert_eq!(category, ContaminationCategory::TerminalNoExtract);
}

#[tokio::test]
async fn flagged_band_depends_on_return_of_results_consent() {
    let bench = Bench::new();
    let (category, _) = bench.categorize(0.02).await;
    assert_eq!(category, ContaminationCategory::ExtractWgs);

    let mut withheld = participant(BIOBANK_ID, at(1, 0));
    withheld.consent_for_genomics_ror = GrorConsent::SubmittedNoConsent;
    bench.registry.put_participant(withheld).unwrap();
    let (category, _) = bench.categorize(0.02).await;
    assert_eq!(category, ContaminationCategory::NoExtract);
}

#[tokio::test]
async fn band_edges_are_inclusive_of_the_flagged_band() {
    let bench = Bench::new();
    bench.add_sample("SAL-1", "1SAL2");

    let (category, _) = bench.categorize(0.009_999).await;
    assert_eq!(category, ContaminationCategory::NoExtract);
    let (category, _) = bench.categorize(0.01).await;
    assert_eq!(category, ContaminationCategory::ExtractWgs);
    // an alternate sample only matters above the extract threshold
    let (category, _) = bench.categorize(0.03).await;
    assert_eq!(category, ContaminationCategory::ExtractWgs);
    let (category, _) = bench.categorize(0.030_001).await;
    assert_eq!(category, ContaminationCategory::ExtractBoth);
}

#[tokio::test]
async fn metrics_exactly_at_the_flag_threshold_are_categorized() {
    let h = Harness::new();
    through_aw1(&h).await;
    let mut edge = MetricsRow::passing("100000001", "SMP-1", "CWB-1");
    edge.contamination = "0.01";
    h.put(
        GC_BUCKET,
        &format!("{AW2_ARRAY_FOLDER}/RDR_AoU_GEN_DataManifest_1.csv"),
        aw2_array(&[edge]),
    )
    .await;

    let outcome = h.run(JobKind::Aw2Metrics, at(4, 0)).await;

    let a = h.member("100000001", GenomeType::Array);
    let metrics = h.registry.all_metrics().unwrap();
    let a_metrics = metrics.iter().find(|m| m.member_id == a.id).unwrap();
    assert_eq!(a_metrics.contamination_category, ContaminationCategory::ExtractWgs);
    assert!(h.registry.is_sample_contaminated("SMP-1").await.unwrap());
    assert!(outcome.alerts.is_empty());
}

#[tokio::test]
async fn every_call_stages_a_ledger_row() {
    let bench = Bench::new();
    for contamination in [0.005, 0.02, 0.09] {
        let (_, unit) = bench.categorize(contamination).await;
        assert_eq!(unit.contamination.len(), 1);
        assert_eq!(unit.contamination[0].sample_id, SAMPLE_ID);
        assert_eq!(unit.contamination[0].failed_in_job, bench.run.id);
        assert_eq!(unit.contamination[0].created, at(4, 0));
    }
}

#[tokio::test]
async fn contaminated_metrics_raise_an_escalation_alert() {
    let h = Harness::new();
    through_aw1(&h).await;
    let mut dirty = MetricsRow::passing("100000002", "SMP-2", "CWB-2");
    dirty.contamination = "0.09";
    h.put(
        GC_BUCKET,
        &format!("{AW2_ARRAY_FOLDER}/RDR_AoU_GEN_DataManifest_1.csv"),
        aw2_array(&[MetricsRow::passing("100000001", "SMP-1", "CWB-1"), dirty]),
    )
    .await;

    let outcome = h.run(JobKind::Aw2Metrics, at(4, 0)).await;

    let metrics = h.registry.all_metrics().unwrap();
    let b = h.member("100000002", GenomeType::Array);
    let b_metrics = metrics.iter().find(|m| m.member_id == b.id).unwrap();
    // the collection tube is a different stored sample than the one measured
    assert_eq!(b_metrics.contamination_category, ContaminationCategory::ExtractBoth);
    assert!(h.registry.is_sample_contaminated("SMP-2").await.unwrap());
    assert!(!h.registry.is_sample_contaminated("SMP-1").await.unwrap());

    assert_eq!(outcome.alerts.len(), 1);
    assert_eq!(outcome.alerts[0].kind, "contamination");
    assert_eq!(outcome.alerts[0].groups[0].members[0].biobank_id, "100000002");
}
