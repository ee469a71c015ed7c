use genomic_core::{
    DataFileKind, FileStatus, GenomeType, JobKind, JobResult, Stage, WorkflowState,
};
use genomic_pipeline::JobParams;
use genomic_registry::Registry;

use crate::helpers::*;

const PACKAGE: &str = "AW1_genotyping_sample_manifests/RDR_AoU_GEN_PKG-2101-123456.csv";

#[tokio::test]
async fn aw1_moves_array_members_to_aw1() {
    let h = Harness::new();
    two_new_participants(&h).await;
    h.put(
        GC_BUCKET,
        PACKAGE,
        gc_manifest(&[
            GcRow::array("100000001", "TUBE-1", "SMP-1"),
            GcRow::array("100000002", "TUBE-2", "SMP-2"),
        ]),
    )
    .await;

    let outcome = h.run(JobKind::Aw1Manifest, at(3, 0)).await;

    assert_eq!(outcome.result(), JobResult::Success);
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.files[0].record_count, 2);
    assert_eq!(outcome.files[0].status, FileStatus::Processed);

    let member = h.member("100000001", GenomeType::Array);
    assert_eq!(member.workflow_state, WorkflowState::Aw1);
    assert_eq!(member.sample_id.as_deref(), Some("SMP-1"));
    assert_eq!(member.gc_site_id.as_deref(), Some("rdr"));
    assert_eq!(member.package_id.as_deref(), Some("PKG-2101-123456"));
    assert_eq!(member.stamps.get(Stage::GcManifest), Some(outcome.job_run.id));
    assert_eq!(member.workflow_state_modified, at(3, 0));

    // the WGS lane is untouched by a GEN package
    assert_eq!(h.member("100000001", GenomeType::Wgs).workflow_state, WorkflowState::Aw0);
}

#[tokio::test]
async fn reingesting_the_same_aw1_is_idempotent() {
    let h = Harness::new();
    through_aw1(&h).await;
    let members_before = h.members().len();
    let files_before = h.registry.all_files().unwrap().len();

    let again = h
        .controller
        .run(JobKind::Aw1Manifest, JobParams::at(at(3, 6)).with_target(GC_BUCKET, PACKAGE))
        .await
        .unwrap();

    assert_eq!(again.result(), JobResult::Success);
    assert_eq!(h.members().len(), members_before);
    assert_eq!(h.registry.all_files().unwrap().len(), files_before);

    // the feedback count saw each member once
    let manifest_id = h.member("100000001", GenomeType::Array).manifest_file_id.unwrap();
    let feedback = h.registry.feedback_for_manifest(manifest_id).await.unwrap().unwrap();
    assert_eq!(feedback.feedback_record_count, 2);
    assert!(!feedback.feedback_complete);

    // a scheduled run skips files already processed
    let scheduled = h.run(JobKind::Aw1Manifest, at(3, 12)).await;
    assert_eq!(scheduled.result(), JobResult::NoFilesFound);
}

#[tokio::test]
async fn changed_tube_id_flags_the_previous_tube() {
    let h = Harness::new();
    through_aw1(&h).await;
    h.put(
        GC_BUCKET,
        "AW1_genotyping_sample_manifests/RDR_AoU_GEN_PKG-2101-123457.csv",
        gc_manifest(&[GcRow::array("100000001", "TUBE-1B", "SMP-1")]),
    )
    .await;

    h.run(JobKind::Aw1Manifest, at(3, 6)).await;

    let ledger = h.registry.all_contamination().unwrap();
    assert!(ledger.iter().any(|c| c.sample_id == "TUBE-1"));
    assert!(!ledger.iter().any(|c| c.sample_id == "TUBE-2"));
    let member = h.member("100000001", GenomeType::Array);
    assert_eq!(member.collection_tube_id.as_deref(), Some("TUBE-1B"));
    assert!(h.registry.is_sample_contaminated("TUBE-1").await.unwrap());
}

#[tokio::test]
async fn invalid_files_are_recorded_and_the_batch_continues() {
    let h = Harness::new();
    two_new_participants(&h).await;
    h.put(GC_BUCKET, "AW1_genotyping_sample_manifests/rdr_manifest.csv", "junk").await;
    h.put(
        GC_BUCKET,
        "AW1_genotyping_sample_manifests/RDR_AoU_GEN_PKG-2101-000001.csv",
        "Biobank Id,Sample Id\nT100000002,SMP-2\n",
    )
    .await;
    h.put(
        GC_BUCKET,
        PACKAGE,
        gc_manifest(&[GcRow::array("100000001", "TUBE-1", "SMP-1")]),
    )
    .await;

    let outcome = h.run(JobKind::Aw1Manifest, at(3, 0)).await;

    assert_eq!(outcome.files.len(), 3);
    assert_eq!(outcome.result(), JobResult::InvalidFileStructure);
    let result_of = |name: &str| {
        outcome
            .files
            .iter()
            .find(|f| f.file_name == name)
            .map(|f| f.file_result)
            .unwrap()
    };
    assert_eq!(result_of("rdr_manifest.csv"), JobResult::InvalidFileName);
    assert_eq!(result_of("RDR_AoU_GEN_PKG-2101-000001.csv"), JobResult::InvalidFileStructure);
    assert_eq!(result_of("RDR_AoU_GEN_PKG-2101-123456.csv"), JobResult::Success);

    assert_eq!(h.member("100000001", GenomeType::Array).workflow_state, WorkflowState::Aw1);
    assert_eq!(h.member("100000002", GenomeType::Array).workflow_state, WorkflowState::Aw0);
}

#[tokio::test]
async fn empty_manifest_is_a_successful_ingestion() {
    let h = Harness::new();
    h.put(GC_BUCKET, PACKAGE, gc_manifest(&[])).await;

    let outcome = h.run(JobKind::Aw1Manifest, at(3, 0)).await;

    assert_eq!(outcome.result(), JobResult::Success);
    assert_eq!(outcome.files[0].record_count, 0);
    assert!(h.members().is_empty());
}

#[tokio::test]
async fn rows_for_the_wrong_assay_are_rejected() {
    let h = Harness::new();
    two_new_participants(&h).await;
    let mut row = GcRow::array("100000001", "TUBE-1", "SMP-1");
    row.test_name = "aou_wgs";
    h.put(GC_BUCKET, PACKAGE, gc_manifest(&[row])).await;

    h.run(JobKind::Aw1Manifest, at(3, 0)).await;

    assert_eq!(h.member("100000001", GenomeType::Array).workflow_state, WorkflowState::Aw0);
}

#[tokio::test]
async fn control_samples_are_kept_apart_from_participants() {
    let h = Harness::new();
    two_new_participants(&h).await;
    h.put(
        GC_BUCKET,
        PACKAGE,
        gc_manifest(&[
            GcRow::array("100000001", "TUBE-1", "SMP-1"),
            GcRow::array("1234", "CTRL-TUBE", "CTRL-1"),
        ]),
    )
    .await;

    h.run(JobKind::Aw1Manifest, at(3, 0)).await;

    let controls: Vec<_> = h
        .members()
        .into_iter()
        .filter(|m| m.workflow_state == WorkflowState::ControlSample)
        .collect();
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].biobank_id, "1234");
    assert_eq!(controls[0].sample_id.as_deref(), Some("CTRL-1"));
    assert_eq!(controls[0].gc_site_id.as_deref(), Some("rdr"));

    // the control row never counts toward manifest feedback
    let manifest_id = h.member("100000001", GenomeType::Array).manifest_file_id.unwrap();
    let feedback = h.registry.feedback_for_manifest(manifest_id).await.unwrap().unwrap();
    assert_eq!(feedback.feedback_record_count, 1);
}

#[tokio::test]
async fn failure_manifest_moves_members_back_and_alerts() {
    let h = Harness::new();
    through_aw1(&h).await;
    h.put(
        GC_BUCKET,
        &format!("{AW1F_ARRAY_FOLDER}/RDR_AoU_GEN_PKG-2101-123456_FAILURE.csv"),
        gc_manifest(&[GcRow::array("100000002", "TUBE-2", "SMP-2").failed("damaged")]),
    )
    .await;

    let outcome = h.run(JobKind::Aw1fManifest, at(3, 6)).await;

    let member = h.member("100000002", GenomeType::Array);
    assert_eq!(member.workflow_state, WorkflowState::Aw1fPost);
    assert_eq!(member.failure_mode.as_deref(), Some("damaged"));
    assert_eq!(member.stamps.get(Stage::Aw1f), Some(outcome.job_run.id));
    assert_eq!(h.member("100000001", GenomeType::Array).workflow_state, WorkflowState::Aw1);

    assert_eq!(outcome.alerts.len(), 1);
    assert_eq!(outcome.alerts[0].kind, "failure_manifest");
    assert_eq!(outcome.alerts[0].groups[0].members[0].biobank_id, "100000002");
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("damaged: sample damaged in transit"));
}

#[tokio::test]
async fn targeted_ingest_of_a_missing_object_fails_the_run() {
    let h = Harness::new();
    let err = h
        .controller
        .run(
            JobKind::Aw1Manifest,
            JobParams::at(at(3, 0)).with_target(GC_BUCKET, "AW1_genotyping_sample_manifests/none.csv"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, genomic_core::PipelineError::Dependency(_)));
    let runs = h.registry.job_runs(JobKind::Aw1Manifest).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].result, Some(JobResult::Error));
    assert!(runs[0].message.as_deref().unwrap().contains("none.csv"));
}

#[tokio::test]
async fn corrected_metrics_reach_a_member_parked_for_missing_data() {
    let h = Harness::new();
    through_metrics(&h).await;
    h.deliver_array_files("CWB-1", &[]).await;
    h.deliver_array_files("CWB-2", &[DataFileKind::IdatGreenMd5]).await;
    h.run(JobKind::ReconcileArray, at(5, 0)).await;
    assert_eq!(h.member("100000002", GenomeType::Array).workflow_state, WorkflowState::Aw2Missing);

    let mut corrected = MetricsRow::passing("100000002", "SMP-2", "CWB-2");
    corrected.contamination = "0.005";
    h.put(
        GC_BUCKET,
        &format!("{AW2_ARRAY_FOLDER}/RDR_AoU_GEN_DataManifest_2.csv"),
        aw2_array(&[corrected]),
    )
    .await;
    let outcome = h.run(JobKind::Aw2Metrics, at(6, 0)).await;

    assert_eq!(outcome.result(), JobResult::Success);
    let b = h.member("100000002", GenomeType::Array);
    assert_eq!(b.workflow_state, WorkflowState::Aw2);
    let metrics: Vec<_> = h
        .registry
        .all_metrics()
        .unwrap()
        .into_iter()
        .filter(|m| m.member_id == b.id)
        .collect();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].contamination, Some(0.005));
    assert_eq!(metrics[0].file_processed_id, outcome.files[0].id);

    // the known gap is not alerted again; the late file completes the member
    let rerun = h.run(JobKind::ReconcileArray, at(6, 6)).await;
    assert!(rerun.alerts.is_empty());
    assert_eq!(h.member("100000002", GenomeType::Array).workflow_state, WorkflowState::Aw2Missing);
    h.put(GC_BUCKET, &format!("{ARRAY_RAW_FOLDER}/CWB-2_grn.idat.md5sum"), "data").await;
    h.run(JobKind::ReconcileArray, at(7, 0)).await;
    assert_eq!(h.member("100000002", GenomeType::Array).workflow_state, WorkflowState::GemReady);
}
