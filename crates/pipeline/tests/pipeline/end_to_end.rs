use genomic_core::{DataFileKind, GenomeType, JobKind, JobResult, QcStatus, Stage, WorkflowState};
use genomic_registry::{Registry, UnitOfWork};
use uuid::Uuid;

use crate::helpers::*;

/// AW1 and AW2 for two array members, one of them short a data file.
async fn reconciled_with_one_gap(h: &Harness) -> genomic_pipeline::JobOutcome {
    through_metrics(h).await;
    h.deliver_array_files("CWB-1", &[]).await;
    h.deliver_array_files("CWB-2", &[DataFileKind::IdatGreenMd5]).await;
    h.run(JobKind::ReconcileArray, at(5, 0)).await
}

#[tokio::test]
async fn one_complete_member_and_one_gap() {
    let h = Harness::new();
    let outcome = reconciled_with_one_gap(&h).await;

    assert_eq!(h.member("100000001", GenomeType::Array).workflow_state, WorkflowState::GemReady);
    assert_eq!(h.member("100000002", GenomeType::Array).workflow_state, WorkflowState::Aw2Missing);

    assert_eq!(outcome.alerts.len(), 1);
    let alert = &outcome.alerts[0];
    assert_eq!(alert.job_run_id, outcome.job_run.id.to_string());
    assert_eq!(alert.member_count(), 1);
    assert_eq!(alert.groups[0].members[0].detail, "CWB-2_grn.idat.md5sum");
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn array_member_travels_to_data_release() {
    let h = Harness::new();
    reconciled_with_one_gap(&h).await;

    // GEM A1
    let a1 = h.run(JobKind::GemA1Manifest, at(6, 0)).await;
    let file = &a1.files[0];
    assert_eq!(file.bucket_name, "gem");
    assert_eq!(file.file_path, "A1_manifests/AoU_GEM_A1_manifest_2024-05-06-00-00-00.csv");
    let text = h.read(&file.bucket_name, &file.file_path).await;
    assert!(text.contains("T100000001,SMP-1,F,Y,2024-05-01T00:00:00Z,CWB-1,rdr"));
    assert!(!text.contains("T100000002"));
    assert_eq!(h.member("100000001", GenomeType::Array).workflow_state, WorkflowState::A1);

    // GEM A2
    h.put(
        "gem",
        "A2_manifests/AoU_GEM_A2_manifest_2024-05-06.csv",
        "Biobank ID,Sample ID,Success,Date of Import\nT100000001,SMP-1,Y,2024-05-06\n",
    )
    .await;
    let a2 = h.run(JobKind::GemA2Manifest, at(7, 0)).await;
    assert_eq!(a2.result(), JobResult::Success);
    let member = h.member("100000001", GenomeType::Array);
    assert_eq!(member.workflow_state, WorkflowState::A2);
    assert_eq!(member.gem_pass, Some(true));

    // AW3 to the data-release partner
    let aw3 = h.run(JobKind::Aw3ArrayManifest, at(8, 0)).await;
    let file = &aw3.files[0];
    assert_eq!(file.bucket_name, "drc-broad");
    assert_eq!(file.file_path, "AW3_array_manifest/AoU_DRCV_GEN_2024-05-08-00-00-00.csv");
    assert_eq!(file.record_count, 1);
    let text = h.read(&file.bucket_name, &file.file_path).await;
    assert!(text.starts_with("chipwellbarcode,biobank_id,sample_id"));
    assert!(text.contains("gc-rdr/Genotyping_sample_raw_data/CWB-1_red.idat"));
    assert!(text.contains("P100000001"));
    let member = h.member("100000001", GenomeType::Array);
    assert_eq!(member.workflow_state, WorkflowState::A2);
    assert_eq!(member.stamps.get(Stage::Aw3), Some(aw3.job_run.id));

    let again = h.run(JobKind::Aw3ArrayManifest, at(8, 6)).await;
    assert_eq!(again.result(), JobResult::NoFilesFound);

    // AW4 QC verdict comes back
    h.put(
        "drc-broad",
        "AW4_array_manifest/AoU_DRCB_GEN_2024-05-09.csv",
        "biobank_id,sample_id,site_id,research_id,qc_status,fingerprint_path\n\
         T100000001,SMP-1,rdr,P100000001,PASS,gs://fp/100000001.vcf\n",
    )
    .await;
    let aw4 = h.run(JobKind::Aw4ArrayManifest, at(9, 0)).await;
    let member = h.member("100000001", GenomeType::Array);
    assert_eq!(member.workflow_state, WorkflowState::A2);
    assert_eq!(member.qc_status, QcStatus::Pass);
    assert_eq!(member.drc_fingerprint_path.as_deref(), Some("gs://fp/100000001.vcf"));
    assert_eq!(member.stamps.get(Stage::Aw4), Some(aw4.job_run.id));
}

/// One participant returned in a GEN and a SEQ package, both with metrics.
/// Returns the new-participant manifest id the feedback hangs off.
async fn packages_with_metrics(h: &Harness) -> Uuid {
    h.enroll("100000001", "TUBE-1", at(1, 0));
    h.run(JobKind::NewParticipantWorkflow, at(2, 0)).await;

    let mut wgs = GcRow::array("100000001", "TUBE-1", "SMP-W1");
    wgs.test_name = "aou_wgs";
    h.put(
        GC_BUCKET,
        &format!("{AW1_ARRAY_FOLDER}/RDR_AoU_GEN_PKG-2101-123456.csv"),
        gc_manifest(&[GcRow::array("100000001", "TUBE-1", "SMP-1")]),
    )
    .await;
    h.put(
        GC_BUCKET,
        "AW1_wgs_sample_manifests/RDR_AoU_SEQ_PKG-2101-123457.csv",
        gc_manifest(&[wgs]),
    )
    .await;
    let aw1 = h.run(JobKind::Aw1Manifest, at(3, 0)).await;
    assert_eq!(aw1.files.len(), 2);

    let manifest_id = h.member("100000001", GenomeType::Array).manifest_file_id.unwrap();
    let feedback = h.registry.feedback_for_manifest(manifest_id).await.unwrap().unwrap();
    assert_eq!(feedback.feedback_record_count, 2);
    assert!(feedback.feedback_complete);
    assert_eq!(feedback.feedback_complete_date, Some(at(3, 0)));

    // members without metrics hold the feedback back
    let early = h.run(JobKind::Aw2fManifest, at(3, 6)).await;
    assert_eq!(early.result(), JobResult::NoFilesFound);

    h.put(
        GC_BUCKET,
        &format!("{AW2_ARRAY_FOLDER}/RDR_AoU_GEN_DataManifest_1.csv"),
        aw2_array(&[MetricsRow::passing("100000001", "SMP-1", "CWB-1")]),
    )
    .await;
    h.put(
        GC_BUCKET,
        &format!("{AW2_WGS_FOLDER}/RDR_AoU_SEQ_DataManifest_1.csv"),
        aw2_wgs(&[("100000001", "SMP-W1", "LIMS-9", "0.02")]),
    )
    .await;
    h.run(JobKind::Aw2Metrics, at(4, 0)).await;
    manifest_id
}

#[tokio::test]
async fn contamination_feedback_goes_back_per_package() {
    let h = Harness::new();
    let manifest_id = packages_with_metrics(&h).await;

    let outcome = h.run(JobKind::Aw2fManifest, at(5, 0)).await;

    assert_eq!(outcome.result(), JobResult::Success);
    let mut paths: Vec<&str> = outcome.files.iter().map(|f| f.file_path.as_str()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "AW2F_manifests/RDR_AoU_GEN_PKG-2101-123456_contamination_2024-05-05-00-00-00.csv",
            "AW2F_manifests/RDR_AoU_SEQ_PKG-2101-123457_contamination_2024-05-05-00-00-00.csv",
        ]
    );
    assert!(outcome.files.iter().all(|f| f.bucket_name == GC_BUCKET));

    let seq = outcome
        .files
        .iter()
        .find(|f| f.file_name.contains("_SEQ_"))
        .unwrap();
    let text = h.read(&seq.bucket_name, &seq.file_path).await;
    assert!(text.contains("T100000001_SMP-W1"));
    assert!(text.contains("0.02,EXTRACT_WGS,Y"));

    for genome_type in [GenomeType::Array, GenomeType::Wgs] {
        let member = h.member("100000001", genome_type);
        assert_eq!(member.stamps.get(Stage::Aw2f), Some(outcome.job_run.id));
    }
    let feedback = h.registry.feedback_for_manifest(manifest_id).await.unwrap().unwrap();
    assert_eq!(feedback.aw2f_job_run_id, Some(outcome.job_run.id));

    let again = h.run(JobKind::Aw2fManifest, at(6, 0)).await;
    assert_eq!(again.result(), JobResult::NoFilesFound);
}

#[tokio::test]
async fn interrupted_feedback_run_only_sends_the_remaining_package() {
    let h = Harness::new();
    let manifest_id = packages_with_metrics(&h).await;

    // an earlier run published the GEN package and stopped before SEQ
    let earlier = Uuid::new_v4();
    let mut array = h.member("100000001", GenomeType::Array);
    array.stamps.set(Stage::Aw2f, earlier);
    let mut unit = UnitOfWork::new();
    unit.put_member(array);
    h.registry.commit(unit).await.unwrap();

    let outcome = h.run(JobKind::Aw2fManifest, at(5, 0)).await;

    assert_eq!(outcome.files.len(), 1);
    assert_eq!(
        outcome.files[0].file_path,
        "AW2F_manifests/RDR_AoU_SEQ_PKG-2101-123457_contamination_2024-05-05-00-00-00.csv"
    );
    assert_eq!(h.member("100000001", GenomeType::Array).stamps.get(Stage::Aw2f), Some(earlier));
    assert_eq!(h.member("100000001", GenomeType::Wgs).stamps.get(Stage::Aw2f), Some(outcome.job_run.id));
    let feedback = h.registry.feedback_for_manifest(manifest_id).await.unwrap().unwrap();
    assert_eq!(feedback.aw2f_job_run_id, Some(outcome.job_run.id));

    let again = h.run(JobKind::Aw2fManifest, at(6, 0)).await;
    assert_eq!(again.result(), JobResult::NoFilesFound);
}

#[tokio::test]
async fn feedback_whose_packages_were_all_sent_is_closed_without_a_file() {
    let h = Harness::new();
    let manifest_id = packages_with_metrics(&h).await;

    let earlier = Uuid::new_v4();
    let mut unit = UnitOfWork::new();
    for genome_type in [GenomeType::Array, GenomeType::Wgs] {
        let mut member = h.member("100000001", genome_type);
        member.stamps.set(Stage::Aw2f, earlier);
        unit.put_member(member);
    }
    h.registry.commit(unit).await.unwrap();

    let outcome = h.run(JobKind::Aw2fManifest, at(5, 0)).await;

    assert_eq!(outcome.result(), JobResult::NoFilesFound);
    let feedback = h.registry.feedback_for_manifest(manifest_id).await.unwrap().unwrap();
    assert_eq!(feedback.aw2f_job_run_id, Some(earlier));
    assert!(h.registry.feedback_awaiting_aw2f().await.unwrap().is_empty());
}
