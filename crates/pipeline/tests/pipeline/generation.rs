use genomic_core::{
    GenomeType, GenomicSetMember, GrorConsent, JobKind, JobResult, ManifestKind, Stage,
    WorkflowState,
};
use genomic_registry::{Registry, UnitOfWork};

use crate::helpers::*;

const NP_HEADER: &str = "value,biobank_id,collection_tubeid,sex_at_birth,genome_type,ny_flag,ai_an,validation_passed";

// ── New participants ────────────────────────────────────────────────

#[tokio::test]
async fn new_participant_manifest_lists_both_lanes() {
    let h = Harness::new();
    h.enroll("100000001", "TUBE-1", at(1, 0));

    let outcome = h.run(JobKind::NewParticipantWorkflow, at(2, 0)).await;

    assert_eq!(outcome.result(), JobResult::Success);
    assert_eq!(outcome.files.len(), 1);
    let file = &outcome.files[0];
    assert_eq!(file.bucket_name, "genomic-set");
    assert_eq!(
        file.file_path,
        "genomic_samples_manifests/Genomic-Manifest-AoU_2024-05-02-00-00-00.csv"
    );
    assert_eq!(file.record_count, 2);

    let text = h.read(&file.bucket_name, &file.file_path).await;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], NP_HEADER);
    assert!(lines.contains(&"T100000001,100000001,TUBE-1,F,aou_array,N,N,Y"));
    assert!(lines.contains(&"T100000001,100000001,TUBE-1,F,aou_wgs,N,N,Y"));

    let sets = h.registry.all_sets().unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].version, 1);

    let manifests = h.registry.manifest_files(ManifestKind::NewParticipant).await.unwrap();
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0].record_count, 2);
    for member in h.members() {
        assert_eq!(member.workflow_state, WorkflowState::Aw0);
        assert_eq!(member.genomic_set_id, Some(sets[0].id));
        assert_eq!(member.manifest_file_id, Some(manifests[0].id));
    }
}

#[tokio::test]
async fn ineligible_participants_are_left_out() {
    let h = Harness::new();
    h.enroll("100000001", "TUBE-1", at(1, 0));

    let mut unconsented = participant("100000002", at(1, 0));
    unconsented.consent_for_study_enrollment = false;
    let mut no_dna = participant("100000003", at(1, 0));
    no_dna.dna_sample_received = false;
    let mut withdrawn = participant("100000004", at(1, 0));
    withdrawn.withdrawn = true;
    withdrawn.withdrawal_authored = Some(at(1, 0));
    for p in [unconsented, no_dna, withdrawn] {
        let tube = format!("TUBE-{}", p.biobank_id);
        h.registry
            .put_stored_sample(stored_sample(&p.biobank_id, &tube, "1ED04", at(1, 0)))
            .unwrap();
        h.registry.put_participant(p).unwrap();
    }
    // consented but nothing confirmed in storage
    h.registry.put_participant(participant("100000005", at(1, 0))).unwrap();

    h.run(JobKind::NewParticipantWorkflow, at(2, 0)).await;

    let biobank_ids: Vec<String> = h.members().into_iter().map(|m| m.biobank_id).collect();
    assert_eq!(biobank_ids.len(), 2);
    assert!(biobank_ids.iter().all(|b| b == "100000001"));
}

#[tokio::test]
async fn earliest_available_sample_is_chosen() {
    let h = Harness::new();
    h.enroll("100000001", "TUBE-LATE", at(1, 12));
    h.registry
        .put_stored_sample(stored_sample("100000001", "TUBE-EARLY", "1ED10", at(1, 6)))
        .unwrap();
    let mut disposed = stored_sample("100000001", "TUBE-GONE", "1ED04", at(1, 0));
    disposed.disposed = Some(at(1, 3));
    h.registry.put_stored_sample(disposed).unwrap();

    h.run(JobKind::NewParticipantWorkflow, at(2, 0)).await;

    let member = h.member("100000001", GenomeType::Array);
    assert_eq!(member.collection_tube_id.as_deref(), Some("TUBE-EARLY"));
}

#[tokio::test]
async fn later_runs_only_pick_up_new_participants() {
    let h = Harness::new();
    two_new_participants(&h).await;

    let idle = h.run(JobKind::NewParticipantWorkflow, at(2, 6)).await;
    assert_eq!(idle.result(), JobResult::NoFilesFound);
    assert!(idle.files.is_empty());

    h.enroll("100000003", "TUBE-3", at(3, 0));
    let outcome = h.run(JobKind::NewParticipantWorkflow, at(4, 0)).await;

    assert_eq!(outcome.result(), JobResult::Success);
    assert_eq!(outcome.files[0].record_count, 2);
    let text = h.read(&outcome.files[0].bucket_name, &outcome.files[0].file_path).await;
    assert!(text.contains("T100000003"));
    assert!(!text.contains("T100000001"));

    let mut versions: Vec<i32> = h.registry.all_sets().unwrap().iter().map(|s| s.version).collect();
    versions.sort();
    assert_eq!(versions, vec![1, 2]);
    assert_eq!(h.members().len(), 6);
}

// ── GEM consent removal ─────────────────────────────────────────────

#[tokio::test]
async fn consent_removal_manifest_selects_lapsed_and_withdrawn() {
    let h = Harness::new();
    let mut withdrawn = participant("100000011", at(1, 0));
    withdrawn.withdrawn = true;
    withdrawn.withdrawal_authored = Some(at(3, 0));
    let consenting = participant("100000012", at(1, 0));
    let mut lapsed = participant("100000013", at(1, 0));
    lapsed.consent_for_genomics_ror = GrorConsent::SubmittedNoConsent;
    lapsed.consent_for_genomics_ror_authored = Some(at(3, 0));
    let mut withdrew_after_a3 = participant("100000014", at(1, 0));
    withdrew_after_a3.withdrawn = true;
    withdrew_after_a3.withdrawal_authored = Some(at(4, 0));
    let mut withdrew_before_a3 = participant("100000015", at(1, 0));
    withdrew_before_a3.withdrawn = true;
    withdrew_before_a3.withdrawal_authored = Some(at(4, 0));
    for p in [withdrawn, consenting, lapsed, withdrew_after_a3, withdrew_before_a3] {
        h.registry.put_participant(p).unwrap();
    }

    seed_member(&h, "100000011", "SMP-11", WorkflowState::A1, at(2, 0)).await;
    seed_member(&h, "100000012", "SMP-12", WorkflowState::A2, at(2, 0)).await;
    seed_member(&h, "100000013", "SMP-13", WorkflowState::A2, at(2, 0)).await;
    seed_member(&h, "100000014", "SMP-14", WorkflowState::A3, at(2, 0)).await;
    seed_member(&h, "100000015", "SMP-15", WorkflowState::A3, at(5, 0)).await;

    let outcome = h.run(JobKind::GemA3Manifest, at(6, 0)).await;

    let file = &outcome.files[0];
    assert_eq!(file.bucket_name, "gem");
    assert_eq!(file.file_path, "A3_manifests/AoU_GEM_A3_manifest_2024-05-06-00-00-00.csv");
    let text = h.read(&file.bucket_name, &file.file_path).await;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "biobank_id,sample_id,date_of_consent_removal");
    assert_eq!(lines.len(), 4);
    assert!(lines.contains(&"T100000011,SMP-11,2024-05-03T00:00:00Z"));
    assert!(lines.contains(&"T100000013,SMP-13,2024-05-03T00:00:00Z"));
    assert!(lines.contains(&"T100000014,SMP-14,2024-05-04T00:00:00Z"));

    for biobank_id in ["100000011", "100000013", "100000014"] {
        let member = h.member(biobank_id, GenomeType::Array);
        assert_eq!(member.workflow_state, WorkflowState::A3);
        assert_eq!(member.workflow_state_modified, at(6, 0));
        assert_eq!(member.stamps.get(Stage::GemA3), Some(outcome.job_run.id));
    }
    assert_eq!(h.member("100000012", GenomeType::Array).workflow_state, WorkflowState::A2);

    let again = h.run(JobKind::GemA3Manifest, at(7, 0)).await;
    assert_eq!(again.result(), JobResult::NoFilesFound);
}

// ── CVL validation loop ─────────────────────────────────────────────

async fn seed_cvl_ready(h: &Harness, biobank_id: &str, sample_id: &str) {
    h.registry.put_participant(participant(biobank_id, at(1, 0))).unwrap();
    let mut member = GenomicSetMember::new(biobank_id, GenomeType::Wgs, at(2, 0));
    member.participant_id = Some(format!("P{biobank_id}"));
    member.sample_id = Some(sample_id.to_string());
    member.gc_site_id = Some("rdr".into());
    member.sex_at_birth = "F".into();
    member.set_state(WorkflowState::CvlReady, at(2, 0));
    let mut unit = UnitOfWork::new();
    unit.put_member(member);
    h.registry.commit(unit).await.unwrap();
}

#[tokio::test]
async fn cvl_request_and_response_cycle() {
    let h = Harness::new();
    seed_cvl_ready(&h, "100000021", "SMP-21").await;

    let w1 = h.run(JobKind::CvlW1Manifest, at(3, 0)).await;
    let file = &w1.files[0];
    assert_eq!(file.bucket_name, "cvl");
    assert_eq!(file.file_path, "W1_manifests/AoU_CVL_W1_2024-05-03-00-00-00.csv");
    let text = h.read(&file.bucket_name, &file.file_path).await;
    assert!(text.contains("T100000021,100000021,SMP-21,F,aou_cvl,N,N,Y"));
    assert_eq!(h.member("100000021", GenomeType::Wgs).workflow_state, WorkflowState::W1);

    h.put(
        "cvl",
        "W2_manifests/RDR_AoU_CVL_W2_2024-05-04.csv",
        "Biobank ID,Sample ID,Sex At Birth,NY Flag,Site ID,Secondary Validation,Date Submitted,Test Name\n\
         T100000021,SMP-21,F,N,rdr,Y,2024-05-04,aou_cvl\n",
    )
    .await;
    let w2 = h.run(JobKind::CvlW2Manifest, at(4, 0)).await;
    assert_eq!(w2.result(), JobResult::Success);
    let member = h.member("100000021", GenomeType::Wgs);
    assert_eq!(member.workflow_state, WorkflowState::W2);
    assert_eq!(member.stamps.get(Stage::CvlW2), Some(w2.job_run.id));

    let w3 = h.run(JobKind::CvlW3Manifest, at(5, 0)).await;
    assert_eq!(w3.files[0].file_path, "W3_manifests/AoU_CVL_W3_2024-05-05-00-00-00.csv");
    let member = h.member("100000021", GenomeType::Wgs);
    assert_eq!(member.workflow_state, WorkflowState::W3);
    assert_eq!(member.stamps.get(Stage::CvlW3), Some(w3.job_run.id));
}

#[tokio::test]
async fn cvl_request_skips_members_without_results_consent() {
    let h = Harness::new();
    seed_cvl_ready(&h, "100000022", "SMP-22").await;
    let mut p = participant("100000022", at(1, 0));
    p.consent_for_genomics_ror = GrorConsent::SubmittedNoConsent;
    h.registry.put_participant(p).unwrap();

    let outcome = h.run(JobKind::CvlW1Manifest, at(3, 0)).await;

    assert_eq!(outcome.result(), JobResult::NoFilesFound);
    assert_eq!(h.member("100000022", GenomeType::Wgs).workflow_state, WorkflowState::CvlReady);
}
