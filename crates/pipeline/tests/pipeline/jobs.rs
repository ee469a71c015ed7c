use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use genomic_core::{JobKind, JobResult, JobStatus, PipelineConfig, PipelineError};
use genomic_notify::Dispatcher;
use genomic_pipeline::{JobController, JobParams, Scheduler};
use genomic_registry::{MemoryRegistry, Registry};
use genomic_storage::StorageGateway;

use crate::helpers::*;

fn build_scheduler(config: PipelineConfig) -> Scheduler {
    let storage = StorageGateway::in_memory(config.buckets.all());
    let controller = JobController::new(config, Arc::new(MemoryRegistry::new()), storage, Dispatcher::empty());
    Scheduler::new(Arc::new(controller))
}

#[tokio::test]
async fn held_lock_rejects_a_second_run() {
    let h = Harness::new();
    let holder = Uuid::new_v4();
    assert!(h.registry.try_acquire_job_lock(JobKind::Aw1Manifest, holder).await.unwrap());

    let err = h
        .controller
        .run(JobKind::Aw1Manifest, JobParams::at(at(3, 0)))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::JobAlreadyRunning(JobKind::Aw1Manifest)));
    assert!(h.registry.job_runs(JobKind::Aw1Manifest).await.unwrap().is_empty());

    // other kinds are not blocked
    let other = h.run(JobKind::Aw2Metrics, at(3, 0)).await;
    assert_eq!(other.result(), JobResult::NoFilesFound);

    h.registry.release_job_lock(JobKind::Aw1Manifest).await.unwrap();
    let next = h.run(JobKind::Aw1Manifest, at(3, 1)).await;
    assert_eq!(next.result(), JobResult::NoFilesFound);
}

#[tokio::test]
async fn failed_run_is_closed_and_releases_its_lock() {
    let h = Harness::new();
    let err = h
        .controller
        .run(
            JobKind::Aw2Metrics,
            JobParams::at(at(4, 0)).with_target(GC_BUCKET, "AW2_genotyping_data_manifests/gone.csv"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Dependency(_)));

    let runs = h.registry.job_runs(JobKind::Aw2Metrics).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, JobStatus::Completed);
    assert_eq!(runs[0].result, Some(JobResult::Error));
    assert!(runs[0].end_time.is_some());
    assert!(runs[0].message.is_some());
    assert!(h.registry.last_successful_run(JobKind::Aw2Metrics).await.unwrap().is_none());

    let retry = h.run(JobKind::Aw2Metrics, at(4, 1)).await;
    assert_eq!(retry.result(), JobResult::NoFilesFound);
}

#[tokio::test]
async fn generators_do_not_take_a_target() {
    let h = Harness::new();
    let err = h
        .controller
        .run(
            JobKind::GemA1Manifest,
            JobParams::at(at(4, 0)).with_target("gem", "A1_manifests/x.csv"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Config(_)));
    assert!(h.registry.job_runs(JobKind::GemA1Manifest).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_run_is_recorded_as_no_files_found() {
    let h = Harness::new();

    let outcome = h.run(JobKind::ReconcileArray, at(5, 0)).await;

    assert_eq!(outcome.result(), JobResult::NoFilesFound);
    assert!(outcome.files.is_empty());
    assert!(outcome.alerts.is_empty());
    assert_eq!(outcome.job_run.start_time, at(5, 0));
    let last = h
        .registry
        .last_successful_run(JobKind::ReconcileArray)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.id, outcome.job_run.id);
}

#[test]
fn scheduler_groups_kinds_due_together() {
    let scheduler = build_scheduler(PipelineConfig::default());
    assert_eq!(scheduler.kinds().count(), JobKind::ALL.len());

    let (when, mut kinds) = scheduler
        .next_due(Utc.with_ymd_and_hms(2024, 5, 1, 0, 10, 0).unwrap())
        .unwrap();
    kinds.sort();
    assert_eq!(when, Utc.with_ymd_and_hms(2024, 5, 1, 0, 30, 0).unwrap());
    assert_eq!(kinds, vec![JobKind::ReconcileArray, JobKind::ReconcileWgs]);

    let (when, kinds) = scheduler
        .next_due(Utc.with_ymd_and_hms(2024, 5, 1, 1, 45, 0).unwrap())
        .unwrap();
    assert_eq!(when, Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap());
    assert!(kinds.contains(&JobKind::NewParticipantWorkflow));
    assert!(kinds.contains(&JobKind::Aw1Manifest));
    assert!(kinds.contains(&JobKind::Aw2Metrics));
    assert!(!kinds.contains(&JobKind::GemA1Manifest));
    assert_eq!(kinds.len(), 10);
}

#[test]
fn invalid_or_disabled_schedules_are_left_out() {
    let mut config = PipelineConfig::default();
    config.schedules.cron.insert(JobKind::GemA1Manifest, "whenever".into());
    config.schedules.cron.remove(&JobKind::GemA3Manifest);
    let scheduler = build_scheduler(config);

    let kinds: Vec<JobKind> = scheduler.kinds().collect();
    assert!(!kinds.contains(&JobKind::GemA1Manifest));
    assert!(!kinds.contains(&JobKind::GemA3Manifest));
    assert_eq!(kinds.len(), JobKind::ALL.len() - 2);

    let mut none = PipelineConfig::default();
    none.schedules.cron.clear();
    assert!(build_scheduler(none).next_due(at(1, 0)).is_none());
}
