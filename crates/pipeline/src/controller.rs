//! Job controller: runs one job kind under its lock and ledger row.
//!
//! Every run follows the same path: take the per-kind lock, open a RUNNING
//! job-run row, execute the body, close the row with the body's result (or
//! `ERROR`), release the lock, then dispatch whatever alerts the body
//! raised. The row is closed before any body error is returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use genomic_core::{
    GenomeType, GenomicFileProcessed, GenomicJobRun, JobKind, JobResult, JobStatus, ManifestKind,
    PipelineConfig, PipelineError,
};
use genomic_notify::{AlertContext, Dispatcher, TemplateRenderer};
use genomic_registry::Registry;
use genomic_storage::StorageGateway;

use crate::context::JobContext;
use crate::generate::generate;
use crate::ingest::{self, ObjectTarget};
use crate::reconcile::reconcile;

/// What a job kind does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPlan {
    Ingest(&'static [ManifestKind]),
    Reconcile(GenomeType),
    Generate(ManifestKind),
}

impl JobPlan {
    pub fn of(kind: JobKind) -> Self {
        use ManifestKind as M;
        match kind {
            JobKind::NewParticipantWorkflow => JobPlan::Generate(M::NewParticipant),
            JobKind::Aw1Manifest => JobPlan::Ingest(&[M::Aw1]),
            JobKind::Aw1fManifest => JobPlan::Ingest(&[M::Aw1f]),
            JobKind::Aw2Metrics => JobPlan::Ingest(&[M::Aw2Array, M::Aw2Wgs]),
            JobKind::ReconcileArray => JobPlan::Reconcile(GenomeType::Array),
            JobKind::ReconcileWgs => JobPlan::Reconcile(GenomeType::Wgs),
            JobKind::GemA1Manifest => JobPlan::Generate(M::GemA1),
            JobKind::GemA2Manifest => JobPlan::Ingest(&[M::GemA2]),
            JobKind::GemA3Manifest => JobPlan::Generate(M::GemA3),
            JobKind::CvlW1Manifest => JobPlan::Generate(M::CvlW1),
            JobKind::CvlW2Manifest => JobPlan::Ingest(&[M::CvlW2]),
            JobKind::CvlW3Manifest => JobPlan::Generate(M::CvlW3),
            JobKind::Aw1cManifest => JobPlan::Ingest(&[M::Aw1c]),
            JobKind::Aw1cfManifest => JobPlan::Ingest(&[M::Aw1cf]),
            JobKind::Aw2fManifest => JobPlan::Generate(M::Aw2f),
            JobKind::Aw3ArrayManifest => JobPlan::Generate(M::Aw3Array),
            JobKind::Aw3WgsManifest => JobPlan::Generate(M::Aw3Wgs),
            JobKind::Aw4ArrayManifest => JobPlan::Ingest(&[M::Aw4Array]),
            JobKind::Aw4WgsManifest => JobPlan::Ingest(&[M::Aw4Wgs]),
        }
    }
}

/// Per-run inputs.
#[derive(Debug, Clone)]
pub struct JobParams {
    /// Timestamp of the run; also names generated files.
    pub as_of: DateTime<Utc>,
    /// Restrict an ingestion job to one object.
    pub target: Option<ObjectTarget>,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            as_of: Utc::now(),
            target: None,
        }
    }
}

impl JobParams {
    pub fn at(as_of: DateTime<Utc>) -> Self {
        Self { as_of, target: None }
    }

    pub fn with_target(mut self, bucket: impl Into<String>, path: impl Into<String>) -> Self {
        self.target = Some(ObjectTarget {
            bucket: bucket.into(),
            path: path.into(),
        });
        self
    }
}

/// A finished run.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_run: GenomicJobRun,
    pub files: Vec<GenomicFileProcessed>,
    pub alerts: Vec<AlertContext>,
}

impl JobOutcome {
    pub fn result(&self) -> JobResult {
        self.job_run.result.unwrap_or(JobResult::Error)
    }
}

pub struct JobController {
    config: PipelineConfig,
    registry: Arc<dyn Registry>,
    storage: StorageGateway,
    dispatcher: Dispatcher,
    renderer: TemplateRenderer,
}

impl JobController {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<dyn Registry>,
        storage: StorageGateway,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            config,
            registry,
            storage,
            dispatcher,
            renderer: TemplateRenderer::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub fn storage(&self) -> &StorageGateway {
        &self.storage
    }

    /// Run `kind` to completion.
    ///
    /// Fails fast with [`PipelineError::JobAlreadyRunning`] when another run
    /// of the kind holds the lock; no ledger row is opened in that case.
    pub async fn run(&self, kind: JobKind, params: JobParams) -> Result<JobOutcome, PipelineError> {
        let plan = JobPlan::of(kind);
        if params.target.is_some() && !matches!(plan, JobPlan::Ingest(_)) {
            return Err(PipelineError::Config(format!("{kind} does not take a target object")));
        }

        let mut run = GenomicJobRun {
            id: Uuid::new_v4(),
            job_kind: kind,
            start_time: params.as_of,
            end_time: None,
            status: JobStatus::Running,
            result: None,
            message: None,
        };

        if !self.registry.try_acquire_job_lock(kind, run.id).await? {
            warn!(job_kind = %kind, "job already running; not started");
            return Err(PipelineError::JobAlreadyRunning(kind));
        }
        if let Err(e) = self.registry.open_job_run(&run).await {
            if let Err(release) = self.registry.release_job_lock(kind).await {
                error!(job_kind = %kind, error = %release, "failed to release job lock");
            }
            return Err(e.into());
        }
        info!(job_run_id = %run.id, job_kind = %kind, as_of = %params.as_of, "job started");

        let (body, alerts, files) = {
            let mut ctx = JobContext::new(&run, &self.config, self.registry.as_ref(), &self.storage);
            let body = execute(&mut ctx, plan, params.target.as_ref()).await;
            (body, ctx.alerts, ctx.files)
        };

        run.end_time = Some(Utc::now().max(run.start_time));
        run.status = JobStatus::Completed;
        match &body {
            Ok(result) => run.result = Some(*result),
            Err(e) => {
                error!(job_run_id = %run.id, job_kind = %kind, error = %e, "job failed");
                run.result = Some(JobResult::Error);
                run.message = Some(e.to_string());
            }
        }

        let closed = self.registry.close_job_run(&run).await;
        if let Err(e) = &closed {
            error!(job_run_id = %run.id, error = %e, "failed to close job run");
        }
        let released = self.registry.release_job_lock(kind).await;
        if let Err(e) = &released {
            error!(job_kind = %kind, error = %e, "failed to release job lock");
        }
        self.dispatch(&alerts).await;

        let result = body?;
        closed?;
        released?;

        info!(
            job_run_id = %run.id,
            job_kind = %kind,
            result = %result,
            files = files.len(),
            alerts = alerts.len(),
            "job finished"
        );
        Ok(JobOutcome {
            job_run: run,
            files,
            alerts,
        })
    }

    async fn dispatch(&self, alerts: &[AlertContext]) {
        for alert in alerts {
            match self.renderer.notification(alert) {
                Ok(notification) => {
                    let results = self.dispatcher.dispatch(&alert.kind, &notification).await;
                    let failed = results.iter().filter(|r| !r.success).count();
                    if failed > 0 {
                        warn!(alert = %alert.kind, failed, "alert not delivered on every channel");
                    }
                }
                Err(e) => warn!(alert = %alert.kind, error = %e, "alert could not be rendered"),
            }
        }
    }
}

async fn execute(
    ctx: &mut JobContext<'_>,
    plan: JobPlan,
    target: Option<&ObjectTarget>,
) -> Result<JobResult, PipelineError> {
    match plan {
        JobPlan::Ingest(kinds) => ingest::run(ctx, kinds, target).await,
        JobPlan::Reconcile(genome_type) => reconcile(ctx, genome_type).await,
        JobPlan::Generate(kind) => generate(ctx, kind).await,
    }
}
