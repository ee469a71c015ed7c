//! Cron-driven runner for the configured job kinds.
//!
//! Each configured kind carries a cron expression. The loop sleeps until
//! the earliest upcoming fire time, then spawns every kind due at that
//! instant. A kind whose previous run still holds its lock is skipped.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{info, warn};

use genomic_core::{JobKind, PipelineError};

use crate::controller::{JobController, JobParams};

/// Upper bound on a single sleep, so clock jumps are picked up.
const MAX_SLEEP: Duration = Duration::from_secs(60);

pub struct Scheduler {
    controller: Arc<JobController>,
    entries: Vec<(JobKind, Schedule)>,
}

impl Scheduler {
    /// Build from the controller's schedule config. Invalid expressions are
    /// logged and left out.
    pub fn new(controller: Arc<JobController>) -> Self {
        let mut entries = Vec::new();
        for (kind, expr) in &controller.config().schedules.cron {
            match parse_cron(expr) {
                Ok(schedule) => entries.push((*kind, schedule)),
                Err(e) => warn!(job_kind = %kind, cron = %expr, error = %e, "invalid cron expression; kind not scheduled"),
            }
        }
        Self { controller, entries }
    }

    pub fn kinds(&self) -> impl Iterator<Item = JobKind> + '_ {
        self.entries.iter().map(|(kind, _)| *kind)
    }

    /// Earliest fire time strictly after `after`, with every kind due then.
    pub fn next_due(&self, after: DateTime<Utc>) -> Option<(DateTime<Utc>, Vec<JobKind>)> {
        let upcoming: Vec<(JobKind, DateTime<Utc>)> = self
            .entries
            .iter()
            .filter_map(|(kind, schedule)| schedule.after(&after).next().map(|at| (*kind, at)))
            .collect();
        let at = upcoming.iter().map(|(_, at)| *at).min()?;
        let kinds = upcoming
            .into_iter()
            .filter(|(_, fire)| *fire == at)
            .map(|(kind, _)| kind)
            .collect();
        Some((at, kinds))
    }

    /// Run until the task is dropped.
    pub async fn run(&self) {
        info!(kinds = self.entries.len(), "scheduler started");
        let mut cursor = Utc::now();

        loop {
            let Some((at, kinds)) = self.next_due(cursor) else {
                warn!("no scheduled job kinds; scheduler idle");
                return;
            };
            let now = Utc::now();
            if at > now {
                let wait = (at - now).to_std().unwrap_or(MAX_SLEEP).min(MAX_SLEEP);
                tokio::time::sleep(wait).await;
                continue;
            }

            for kind in kinds {
                let controller = self.controller.clone();
                tokio::spawn(async move {
                    run_scheduled(&controller, kind, at).await;
                });
            }
            cursor = at;
        }
    }
}

async fn run_scheduled(controller: &JobController, kind: JobKind, at: DateTime<Utc>) {
    info!(job_kind = %kind, fire_time = %at, trigger = "scheduled", "scheduler: starting job");
    match controller.run(kind, JobParams::default()).await {
        Ok(outcome) => info!(
            job_kind = %kind,
            job_run_id = %outcome.job_run.id,
            result = %outcome.result(),
            "scheduler: job finished"
        ),
        Err(PipelineError::JobAlreadyRunning(_)) => {
            info!(job_kind = %kind, "scheduler: previous run still active; skipped")
        }
        Err(e) => warn!(job_kind = %kind, error = %e, "scheduler: job failed"),
    }
}

/// Parse a cron expression, auto-prepending "0 " for 5-field expressions.
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        Schedule::from_str(&format!("0 {expr}"))
    } else {
        Schedule::from_str(expr)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
