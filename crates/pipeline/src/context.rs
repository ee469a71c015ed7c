use chrono::{DateTime, Utc};

use genomic_core::{GenomicFileProcessed, GenomicJobRun, JobRunId, PipelineConfig};
use genomic_notify::{AlertContext, AlertGroup};
use genomic_registry::Registry;
use genomic_storage::StorageGateway;

/// Everything a job body needs, borrowed from the controller for one run.
pub struct JobContext<'a> {
    pub run: &'a GenomicJobRun,
    pub config: &'a PipelineConfig,
    pub registry: &'a dyn Registry,
    pub storage: &'a StorageGateway,
    /// Timestamp written on every row the run touches.
    pub as_of: DateTime<Utc>,
    /// Alerts to dispatch once the run is closed.
    pub alerts: Vec<AlertContext>,
    /// Files ingested or written by the run.
    pub files: Vec<GenomicFileProcessed>,
}

impl<'a> JobContext<'a> {
    pub fn new(
        run: &'a GenomicJobRun,
        config: &'a PipelineConfig,
        registry: &'a dyn Registry,
        storage: &'a StorageGateway,
    ) -> Self {
        Self {
            run,
            config,
            registry,
            storage,
            as_of: run.start_time,
            alerts: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn run_id(&self) -> JobRunId {
        self.run.id
    }

    /// Biobank id as stored on members: the configured prefix removed.
    pub fn strip_prefix(&self, raw: &str) -> String {
        let raw = raw.trim();
        raw.strip_prefix(self.config.thresholds.biobank_prefix.as_str())
            .unwrap_or(raw)
            .to_string()
    }

    /// Biobank id as written in outbound manifests.
    pub fn prefixed(&self, biobank_id: &str) -> String {
        format!("{}{}", self.config.thresholds.biobank_prefix, biobank_id)
    }

    /// Queue an alert; groups without members are dropped and an alert with
    /// no groups left is not queued.
    pub fn raise(&mut self, kind: &str, bucket: impl Into<String>, groups: Vec<AlertGroup>) {
        let groups: Vec<AlertGroup> = groups.into_iter().filter(|g| !g.members.is_empty()).collect();
        if groups.is_empty() {
            return;
        }
        let alert = AlertContext {
            kind: kind.to_string(),
            job_kind: self.run.job_kind.to_string(),
            job_run_id: self.run.id.to_string(),
            bucket: bucket.into(),
            groups,
            now: self.as_of.to_rfc3339(),
        };
        tracing::warn!(
            job_run_id = %self.run.id,
            alert = kind,
            bucket = %alert.bucket,
            members = alert.member_count(),
            "alert raised"
        );
        self.alerts.push(alert);
    }
}
