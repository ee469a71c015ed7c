use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::kinds::JobKind;
use crate::manifest::BucketRole;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// `a=x,b=y` → `{a: x, b: y}`; entries without `=` are skipped.
fn parse_pairs(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub storage: StorageConfig,
    pub aws: AwsConfig,
    pub buckets: BucketConfig,
    pub registry: RegistryConfig,
    pub thresholds: ThresholdConfig,
    pub alerting: AlertConfig,
    pub schedules: ScheduleConfig,
}

impl Default for PipelineConfig {
    /// In-memory storage and registry with fixed bucket names.
    fn default() -> Self {
        Self {
            profile: String::new(),
            storage: StorageConfig {
                mode: StorageMode::Memory,
                local_root: PathBuf::from("data/buckets"),
            },
            aws: AwsConfig::default(),
            buckets: BucketConfig::default(),
            registry: RegistryConfig {
                database_url: None,
                max_connections: 5,
            },
            thresholds: ThresholdConfig::default(),
            alerting: AlertConfig::default(),
            schedules: ScheduleConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `GENOMIC_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, PipelineError> {
        let profile = env_or("GENOMIC_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, PipelineError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let config = Self {
            profile: p.to_string(),
            storage: StorageConfig::from_env_profiled(p)?,
            aws: AwsConfig::from_env_profiled(p),
            buckets: BucketConfig::from_env_profiled(p),
            registry: RegistryConfig::from_env_profiled(p),
            thresholds: ThresholdConfig::from_env_profiled(p),
            alerting: AlertConfig::from_env_profiled(p),
            schedules: ScheduleConfig::from_env_profiled(p),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations no job could run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.contamination_flag) || t.contamination_flag > t.contamination_extract {
            return Err(PipelineError::Config(format!(
                "contamination thresholds out of order: flag={} extract={}",
                t.contamination_flag, t.contamination_extract
            )));
        }
        if t.control_biobank_min > t.control_biobank_max {
            return Err(PipelineError::Config(format!(
                "control biobank range is empty: {}..={}",
                t.control_biobank_min, t.control_biobank_max
            )));
        }
        if self.buckets.genome_centers.is_empty() {
            return Err(PipelineError::Config("no genome-center buckets configured".into()));
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  storage:     mode={:?}, root={}", self.storage.mode, self.storage.local_root.display());
        tracing::info!("  aws:         region={}, configured={}", self.aws.region, self.aws.is_configured());
        tracing::info!(
            "  buckets:     genomic_set={}, gem={}, cvl={}, drc_broad={}, genome_centers={}",
            self.buckets.genomic_set,
            self.buckets.gem,
            self.buckets.cvl,
            self.buckets.drc_broad,
            self.buckets.genome_centers.len()
        );
        tracing::info!("  registry:    postgres={}", self.registry.is_configured());
        tracing::info!(
            "  thresholds:  flag={}, extract={}",
            self.thresholds.contamination_flag,
            self.thresholds.contamination_extract
        );
        tracing::info!(
            "  alerting:    webhook={}, email={}",
            self.alerting.webhook_url.is_some(),
            self.alerting.email_configured()
        );
    }

    /// Return a redacted view safe for logs and CLI output (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "storage": { "mode": self.storage.mode, "local_root": self.storage.local_root },
            "aws": {
                "region": self.aws.region,
                "endpoint_url": self.aws.endpoint_url,
                "configured": self.aws.is_configured(),
            },
            "buckets": self.buckets,
            "registry": {
                "configured": self.registry.is_configured(),
                "max_connections": self.registry.max_connections,
            },
            "thresholds": self.thresholds,
            "alerting": {
                "webhook": self.alerting.webhook_url.is_some(),
                "email": self.alerting.email_configured(),
                "email_to": self.alerting.email_to,
            },
            "schedules": self.schedules.cron,
        })
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// One directory per bucket under `local_root`.
    Local,
    S3,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub mode: StorageMode,
    pub local_root: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Result<Self, PipelineError> {
        let mode = match profiled_env_or(p, "STORAGE_MODE", "local").to_lowercase().as_str() {
            "local" => StorageMode::Local,
            "s3" => StorageMode::S3,
            "memory" => StorageMode::Memory,
            other => {
                return Err(PipelineError::Config(format!(
                    "STORAGE_MODE must be local, s3 or memory (got '{other}')"
                )))
            }
        };
        Ok(Self {
            mode,
            local_root: PathBuf::from(profiled_env_or(p, "STORAGE_ROOT", "data/buckets")),
        })
    }
}

// ── AWS / S3 ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: None,
        }
    }
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

// ── Buckets ───────────────────────────────────────────────────

/// Genome-center site ids known out of the box.
const DEFAULT_SITES: &[&str] = &["bcm", "bi", "jh", "rdr", "uw"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    pub genomic_set: String,
    /// Lower-cased site id → bucket name.
    pub genome_centers: BTreeMap<String, String>,
    pub gem: String,
    pub cvl: String,
    pub drc_broad: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            genomic_set: "genomic-set".into(),
            genome_centers: DEFAULT_SITES
                .iter()
                .map(|site| (site.to_string(), format!("gc-{site}")))
                .collect(),
            gem: "gem".into(),
            cvl: "cvl".into(),
            drc_broad: "drc-broad".into(),
        }
    }
}

impl BucketConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        let genome_centers = profiled_env_opt(p, "GC_BUCKETS")
            .map(|raw| parse_pairs(&raw))
            .filter(|m| !m.is_empty())
            .unwrap_or(defaults.genome_centers);
        Self {
            genomic_set: profiled_env_or(p, "GENOMIC_SET_BUCKET", &defaults.genomic_set),
            genome_centers,
            gem: profiled_env_or(p, "GEM_BUCKET", &defaults.gem),
            cvl: profiled_env_or(p, "CVL_BUCKET", &defaults.cvl),
            drc_broad: profiled_env_or(p, "DRC_BROAD_BUCKET", &defaults.drc_broad),
        }
    }

    /// Bucket of a genome-center site (case-insensitive).
    pub fn genome_center(&self, site: &str) -> Option<&str> {
        self.genome_centers.get(&site.to_lowercase()).map(String::as_str)
    }

    /// Every bucket a role maps to; genome centers expand to all sites.
    pub fn for_role(&self, role: BucketRole) -> Vec<&str> {
        match role {
            BucketRole::GenomicSet => vec![self.genomic_set.as_str()],
            BucketRole::GenomeCenter => {
                let mut buckets: Vec<&str> = self.genome_centers.values().map(String::as_str).collect();
                buckets.sort_unstable();
                buckets.dedup();
                buckets
            }
            BucketRole::Gem => vec![self.gem.as_str()],
            BucketRole::Cvl => vec![self.cvl.as_str()],
            BucketRole::DrcBroad => vec![self.drc_broad.as_str()],
        }
    }

    /// All distinct bucket names, used to build the storage gateway.
    pub fn all(&self) -> Vec<String> {
        let mut all: Vec<String> = vec![
            self.genomic_set.clone(),
            self.gem.clone(),
            self.cvl.clone(),
            self.drc_broad.clone(),
        ];
        all.extend(self.genome_centers.values().cloned());
        all.sort();
        all.dedup();
        all
    }
}

// ── Registry (PostgreSQL) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// `postgres://…`; absent means the in-memory registry.
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl RegistryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            database_url: profiled_env_opt(p, "DATABASE_URL"),
            max_connections: profiled_env_parse(p, "PG_MAX_CONNECTIONS", 5),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.database_url.is_some()
    }
}

// ── Business thresholds ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Contamination at or above this value is categorized.
    pub contamination_flag: f64,
    /// Contamination above this value needs an alternate sample.
    pub contamination_extract: f64,
    /// Inclusive numeric biobank-id range reserved for QC control pools.
    pub control_biobank_min: u64,
    pub control_biobank_max: u64,
    /// Prefix written before biobank ids in outbound manifests.
    pub biobank_prefix: String,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            contamination_flag: 0.01,
            contamination_extract: 0.03,
            control_biobank_min: 1,
            control_biobank_max: 99_999,
            biobank_prefix: "T".into(),
        }
    }
}

impl ThresholdConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            contamination_flag: profiled_env_parse(p, "CONTAMINATION_FLAG_THRESHOLD", d.contamination_flag),
            contamination_extract: profiled_env_parse(
                p,
                "CONTAMINATION_EXTRACT_THRESHOLD",
                d.contamination_extract,
            ),
            control_biobank_min: profiled_env_parse(p, "CONTROL_BIOBANK_MIN", d.control_biobank_min),
            control_biobank_max: profiled_env_parse(p, "CONTROL_BIOBANK_MAX", d.control_biobank_max),
            biobank_prefix: profiled_env_or(p, "BIOBANK_ID_PREFIX", &d.biobank_prefix),
        }
    }

    /// Whether a biobank id (with or without prefix) names a control sample.
    pub fn is_control_biobank_id(&self, biobank_id: &str) -> bool {
        let digits: String = biobank_id.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.parse::<u64>() {
            Ok(n) => (self.control_biobank_min..=self.control_biobank_max).contains(&n),
            Err(_) => false,
        }
    }
}

// ── Alerting ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    pub webhook_url: Option<String>,
    /// Bearer token sent with webhook posts (ticketing endpoints).
    pub webhook_token: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub email_from: Option<String>,
    pub email_to: Vec<String>,
}

impl AlertConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            webhook_url: profiled_env_opt(p, "ALERT_WEBHOOK_URL"),
            webhook_token: profiled_env_opt(p, "ALERT_WEBHOOK_TOKEN"),
            smtp_host: profiled_env_opt(p, "SMTP_HOST"),
            smtp_port: profiled_env_parse(p, "SMTP_PORT", 587),
            smtp_username: profiled_env_opt(p, "SMTP_USERNAME"),
            smtp_password: profiled_env_opt(p, "SMTP_PASSWORD"),
            email_from: profiled_env_opt(p, "ALERT_EMAIL_FROM"),
            email_to: profiled_env_opt(p, "ALERT_EMAIL_TO")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn email_configured(&self) -> bool {
        self.smtp_host.is_some() && self.email_from.is_some() && !self.email_to.is_empty()
    }
}

// ── Schedules ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Cron expression (with seconds) per job kind; kinds absent here are
    /// only run on demand.
    pub cron: BTreeMap<JobKind, String>,
}

fn default_schedule(kind: JobKind) -> &'static str {
    match kind {
        JobKind::NewParticipantWorkflow => "0 0 2 * * *",
        JobKind::Aw1Manifest
        | JobKind::Aw1fManifest
        | JobKind::Aw2Metrics
        | JobKind::GemA2Manifest
        | JobKind::CvlW2Manifest
        | JobKind::Aw1cManifest
        | JobKind::Aw1cfManifest
        | JobKind::Aw4ArrayManifest
        | JobKind::Aw4WgsManifest => "0 0 * * * *",
        JobKind::ReconcileArray | JobKind::ReconcileWgs => "0 30 * * * *",
        JobKind::GemA1Manifest
        | JobKind::GemA3Manifest
        | JobKind::CvlW1Manifest
        | JobKind::CvlW3Manifest
        | JobKind::Aw2fManifest
        | JobKind::Aw3ArrayManifest
        | JobKind::Aw3WgsManifest => "0 0 4 * * *",
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: JobKind::ALL
                .iter()
                .map(|kind| (*kind, default_schedule(*kind).to_string()))
                .collect(),
        }
    }
}

impl ScheduleConfig {
    /// `SCHEDULE_{JOB_KIND}` overrides a default; the value `off` disables it.
    fn from_env_profiled(p: &str) -> Self {
        let cron = JobKind::ALL
            .iter()
            .filter_map(|kind| {
                let expr = profiled_env_or(p, &format!("SCHEDULE_{}", kind.as_str()), default_schedule(*kind));
                (!expr.eq_ignore_ascii_case("off")).then(|| (*kind, expr))
            })
            .collect();
        Self { cron }
    }
}
