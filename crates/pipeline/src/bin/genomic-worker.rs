use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use genomic_core::{config::load_dotenv, JobKind, PipelineConfig};
use genomic_notify::Dispatcher;
use genomic_pipeline::{JobController, JobParams, JobPlan, Scheduler};
use genomic_registry::{MemoryRegistry, PgRegistry, Registry};
use genomic_storage::StorageGateway;

/// Genomic manifest pipeline worker.
///
/// Runs single jobs on demand or all configured jobs on their cron
/// schedules. Configuration comes from the environment (and `.env`).
#[derive(Parser, Debug)]
#[command(name = "genomic-worker", about = "Genomic manifest pipeline worker")]
struct Cli {
    /// Config profile; `{PROFILE}_{KEY}` env vars override `{KEY}`
    #[arg(long, env = "GENOMIC_PROFILE")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one job now, e.g. `run AW1_MANIFEST`
    Run {
        kind: JobKind,
        /// Bucket of a single object to ingest (requires --path)
        #[arg(long, requires = "path")]
        bucket: Option<String>,
        /// Object path within --bucket
        #[arg(long, requires = "bucket")]
        path: Option<String>,
        /// Run timestamp (RFC 3339); defaults to now
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
    /// Run every configured job on its cron schedule until interrupted
    Schedule,
    /// List job kinds with their plan and schedule
    ListKinds,
    /// Print the effective configuration with secrets redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.profile {
        Some(profile) => PipelineConfig::for_profile(profile),
        None => PipelineConfig::from_env(),
    }
    .context("failed to load configuration")?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
            return Ok(());
        }
        Command::ListKinds => {
            for kind in JobKind::ALL {
                let schedule = config.schedules.cron.get(kind).map(String::as_str).unwrap_or("on demand");
                println!("{kind:<28} {:<40} {schedule}", format!("{:?}", JobPlan::of(*kind)));
            }
            return Ok(());
        }
        _ => {}
    }

    config.log_summary();
    let controller = Arc::new(build_controller(config).await?);

    match cli.command {
        Command::Run {
            kind,
            bucket,
            path,
            as_of,
        } => {
            let mut params = as_of.map(JobParams::at).unwrap_or_default();
            if let (Some(bucket), Some(path)) = (bucket, path) {
                params = params.with_target(bucket, path);
            }
            let outcome = controller
                .run(kind, params)
                .await
                .with_context(|| format!("job {kind} failed"))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Schedule => {
            let scheduler = Scheduler::new(controller);
            tokio::select! {
                _ = scheduler.run() => {}
                _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
            }
        }
        Command::ListKinds | Command::Config => {}
    }
    Ok(())
}

async fn build_controller(config: PipelineConfig) -> Result<JobController> {
    let registry: Arc<dyn Registry> = if config.registry.is_configured() {
        Arc::new(
            PgRegistry::connect(&config.registry)
                .await
                .context("failed to connect to registry database")?,
        )
    } else {
        info!("no DATABASE_URL; using in-memory registry");
        Arc::new(MemoryRegistry::new())
    };
    let storage = StorageGateway::from_config(&config).context("failed to open storage buckets")?;
    let dispatcher = Dispatcher::from_config(&config.alerting).context("failed to configure alert channels")?;
    Ok(JobController::new(config, registry, storage, dispatcher))
}
