//! Genomic manifest pipeline.
//!
//! Ingests manifests dropped by genome centers and partner sites, keeps
//! each sample's workflow state in the registry, reconciles reported
//! metrics against delivered data files and generates the outbound
//! manifests. Every unit of work runs as a job through [`JobController`].

pub mod alerts;
pub mod contamination;
pub mod context;
pub mod controller;
pub mod generate;
pub mod ingest;
pub mod reconcile;
pub mod scheduler;
pub mod table;

pub use context::JobContext;
pub use controller::{JobController, JobOutcome, JobParams, JobPlan};
pub use generate::GeneratedManifest;
pub use ingest::ObjectTarget;
pub use scheduler::Scheduler;
