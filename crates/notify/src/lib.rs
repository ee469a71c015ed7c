//! Alert delivery for the genomic pipeline.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook and email notifier implementations
//! - Minijinja template rendering for alert messages
//! - Dispatcher that routes alerts to channels per alert kind

pub mod dispatcher;
pub mod email;
pub mod recording;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use recording::RecordingNotifier;
pub use templating::{AlertContext, AlertGroup, AlertMember, TemplateRenderer};
pub use traits::{Notification, Notifier, NotifyError};

impl From<NotifyError> for genomic_core::PipelineError {
    fn from(err: NotifyError) -> Self {
        genomic_core::PipelineError::Dependency(format!("notify: {err}"))
    }
}
