//! Routes alerts to configured channels.
//!
//! Channels are registered per alert kind, with a default list used for
//! kinds that have none of their own. Individual channel failures don't
//! block other channels and never fail the caller.

use std::collections::HashMap;
use std::sync::Arc;

use genomic_core::config::AlertConfig;

use crate::email::EmailNotifier;
use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};
use crate::webhook::WebhookNotifier;

/// Dispatches notifications to multiple channels, organized per alert kind.
pub struct Dispatcher {
    /// Alert kind → channels for that kind.
    kind_channels: HashMap<String, Vec<Arc<dyn Notifier>>>,
    /// Fallback channels used when no kind-specific channels exist.
    default_channels: Vec<Arc<dyn Notifier>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn empty() -> Self {
        Self {
            kind_channels: HashMap::new(),
            default_channels: Vec::new(),
        }
    }

    /// Create a dispatcher with channels shared across all alert kinds.
    pub fn with_defaults(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            kind_channels: HashMap::new(),
            default_channels: channels,
        }
    }

    /// Webhook and/or email default channels from the alerting config.
    pub fn from_config(config: &AlertConfig) -> Result<Self, NotifyError> {
        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Some(url) = &config.webhook_url {
            channels.push(Arc::new(WebhookNotifier::new(url.clone(), config.webhook_token.clone())));
        }
        if config.email_configured() {
            channels.push(Arc::new(EmailNotifier::from_alert_config(config)?));
        }
        if channels.is_empty() {
            tracing::warn!("No alert channels configured; alerts will only be logged");
        }
        Ok(Self::with_defaults(channels))
    }

    /// Replace all channels for a specific alert kind.
    pub fn set_kind_channels(&mut self, kind: impl Into<String>, channels: Vec<Arc<dyn Notifier>>) {
        self.kind_channels.insert(kind.into(), channels);
    }

    pub fn channel_count(&self, kind: &str) -> usize {
        self.kind_channels.get(kind).unwrap_or(&self.default_channels).len()
    }

    /// Dispatch a notification for an alert kind to all its channels.
    pub async fn dispatch(&self, kind: &str, notification: &Notification) -> Vec<DispatchResult> {
        let channels = self.kind_channels.get(kind).unwrap_or(&self.default_channels);

        if channels.is_empty() {
            tracing::debug!(kind, subject = %notification.subject, "No notification channels configured");
            return Vec::new();
        }

        let job_run_id = &notification.job_run_id;
        let mut results = Vec::with_capacity(channels.len());

        for channel in channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        kind,
                        channel = channel.channel_name(),
                        job_run_id = %job_run_id,
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        kind,
                        channel = channel.channel_name(),
                        job_run_id = %job_run_id,
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                job_run_id: job_run_id.clone(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}
