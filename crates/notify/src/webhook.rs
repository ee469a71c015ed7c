//! HTTP webhook notifier for chat and ticketing endpoints.

use crate::traits::{Notification, Notifier, NotifyError};

/// Posts each alert as JSON to one URL, optionally with a bearer token.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, token: Option<String>) -> Self {
        Self {
            url,
            token,
            client: reqwest::Client::new(),
        }
    }
}

/// Chat-style body with the rendered alert in `text`.
#[derive(Debug, serde::Serialize)]
struct WebhookPayload<'a> {
    text: String,
    alert_kind: &'a str,
    job_run_id: &'a str,
    bucket: &'a str,
}

impl<'a> From<&'a Notification> for WebhookPayload<'a> {
    fn from(n: &'a Notification) -> Self {
        Self {
            text: format!("*{}*\n{}", n.subject, n.body),
            alert_kind: &n.alert_kind,
            job_run_id: &n.job_run_id,
            bucket: &n.bucket,
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(&WebhookPayload::from(notification));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                url = %self.url,
                %status,
                alert_kind = %notification.alert_kind,
                "webhook rejected alert"
            );
            return Err(NotifyError::Delivery(format!("webhook returned {status}: {body}")));
        }

        tracing::debug!(url = %self.url, %status, "webhook alert delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}
