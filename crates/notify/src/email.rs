//! SMTP alert channel over `lettre`.

use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use genomic_core::config::AlertConfig;

use crate::traits::{Notification, Notifier, NotifyError};

/// Mails each alert to the configured operations list.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn mailbox(addr: &str) -> Result<Mailbox, NotifyError> {
    addr.parse()
        .map_err(|e: lettre::address::AddressError| NotifyError::Config(format!("{addr}: {e}")))
}

impl EmailNotifier {
    /// Port 25 is plain SMTP; any other port negotiates STARTTLS.
    pub fn from_alert_config(config: &AlertConfig) -> Result<Self, NotifyError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotifyError::Config("SMTP_HOST not set".to_string()))?;
        let from = config
            .email_from
            .as_deref()
            .ok_or_else(|| NotifyError::Config("ALERT_EMAIL_FROM not set".to_string()))?;
        let to = config
            .email_to
            .iter()
            .map(|addr| mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(NotifyError::Config("ALERT_EMAIL_TO has no recipients".to_string()));
        }

        let mut builder = if config.smtp_port == 25 {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
        }
        .port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: mailbox(from)?,
            to,
        })
    }

    fn compose(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let mut builder = Message::builder().from(self.from.clone());
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .subject(&notification.subject)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.compose(notification)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            alert_kind = %notification.alert_kind,
            job_run_id = %notification.job_run_id,
            recipients = self.to.len(),
            "alert mailed"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
