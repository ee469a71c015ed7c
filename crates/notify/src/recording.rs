use std::sync::Mutex;

use crate::traits::{Notification, Notifier, NotifyError};

/// Channel that keeps every notification in memory.
///
/// Used by dry runs and tests to observe exactly what would have been sent.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    name: String,
    fail: bool,
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A channel whose every delivery fails after being recorded.
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        if self.fail {
            return Err(NotifyError::Delivery(format!("{} is set to fail", self.name)));
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        &self.name
    }
}
