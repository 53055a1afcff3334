//! Webhook delivery of operational notifications.

use std::time::Duration;

use agritrace_common::{NotificationEvent, Notifier, NotifyError};
use async_trait::async_trait;
use tracing::debug;

/// POSTs each notification as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("agritrace-node/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        debug!(event_type = %event.event_type, url = %self.url, "Posting notification");

        let resp = self
            .client
            .post(&self.url)
            .json(&event)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("HTTP error: {e}")))?;

        if !resp.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "webhook returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
