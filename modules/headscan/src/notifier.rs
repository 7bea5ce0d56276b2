use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

/// Best-effort operator notifications. Implementations log failures and
/// never return them; a lost message must not stop the pipeline.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Posts `{"text": ...}` to a Slack incoming webhook.
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, message: &str) {
        let body = serde_json::json!({ "text": message });
        let resp = self
            .client
            .post(&self.webhook_url)
            .timeout(Duration::from_secs(10))
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                let status = resp.status().as_u16();
                let text = resp.text().await.unwrap_or_default();
                warn!(status, body = %text, "Slack notification rejected");
            }
            Err(e) => warn!(error = %e, "Slack notification failed"),
        }
    }
}

/// Used when no webhook is configured; messages only reach the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        info!(message, "Notification");
    }
}

/// Slack when a webhook URL is configured, otherwise the log.
pub fn from_webhook(webhook_url: Option<&str>) -> Box<dyn Notifier> {
    match webhook_url {
        Some(url) => Box::new(SlackNotifier::new(url)),
        None => Box::new(LogNotifier),
    }
}
