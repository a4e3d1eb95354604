use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::error::Result;
use crate::metrics::ALERT_FAILURES;
use crate::models::AlertPayload;
use crate::rate_limit::WindowKind;

// Upper bound for one webhook call, so an outage can't pile up tasks
pub const ALERT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fire-and-forget webhook notifier for policy breaches.
///
/// Delivery runs on its own task: webhook latency or failure never reaches the
/// request that triggered it. Failures are logged and counted, never retried.
#[derive(Clone, Debug)]
pub struct AlertSink {
    client: reqwest::Client,
    webhook_url: Url,
}

impl AlertSink {
    pub fn new(webhook_url: Url) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(ALERT_TIMEOUT).build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }

    pub fn message(window: WindowKind) -> Option<&'static str> {
        match window {
            WindowKind::Minute => Some("每分钟下载上限告警 (per-minute limit reached)"),
            WindowKind::Hour => Some("每小时下载上限告警 (per-hour limit reached)"),
            WindowKind::None => None,
        }
    }

    /// Spawn delivery of the alert for `window`. The handle is only useful to tests.
    pub fn notify(&self, window: WindowKind) -> Option<JoinHandle<()>> {
        let content = Self::message(window)?;
        let sink = self.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = sink.send(content).await {
                ALERT_FAILURES.inc();
                warn!(window = window.as_str(), error = %e, "alert webhook failed");
            }
        }))
    }

    pub async fn send(&self, content: &str) -> std::result::Result<(), reqwest::Error> {
        let res = self
            .client
            .post(self.webhook_url.clone())
            .json(&AlertPayload::text(content))
            .send()
            .await?
            .error_for_status()?;

        let body = res.text().await.unwrap_or_default();
        debug!(response = %body, "alert delivered");
        Ok(())
    }
}
