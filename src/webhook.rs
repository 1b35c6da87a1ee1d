use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

/// Posts plain-text messages into a chat room through its incoming webhook.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, webhook_url: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: Client,
}

impl WebhookClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("shoujin-notifier/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build webhook client")?;
        Ok(Self { http })
    }

    pub fn build_request(&self, webhook_url: &str, text: &str) -> Result<reqwest::Request> {
        self.http
            .post(webhook_url)
            .json(&json!({ "text": text }))
            .build()
            .context("failed to build webhook request")
    }
}

#[async_trait]
impl Notifier for WebhookClient {
    async fn post(&self, webhook_url: &str, text: &str) -> Result<()> {
        let request = self.build_request(webhook_url, text)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach webhook")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("webhook error {}: {}", status, body));
        }
        info!(chars = text.len(), "posted to webhook");
        Ok(())
    }
}

/// Post and log a failure instead of returning it.
pub async fn notify_best_effort(notifier: &dyn Notifier, webhook_url: &str, text: &str) -> bool {
    match notifier.post(webhook_url, text).await {
        Ok(()) => true,
        Err(err) => {
            warn!(?err, "webhook notification failed");
            false
        }
    }
}
