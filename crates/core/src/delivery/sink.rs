//! Delivery destinations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;

use super::transport::{DeliveryOutcome, WebhookTransport};
use crate::errors::{RelayError, Result};
use crate::models::SinkConfig;
use crate::template::{DiscordRenderer, PlainRenderer, Renderer, SlackRenderer};

/// Discord rejects messages longer than this.
const DISCORD_MAX_CONTENT: usize = 2000;

/// A destination together with the dialect it speaks.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Name used in logs. Never contains credentials.
    fn id(&self) -> String;

    fn renderer(&self) -> &dyn Renderer;

    async fn deliver(&self, text: &str) -> Result<DeliveryOutcome>;
}

pub struct DiscordSink {
    url: String,
    transport: Arc<dyn WebhookTransport>,
}

impl DiscordSink {
    pub fn new(url: impl Into<String>, transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            url: url.into(),
            transport,
        }
    }
}

#[async_trait]
impl Sink for DiscordSink {
    fn id(&self) -> String {
        "discord".to_string()
    }

    fn renderer(&self) -> &dyn Renderer {
        &DiscordRenderer
    }

    async fn deliver(&self, text: &str) -> Result<DeliveryOutcome> {
        let content: String = text.chars().take(DISCORD_MAX_CONTENT).collect();
        let body = json!({
            "content": content,
            "allowed_mentions": {"parse": []},
        });
        self.transport.post_json(&self.url, &body).await
    }
}

pub struct SlackSink {
    url: String,
    transport: Arc<dyn WebhookTransport>,
}

impl SlackSink {
    pub fn new(url: impl Into<String>, transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            url: url.into(),
            transport,
        }
    }
}

#[async_trait]
impl Sink for SlackSink {
    fn id(&self) -> String {
        "slack".to_string()
    }

    fn renderer(&self) -> &dyn Renderer {
        &SlackRenderer
    }

    async fn deliver(&self, text: &str) -> Result<DeliveryOutcome> {
        let body = json!({
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        self.transport.post_json(&self.url, &body).await
    }
}

/// Desktop notification through `notify-send`.
pub struct DesktopSink {
    title: String,
}

impl DesktopSink {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

#[async_trait]
impl Sink for DesktopSink {
    fn id(&self) -> String {
        "notifications".to_string()
    }

    fn renderer(&self) -> &dyn Renderer {
        &PlainRenderer
    }

    async fn deliver(&self, text: &str) -> Result<DeliveryOutcome> {
        let status = Command::new("notify-send")
            .arg(&self.title)
            .arg(text)
            .status()
            .await
            .map_err(|e| RelayError::Delivery {
                sink: self.id(),
                message: e.to_string(),
            })?;

        if status.success() {
            Ok(DeliveryOutcome::Delivered)
        } else {
            Err(RelayError::Delivery {
                sink: self.id(),
                message: format!("notify-send exited with {}", status),
            })
        }
    }
}

/// Build a sink from its configuration.
pub fn build_sink(
    config: &SinkConfig,
    site: &str,
    transport: Arc<dyn WebhookTransport>,
) -> Result<Arc<dyn Sink>> {
    let sink: Arc<dyn Sink> = match config {
        SinkConfig::Discord { url, id, token } => {
            let url = match (url, id, token) {
                (Some(url), _, _) => url.clone(),
                (None, Some(id), Some(token)) => {
                    format!("https://discord.com/api/webhooks/{}/{}", id, token)
                }
                _ => {
                    return Err(RelayError::Config(format!(
                        "site '{}': discord transport needs 'url' or 'id' and 'token'",
                        site
                    )))
                }
            };
            Arc::new(DiscordSink::new(url, transport))
        }
        SinkConfig::Slack { url } => Arc::new(SlackSink::new(url.clone(), transport)),
        SinkConfig::Notifications { title } => Arc::new(DesktopSink::new(
            title.clone().unwrap_or_else(|| site.to_string()),
        )),
    };
    Ok(sink)
}
