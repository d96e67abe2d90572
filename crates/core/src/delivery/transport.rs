//! Webhook HTTP seam.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::errors::{RelayError, Result};

/// Delay used when a rate-limit response does not say how long to wait.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Longest delay a rate-limit answer can impose.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    RateLimited { retry_after: Duration },
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<DeliveryOutcome>;
}

/// `reqwest`-backed transport shared by all webhook sinks of a process.
pub struct HttpWebhookTransport {
    client: Client,
    timeout: Duration,
}

impl HttpWebhookTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, timeout }
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<DeliveryOutcome> {
        let response = self.client.post(url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                RelayError::Timeout(self.timeout)
            } else {
                RelayError::Delivery {
                    sink: "webhook".to_string(),
                    message: format!("Request failed: {}", e.without_url()),
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let header = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_seconds);
            let body = response.text().await.unwrap_or_default();
            let retry_after = header
                .or_else(|| retry_after_from_body(&body))
                .unwrap_or(DEFAULT_RETRY_AFTER);
            debug!("Webhook rate limited for {:?}", retry_after);
            return Ok(DeliveryOutcome::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Delivery {
                sink: "webhook".to_string(),
                message: format!("HTTP {} - {}", status, body),
            });
        }

        Ok(DeliveryOutcome::Delivered)
    }
}

fn parse_seconds(text: &str) -> Option<Duration> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.min(MAX_RETRY_AFTER.as_secs_f64()))
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// `retry_after` from a JSON error body, in seconds.
fn retry_after_from_body(body: &str) -> Option<Duration> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("retry_after")? {
        Value::Number(n) => n.as_f64().and_then(|s| parse_seconds(&s.to_string())),
        Value::String(s) => parse_seconds(s),
        _ => None,
    }
}
