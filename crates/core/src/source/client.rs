//! `reqwest`-backed [`ApiClient`] for MediaWiki `api.php`.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;

use super::{ApiClient, QueryParams};
use crate::errors::{RelayError, Result};

pub struct MediaWikiClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl MediaWikiClient {
    pub fn new(url: impl Into<String>, timeout: Duration, user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ApiClient for MediaWikiClient {
    async fn query(&self, params: &QueryParams) -> Result<Value> {
        let mut request = self
            .client
            .get(&self.url)
            .query(&[("action", "query"), ("format", "json")]);
        for (key, value) in params {
            request = request.query(&[(key, value)]);
        }

        debug!("API request to {} with {} params", self.url, params.len());

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RelayError::Timeout(self.timeout)
            } else {
                RelayError::Network(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Network(format!("HTTP {} - {}", status, body)));
        }

        let body: Value = response.json().await?;
        unwrap_query(body)
    }
}

/// Turn a raw response into its `query` object.
fn unwrap_query(mut body: Value) -> Result<Value> {
    if let Some(error) = body.get("error") {
        let field = |name: &str| {
            error
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        return Err(RelayError::Api {
            code: field("code"),
            info: field("info"),
        });
    }

    match body.get_mut("query") {
        Some(query) if query.is_object() => Ok(query.take()),
        _ => Err(RelayError::malformed("query", "response has no query object")),
    }
}
