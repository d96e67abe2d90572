//! Error types and retry classification for the relay.
//!
//! This module provides:
//! - [`RelayError`]: The error enum shared by fetchers, sinks and the scheduler
//! - [`RetryClass`]: Classification for determining what happens after a failure

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use thiserror::Error;

/// Type alias for Result using [`RelayError`].
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can occur while polling, rendering or delivering.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A required response field is missing or has the wrong shape.
    #[error("Malformed response from {source_kind}: {message}")]
    MalformedResponse {
        /// The source (or request) that produced the response
        source_kind: String,
        /// What was wrong with it
        message: String,
    },

    /// The API answered with an `error` object.
    #[error("API error: {code}: {info}")]
    Api {
        /// MediaWiki error code
        code: String,
        /// Human readable description
        info: String,
    },

    /// The request never produced a usable HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not finish within the configured bound.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A sink rejected the message with a rate-limit response.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Delay requested by the server
        retry_after: Duration,
    },

    /// A sink rejected the message for any other reason.
    #[error("Delivery to {sink} failed: {message}")]
    Delivery {
        /// The sink that failed
        sink: String,
        /// Status line or transport error
        message: String,
    },

    /// The site configuration cannot be used.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A message key has no entry in the site's string table.
    #[error("Message '{0}' is missing from the string table")]
    UnknownMessage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Shorthand for [`RelayError::MalformedResponse`].
    pub fn malformed(source_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            source_kind: source_kind.into(),
            message: message.into(),
        }
    }

    /// Returns the retry classification for this error.
    ///
    /// ```
    /// use std::time::Duration;
    /// use wikirelay_core::errors::{RelayError, RetryClass};
    ///
    /// let error = RelayError::RateLimited { retry_after: Duration::from_secs(2) };
    /// assert_eq!(error.retry_class(), RetryClass::Requeue);
    ///
    /// let error = RelayError::Network("connection reset".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::NextTick);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::MalformedResponse { .. }
            | Self::Api { .. }
            | Self::Network(_)
            | Self::Timeout(_)
            | Self::Json(_) => RetryClass::NextTick,

            Self::RateLimited { .. } => RetryClass::Requeue,

            Self::Delivery { .. } | Self::UnknownMessage(_) => RetryClass::Drop,

            Self::Config(_) => RetryClass::Fatal,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed("http", err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_response_retries_next_tick() {
        let error = RelayError::malformed("recentchanges", "missing list");
        assert_eq!(error.retry_class(), RetryClass::NextTick);
    }

    #[test]
    fn test_network_and_timeout_retry_next_tick() {
        assert_eq!(
            RelayError::Network("reset".to_string()).retry_class(),
            RetryClass::NextTick
        );
        assert_eq!(
            RelayError::Timeout(Duration::from_secs(30)).retry_class(),
            RetryClass::NextTick
        );
    }

    #[test]
    fn test_rate_limited_requeues() {
        let error = RelayError::RateLimited {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(error.retry_class(), RetryClass::Requeue);
    }

    #[test]
    fn test_delivery_failure_is_dropped() {
        let error = RelayError::Delivery {
            sink: "discord".to_string(),
            message: "HTTP 400".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Drop);
    }

    #[test]
    fn test_config_error_is_fatal() {
        let error = RelayError::Config("no sinks".to_string());
        assert_eq!(error.retry_class(), RetryClass::Fatal);
    }

    #[test]
    fn test_error_display() {
        let error = RelayError::malformed("logevents", "expected a list");
        assert_eq!(
            format!("{}", error),
            "Malformed response from logevents: expected a list"
        );

        let error = RelayError::Api {
            code: "readapidenied".to_string(),
            info: "You need read permission".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "API error: readapidenied: You need read permission"
        );
    }
}
