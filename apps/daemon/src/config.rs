use std::path::PathBuf;
use std::time::Duration;

use wikirelay_core::scheduler::DEFAULT_REQUEST_TIMEOUT;

/// Output format of the process log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Process settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub cache_path: PathBuf,
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Language used by sites that do not set their own.
    pub language: String,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let request_timeout = lookup("WR_REQUEST_TIMEOUT_MS")
            .and_then(|ms| ms.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        Self {
            config_path: lookup("WR_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.json")),
            cache_path: lookup("WR_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("cache.json")),
            request_timeout,
            user_agent: lookup("WR_USER_AGENT").unwrap_or_else(default_user_agent),
            language: lookup("WR_LANGUAGE").unwrap_or_else(|| "en".to_string()),
            log_format: lookup("WR_LOG_FORMAT")
                .map(|format| LogFormat::parse(&format))
                .unwrap_or(LogFormat::Text),
        }
    }
}

fn default_user_agent() -> String {
    format!("wikirelay/{}", env!("CARGO_PKG_VERSION"))
}
