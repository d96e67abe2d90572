use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::record::{RawRecord, RecordEntry};
use super::source::SourceKind;
use crate::errors::{RelayError, Result};
use crate::i18n::MessageTable;

/// Default poll interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 500;

/// Size changes beyond this magnitude are rendered with strong emphasis.
pub const DEFAULT_DIFF_THRESHOLD: i64 = 1000;

/// Accounts whose activity is never relayed unless `bots` is overridden.
pub const DEFAULT_BOTS: [&str; 4] = ["Wikia", "WikiaBot", "Fandom", "FandomBot"];

/// Whole relay configuration: site name -> site settings.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(flatten)]
    pub sites: BTreeMap<String, SiteConfig>,
}

/// Settings for a single watched site, as written in the config file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// Full `api.php` URL. Derived from the site name when absent.
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Source aliases (`rc`, `log`, `abuselog`, `newwikis`, ...).
    #[serde(default)]
    pub fetch: Option<Vec<String>>,
    #[serde(default)]
    pub bots: Option<Vec<String>>,
    #[serde(default, rename = "excludeuser")]
    pub exclude_user: Option<String>,
    #[serde(default, rename = "excludefilter")]
    pub exclude_filter: Vec<u64>,
    /// Log types to relay; all types when absent.
    #[serde(default)]
    pub logs: Option<Vec<String>>,
    /// Poll interval in milliseconds.
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub welcome: bool,
    #[serde(default)]
    pub diff_threshold: Option<i64>,
    #[serde(default)]
    pub transport: Option<SinkConfig>,
    #[serde(default)]
    pub transports: Vec<SinkConfig>,
}

/// A delivery destination.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Discord webhook, given either as a full URL or as `id` + `token`.
    Discord {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        token: Option<String>,
    },
    /// Slack incoming webhook.
    Slack { url: String },
    /// Desktop notification through `notify-send`.
    Notifications {
        #[serde(default)]
        title: Option<String>,
    },
}

/// A watched site with its configuration resolved.
///
/// Immutable once built; the mutable per-site state (watermarks, thread cache)
/// is owned by the site's pipeline.
#[derive(Debug)]
pub struct Site {
    pub name: String,
    pub api_url: String,
    pub language: String,
    pub strings: Arc<MessageTable>,
    pub bots: HashSet<String>,
    pub excluded_filters: HashSet<u64>,
    pub excluded_user: Option<String>,
    pub log_types: Option<HashSet<String>>,
    pub interval: Duration,
    pub sources: Vec<SourceKind>,
    pub sinks: Vec<SinkConfig>,
    pub welcome: bool,
    pub diff_threshold: i64,
}

impl Site {
    /// Resolve a [`SiteConfig`] into a runnable site.
    ///
    /// Unknown source aliases and a missing transport are configuration errors.
    pub fn from_config(name: &str, config: &SiteConfig, default_language: &str) -> Result<Self> {
        let mut sources = Vec::new();
        match &config.fetch {
            Some(aliases) => {
                for alias in aliases {
                    let kind: SourceKind = alias.parse()?;
                    if !sources.contains(&kind) {
                        sources.push(kind);
                    }
                }
            }
            None => sources.extend([SourceKind::RecentChanges, SourceKind::LogEvents]),
        }

        let mut sinks: Vec<SinkConfig> = config.transport.iter().cloned().collect();
        sinks.extend(config.transports.iter().cloned());
        if sinks.is_empty() {
            return Err(RelayError::Config(format!(
                "site '{}' has no transport configured",
                name
            )));
        }

        let language = config
            .language
            .clone()
            .unwrap_or_else(|| default_language.to_string());
        let strings = Arc::new(MessageTable::for_language(&language));

        let bots = match &config.bots {
            Some(bots) => bots.iter().cloned().collect(),
            None => DEFAULT_BOTS.iter().map(|b| b.to_string()).collect(),
        };

        Ok(Self {
            name: name.to_string(),
            api_url: config.api.clone().unwrap_or_else(|| default_api_url(name)),
            language,
            strings,
            bots,
            excluded_filters: config.exclude_filter.iter().copied().collect(),
            excluded_user: config.exclude_user.clone(),
            log_types: config
                .logs
                .as_ref()
                .map(|logs| logs.iter().cloned().collect()),
            interval: Duration::from_millis(config.interval.unwrap_or(DEFAULT_INTERVAL_MS)),
            sources,
            sinks,
            welcome: config.welcome,
            diff_threshold: config.diff_threshold.unwrap_or(DEFAULT_DIFF_THRESHOLD),
        })
    }

    pub fn is_bot(&self, user: &str) -> bool {
        self.bots.contains(user)
    }

    pub fn is_filter_excluded(&self, filter_id: u64) -> bool {
        self.excluded_filters.contains(&filter_id)
    }

    /// Whether the log allow-list (if any) admits `log_type`.
    pub fn allows_log_type(&self, log_type: &str) -> bool {
        self.log_types
            .as_ref()
            .map_or(true, |types| types.contains(log_type))
    }

    /// Whether a record is suppressed by this site's exclusion rules.
    pub fn excludes(&self, record: &RawRecord) -> bool {
        match &record.entry {
            RecordEntry::Change(change) => self.is_bot(&change.user),
            RecordEntry::Log(log) => self.is_bot(&log.user) || !self.allows_log_type(&log.log_type),
            RecordEntry::Abuse(abuse) => abuse
                .filter_id()
                .map_or(false, |id| self.is_filter_excluded(id)),
            RecordEntry::Registry(_) => false,
            RecordEntry::Unknown { .. } => record
                .raw_user()
                .map_or(false, |user| self.is_bot(user)),
        }
    }
}

/// Sites given by bare subdomain live on the wiki farm; anything with a dot is
/// taken as a full host name.
fn default_api_url(name: &str) -> String {
    if name.contains('.') {
        format!("https://{}/api.php", name)
    } else {
        format!("https://{}.fandom.com/api.php", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SiteConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse(r#"{"transport": {"platform": "slack", "url": "https://hooks.example/x"}}"#);
        let site = Site::from_config("dev", &config, "en").unwrap();

        assert_eq!(site.api_url, "https://dev.fandom.com/api.php");
        assert_eq!(
            site.sources,
            vec![SourceKind::RecentChanges, SourceKind::LogEvents]
        );
        assert_eq!(site.interval, Duration::from_millis(DEFAULT_INTERVAL_MS));
        assert!(site.is_bot("FandomBot"));
        assert!(!site.is_bot("Someone"));
        assert_eq!(site.diff_threshold, DEFAULT_DIFF_THRESHOLD);
        assert!(site.allows_log_type("block"));
    }

    #[test]
    fn test_fetch_aliases_deduplicated() {
        let config = parse(
            r#"{
                "fetch": ["rc", "recentchanges", "al", "newwikis"],
                "transports": [{"platform": "notifications"}]
            }"#,
        );
        let site = Site::from_config("dev", &config, "en").unwrap();
        assert_eq!(
            site.sources,
            vec![
                SourceKind::RecentChanges,
                SourceKind::AbuseLog,
                SourceKind::NewWikis
            ]
        );
    }

    #[test]
    fn test_missing_transport_is_rejected() {
        let err = Site::from_config("dev", &parse("{}"), "en").unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let config = parse(
            r#"{
                "api": "https://wiki.example.org/w/api.php",
                "bots": ["HelperBot"],
                "excludefilter": [3, 7],
                "logs": ["block", "delete"],
                "interval": 2000,
                "diffThreshold": 250,
                "transport": {"platform": "discord", "id": "1", "token": "t"}
            }"#,
        );
        let site = Site::from_config("wiki.example.org", &config, "en").unwrap();

        assert_eq!(site.api_url, "https://wiki.example.org/w/api.php");
        assert!(site.is_bot("HelperBot"));
        assert!(!site.is_bot("FandomBot"));
        assert!(site.is_filter_excluded(7));
        assert!(!site.allows_log_type("move"));
        assert_eq!(site.interval, Duration::from_secs(2));
        assert_eq!(site.diff_threshold, 250);
    }

    #[test]
    fn test_relay_config_is_keyed_by_site() {
        let config: RelayConfig = serde_json::from_str(
            r#"{
                "dev": {"transport": {"platform": "notifications"}},
                "community": {"language": "de", "transport": {"platform": "notifications"}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites["community"].language.as_deref(), Some("de"));
    }
}
