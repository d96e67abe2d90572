use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// The feeds a site can be polled for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// `list=recentchanges`, the activity feed.
    RecentChanges,
    /// `list=logevents`, the moderation log.
    LogEvents,
    /// `list=abuselog`, abuse filter hits.
    AbuseLog,
    /// `list=wkdomains`, the registry of newly created sites.
    NewWikis,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::RecentChanges,
        SourceKind::LogEvents,
        SourceKind::AbuseLog,
        SourceKind::NewWikis,
    ];

    /// The `list=` module name, which is also the response field holding the records.
    pub fn list_name(&self) -> &'static str {
        match self {
            Self::RecentChanges => "recentchanges",
            Self::LogEvents => "logevents",
            Self::AbuseLog => "abuselog",
            Self::NewWikis => "wkdomains",
        }
    }

    /// Whether the watermark for this source is an offset rather than a timestamp.
    pub fn is_offset_based(&self) -> bool {
        matches!(self, Self::NewWikis)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.list_name())
    }
}

impl FromStr for SourceKind {
    type Err = RelayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rc" | "recent changes" | "recentchanges" => Ok(Self::RecentChanges),
            "log" | "logevents" => Ok(Self::LogEvents),
            "abuselog" | "al" | "abuse log" => Ok(Self::AbuseLog),
            "newwikis" | "wkdomains" => Ok(Self::NewWikis),
            other => Err(RelayError::Config(format!("unknown fetch source '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve() {
        assert_eq!("rc".parse::<SourceKind>().unwrap(), SourceKind::RecentChanges);
        assert_eq!(
            "recent changes".parse::<SourceKind>().unwrap(),
            SourceKind::RecentChanges
        );
        assert_eq!("log".parse::<SourceKind>().unwrap(), SourceKind::LogEvents);
        assert_eq!("AL".parse::<SourceKind>().unwrap(), SourceKind::AbuseLog);
        assert_eq!("abuse log".parse::<SourceKind>().unwrap(), SourceKind::AbuseLog);
        assert_eq!("newwikis".parse::<SourceKind>().unwrap(), SourceKind::NewWikis);
    }

    #[test]
    fn test_unknown_alias_is_config_error() {
        let err = "chat".parse::<SourceKind>().unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_only_registry_is_offset_based() {
        let offset_based: Vec<_> = SourceKind::ALL
            .iter()
            .filter(|k| k.is_offset_based())
            .collect();
        assert_eq!(offset_based, vec![&SourceKind::NewWikis]);
    }
}
