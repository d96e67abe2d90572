//! Raw API records, one shape per source.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::source::SourceKind;
use crate::errors::{RelayError, Result};

/// One entry from a feed, parsed into its source shape but still carrying the
/// untouched JSON so unknown shapes can be passed through verbatim.
#[derive(Clone, Debug)]
pub struct RawRecord {
    pub source: SourceKind,
    pub entry: RecordEntry,
    pub raw: Value,
}

#[derive(Clone, Debug)]
pub enum RecordEntry {
    Change(ChangeRecord),
    Log(LogRecord),
    Abuse(AbuseRecord),
    Registry(RegistryRecord),
    /// Did not match its source's shape. Relayed as a pass-through event.
    Unknown { timestamp: Option<DateTime<Utc>> },
}

impl RawRecord {
    /// Parse one element of a timestamped list (`recentchanges`, `logevents`, `abuselog`).
    pub fn parse(source: SourceKind, raw: Value) -> Result<Self> {
        let entry = match source {
            SourceKind::RecentChanges => RecordEntry::Change(serde_json::from_value(raw.clone())?),
            SourceKind::LogEvents => RecordEntry::Log(serde_json::from_value(raw.clone())?),
            SourceKind::AbuseLog => RecordEntry::Abuse(serde_json::from_value(raw.clone())?),
            SourceKind::NewWikis => RecordEntry::Registry(serde_json::from_value(raw.clone())?),
        };
        Ok(Self { source, entry, raw })
    }

    /// Like [`RawRecord::parse`], but a record that does not fit its source's
    /// shape is kept as [`RecordEntry::Unknown`] with whatever timestamp it has.
    pub fn read(source: SourceKind, raw: Value) -> Self {
        match Self::parse(source, raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                debug!("Unrecognized {} record shape: {}", source, e);
                let timestamp = raw
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                    .map(|ts| ts.with_timezone(&Utc));
                Self {
                    source,
                    entry: RecordEntry::Unknown { timestamp },
                    raw,
                }
            }
        }
    }

    /// The acting user as found in the raw JSON, whatever the shape.
    pub fn raw_user(&self) -> Option<&str> {
        self.raw.get("user").and_then(Value::as_str)
    }

    /// The ordering key of timestamped records; `None` for registry entries,
    /// whose order is their position in the registry.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.entry {
            RecordEntry::Change(r) => Some(r.timestamp),
            RecordEntry::Log(r) => Some(r.timestamp),
            RecordEntry::Abuse(r) => Some(r.timestamp),
            RecordEntry::Registry(_) => None,
            RecordEntry::Unknown { timestamp } => *timestamp,
        }
    }

    /// The serialized form used by pass-through events.
    pub fn to_json(&self) -> String {
        self.raw.to_string()
    }
}

/// An activity-feed entry (`list=recentchanges`).
#[derive(Clone, Debug, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "type")]
    pub change_type: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ns: i64,
    #[serde(default)]
    pub oldlen: i64,
    #[serde(default)]
    pub newlen: i64,
    #[serde(default)]
    pub revid: u64,
    #[serde(default)]
    pub comment: String,
    pub timestamp: DateTime<Utc>,
    /// Numeric on some farms, a string on others.
    #[serde(default)]
    pub logtype: Option<Value>,
    #[serde(default)]
    pub logaction: Option<String>,
}

impl ChangeRecord {
    pub fn size_delta(&self) -> i64 {
        self.newlen - self.oldlen
    }

    pub fn logtype_str(&self) -> Option<String> {
        self.logtype.as_ref().map(value_to_string)
    }
}

/// A moderation-log entry (`list=logevents`).
///
/// Action specific details arrive either in legacy keyed objects (`block`,
/// `move`, `rights`) or positional keys (`"0"`, `"1"`, ...), or in the
/// modern `params` object; all of them are kept in `details`.
#[derive(Clone, Debug, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "type")]
    pub log_type: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ns: i64,
    #[serde(default)]
    pub comment: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl LogRecord {
    /// Look a nested detail up by path, rendered as a string.
    pub fn detail(&self, path: &[&str]) -> Option<String> {
        let (first, rest) = path.split_first()?;
        let mut current = self.details.get(*first)?;
        for key in rest {
            current = current.get(*key)?;
        }
        match current {
            Value::Null => None,
            other => Some(value_to_string(other)),
        }
    }

    /// First present detail among several candidate paths, or an empty string.
    pub fn detail_or_empty(&self, paths: &[&[&str]]) -> String {
        paths
            .iter()
            .find_map(|path| self.detail(path))
            .unwrap_or_default()
    }
}

/// An abuse filter hit (`list=abuselog`).
#[derive(Clone, Debug, Deserialize)]
pub struct AbuseRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub filter_id: Value,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub result: String,
    pub timestamp: DateTime<Utc>,
}

impl AbuseRecord {
    /// Filter ids come back as strings or numbers; global filters are not numeric.
    pub fn filter_id(&self) -> Option<u64> {
        match &self.filter_id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn filter_id_str(&self) -> String {
        value_to_string(&self.filter_id)
    }
}

/// A newly registered site (`list=wkdomains`).
#[derive(Clone, Debug, Deserialize)]
pub struct RegistryRecord {
    #[serde(default)]
    pub id: Option<Value>,
    pub domain: String,
}

/// Parse the registry list, which is either a JSON array or an object keyed by
/// registry id. Object entries are returned in ascending id order.
pub fn registry_entries(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => {
            let mut keyed: Vec<(u64, &Value)> = map
                .iter()
                .map(|(k, v)| (k.parse::<u64>().unwrap_or(u64::MAX), v))
                .collect();
            keyed.sort_by_key(|(id, _)| *id);
            Ok(keyed.into_iter().map(|(_, v)| v.clone()).collect())
        }
        _ => Err(RelayError::malformed(
            SourceKind::NewWikis.list_name(),
            "expected a list or an object",
        )),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_change_record() {
        let record = RawRecord::parse(
            SourceKind::RecentChanges,
            json!({
                "type": "edit", "user": "Alice", "title": "Main Page", "ns": 0,
                "oldlen": 120, "newlen": 100, "revid": 42, "comment": "fix",
                "timestamp": "2024-03-01T10:00:00Z"
            }),
        )
        .unwrap();

        match &record.entry {
            RecordEntry::Change(change) => {
                assert_eq!(change.size_delta(), -20);
                assert_eq!(change.revid, 42);
            }
            other => panic!("unexpected entry {:?}", other),
        }
        assert!(record.timestamp().is_some());
    }

    #[test]
    fn test_log_details_legacy_and_modern() {
        let legacy: LogRecord = serde_json::from_value(json!({
            "type": "block", "action": "block", "user": "Admin", "title": "User:X",
            "timestamp": "2024-03-01T10:00:00Z",
            "block": {"duration": "1 week", "flags": "noemail"},
            "0": "positional"
        }))
        .unwrap();
        assert_eq!(legacy.detail(&["block", "duration"]).as_deref(), Some("1 week"));
        assert_eq!(legacy.detail(&["0"]).as_deref(), Some("positional"));

        let modern: LogRecord = serde_json::from_value(json!({
            "type": "block", "action": "block", "user": "Admin", "title": "User:X",
            "timestamp": "2024-03-01T10:00:00Z",
            "params": {"duration": "infinite", "flags": ["nocreate", "noemail"]}
        }))
        .unwrap();
        assert_eq!(
            modern.detail_or_empty(&[&["block", "flags"], &["params", "flags"]]),
            "nocreate, noemail"
        );
        assert_eq!(modern.detail_or_empty(&[&["block", "reason"]]), "");
    }

    #[test]
    fn test_abuse_filter_id_forms() {
        let numeric: AbuseRecord = serde_json::from_value(json!({
            "filter_id": 12, "timestamp": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(numeric.filter_id(), Some(12));

        let textual: AbuseRecord = serde_json::from_value(json!({
            "filter_id": "7", "timestamp": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(textual.filter_id(), Some(7));

        let global: AbuseRecord = serde_json::from_value(json!({
            "filter_id": "global-3", "timestamp": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(global.filter_id(), None);
        assert_eq!(global.filter_id_str(), "global-3");
    }

    #[test]
    fn test_registry_entries_object_sorted_by_id() {
        let entries = registry_entries(&json!({
            "12": {"domain": "b.fandom.com"},
            "3": {"domain": "a.fandom.com"}
        }))
        .unwrap();
        assert_eq!(entries[0]["domain"], "a.fandom.com");
        assert_eq!(entries[1]["domain"], "b.fandom.com");

        assert!(registry_entries(&json!("nope")).is_err());
    }

    #[test]
    fn test_missing_timestamp_is_rejected() {
        let err = RawRecord::parse(SourceKind::LogEvents, json!({"type": "block"})).unwrap_err();
        assert!(matches!(err, RelayError::Json(_)));
    }

    #[test]
    fn test_read_keeps_unknown_shapes() {
        let raw = json!({"user": "Alice", "title": "P", "ns": 0, "timestamp": "2024-03-01T10:00:00Z"});
        let record = RawRecord::read(SourceKind::RecentChanges, raw.clone());

        assert!(matches!(record.entry, RecordEntry::Unknown { .. }));
        assert_eq!(
            record.timestamp(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(record.raw, raw);
        assert_eq!(record.raw_user(), Some("Alice"));

        let untimed = RawRecord::read(SourceKind::LogEvents, json!({"type": "block"}));
        assert_eq!(untimed.timestamp(), None);
    }
}
