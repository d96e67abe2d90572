//! `list=logevents`, the moderation log.

use async_trait::async_trait;

use super::{
    fetch_list, format_timestamp, timestamped_batch, ApiClient, FetchBatch, QueryParams,
    SourceFetcher, PAGE_LIMIT,
};
use crate::errors::Result;
use crate::models::{Site, SourceKind};
use crate::watermark::Watermark;

const LE_PROP: &str = "ids|title|type|user|timestamp|comment|details|tags";

pub struct LogEventsFetcher;

impl LogEventsFetcher {
    fn params(site: &Site, watermark: Option<Watermark>) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("leprop", LE_PROP.to_string());
        params.insert("lelimit", PAGE_LIMIT.to_string());
        if let Some(ts) = watermark.and_then(|w| w.as_timestamp()) {
            params.insert("leend", format_timestamp(ts));
        }
        // letype takes a single value; wider allow-lists are filtered locally.
        if let Some(types) = &site.log_types {
            if types.len() == 1 {
                if let Some(only) = types.iter().next() {
                    params.insert("letype", only.clone());
                }
            }
        }
        params
    }
}

#[async_trait]
impl SourceFetcher for LogEventsFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::LogEvents
    }

    async fn fetch(
        &self,
        api: &dyn ApiClient,
        site: &Site,
        watermark: Option<Watermark>,
    ) -> Result<FetchBatch> {
        let list = fetch_list(api, self.kind(), Self::params(site, watermark)).await?;
        timestamped_batch(self.kind(), list, site, watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordEntry, SiteConfig};
    use crate::source::fake::FakeApi;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn site(logs: Value) -> Site {
        let config: SiteConfig = serde_json::from_value(json!({
            "logs": logs,
            "transport": {"platform": "notifications"}
        }))
        .unwrap();
        Site::from_config("dev", &config, "en").unwrap()
    }

    fn entry(log_type: &str, user: &str, ts: &str) -> Value {
        json!({
            "type": log_type, "action": log_type, "user": user,
            "title": "Page", "timestamp": ts
        })
    }

    fn since() -> Option<Watermark> {
        Some(Watermark::Timestamp(
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_single_type_allow_list_goes_to_api() {
        let api = FakeApi::new();
        api.push(json!({"logevents": []}));

        LogEventsFetcher
            .fetch(&api, &site(json!(["block"])), since())
            .await
            .unwrap();

        let request = &api.requests()[0];
        assert_eq!(request["letype"], "block");
        assert_eq!(request["leend"], "2024-03-01T00:00:00Z");
        assert_eq!(request["lelimit"], "500");
    }

    #[tokio::test]
    async fn test_wider_allow_list_filtered_locally() {
        let api = FakeApi::new();
        api.push(json!({"logevents": [
            entry("move", "A", "2024-03-01T10:03:00Z"),
            entry("delete", "B", "2024-03-01T10:02:00Z"),
            entry("block", "C", "2024-03-01T10:01:00Z"),
            entry("block", "Wikia", "2024-03-01T10:00:30Z"),
        ]}));

        let batch = LogEventsFetcher
            .fetch(&api, &site(json!(["block", "delete"])), since())
            .await
            .unwrap();

        assert!(!api.requests()[0].contains_key("letype"));
        let types: Vec<_> = batch
            .records
            .iter()
            .map(|r| match &r.entry {
                RecordEntry::Log(l) => l.log_type.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(types, vec!["block", "delete"]);
        assert_eq!(
            batch.next.and_then(|w| w.as_timestamp()),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 3, 0).unwrap())
        );
    }
}
