//! `list=recentchanges`, the activity feed.

use async_trait::async_trait;

use super::{
    fetch_list, format_timestamp, timestamped_batch, ApiClient, FetchBatch, QueryParams,
    SourceFetcher, PAGE_LIMIT,
};
use crate::errors::Result;
use crate::models::{Site, SourceKind};
use crate::watermark::Watermark;

const RC_PROP: &str = "user|title|ids|timestamp|comment|flags|tags|loginfo|sizes";

pub struct RecentChangesFetcher;

impl RecentChangesFetcher {
    fn params(site: &Site, watermark: Option<Watermark>) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("rcprop", RC_PROP.to_string());
        params.insert("rcshow", "!bot".to_string());
        params.insert("rclimit", PAGE_LIMIT.to_string());
        if let Some(ts) = watermark.and_then(|w| w.as_timestamp()) {
            params.insert("rcend", format_timestamp(ts));
        }
        if let Some(user) = &site.excluded_user {
            params.insert("rcexcludeuser", user.clone());
        }
        params
    }
}

#[async_trait]
impl SourceFetcher for RecentChangesFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::RecentChanges
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
    use crate::errors::RelayError;
    use crate::models::{RecordEntry, SiteConfig};
    use crate::source::fake::FakeApi;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn site(extra: Value) -> Site {
        let mut config = json!({"transport": {"platform": "notifications"}});
        if let (Some(base), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        let config: SiteConfig = serde_json::from_value(config).unwrap();
        Site::from_config("dev", &config, "en").unwrap()
    }

    fn change(user: &str, ts: &str) -> Value {
        json!({
            "type": "edit", "user": user, "title": "Page", "ns": 0,
            "oldlen": 1, "newlen": 2, "revid": 1, "comment": "", "timestamp": ts
        })
    }

    fn at(h: u32, m: u32) -> Watermark {
        Watermark::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap())
    }

    #[tokio::test]
    async fn test_first_pass_seeds_without_records() {
        let api = FakeApi::new();
        api.push(json!({"recentchanges": [
            change("A", "2024-03-01T10:02:00Z"),
            change("B", "2024-03-01T10:01:00Z"),
            change("C", "2024-03-01T10:00:00Z"),
        ]}));

        let batch = RecentChangesFetcher
            .fetch(&api, &site(json!({})), None)
            .await
            .unwrap();

        assert!(batch.records.is_empty());
        assert_eq!(batch.next, Some(at(10, 2)));
        assert!(!api.requests()[0].contains_key("rcend"));
    }

    #[tokio::test]
    async fn test_empty_first_pass_seeds_at_epoch() {
        let api = FakeApi::new();
        api.push(json!({"recentchanges": []}));
        api.push(json!({"recentchanges": [change("A", "2024-03-01T10:00:00Z")]}));
        let site = site(json!({}));

        let first = RecentChangesFetcher.fetch(&api, &site, None).await.unwrap();
        assert!(first.records.is_empty());
        let seeded = first.next.unwrap();
        assert_eq!(seeded.as_timestamp(), Utc.timestamp_opt(0, 0).single());

        let second = RecentChangesFetcher
            .fetch(&api, &site, Some(seeded))
            .await
            .unwrap();
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.next, Some(at(10, 0)));
        assert_eq!(api.requests()[1]["rcend"], "1970-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_unknown_shape_is_kept_and_counted() {
        let api = FakeApi::new();
        api.push(json!({"recentchanges": [
            {"user": "Alice", "title": "P", "ns": 0, "timestamp": "2024-03-01T10:00:00Z"},
            {"user": "FandomBot", "title": "Q", "ns": 0, "timestamp": "2024-03-01T10:01:00Z"},
        ]}));

        let batch = RecentChangesFetcher
            .fetch(&api, &site(json!({})), Some(at(9, 0)))
            .await
            .unwrap();

        assert_eq!(batch.records.len(), 1);
        assert!(matches!(batch.records[0].entry, RecordEntry::Unknown { .. }));
        assert_eq!(batch.next, Some(at(10, 1)));
    }

    #[tokio::test]
    async fn test_only_strictly_newer_records_oldest_first() {
        let api = FakeApi::new();
        api.push(json!({"recentchanges": [
            change("A", "2024-03-01T10:03:00Z"),
            change("B", "2024-03-01T10:02:00Z"),
            change("C", "2024-03-01T10:01:00Z"),
        ]}));

        let batch = RecentChangesFetcher
            .fetch(&api, &site(json!({})), Some(at(10, 1)))
            .await
            .unwrap();

        let users: Vec<_> = batch
            .records
            .iter()
            .map(|r| match &r.entry {
                RecordEntry::Change(c) => c.user.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(users, vec!["B", "A"]);
        assert_eq!(batch.next, Some(at(10, 3)));
        assert_eq!(api.requests()[0]["rcend"], "2024-03-01T10:01:00Z");
        assert_eq!(api.requests()[0]["list"], "recentchanges");
    }

    #[tokio::test]
    async fn test_bot_only_batch_still_advances() {
        let api = FakeApi::new();
        api.push(json!({"recentchanges": [
            change("FandomBot", "2024-03-01T10:05:00Z"),
            change("Wikia", "2024-03-01T10:04:00Z"),
        ]}));

        let batch = RecentChangesFetcher
            .fetch(&api, &site(json!({})), Some(at(10, 0)))
            .await
            .unwrap();

        assert!(batch.records.is_empty());
        assert_eq!(batch.next, Some(at(10, 5)));
    }

    #[tokio::test]
    async fn test_excluded_user_is_sent_to_api() {
        let api = FakeApi::new();
        api.push(json!({"recentchanges": []}));

        let batch = RecentChangesFetcher
            .fetch(&api, &site(json!({"excludeuser": "Noisy"})), Some(at(10, 0)))
            .await
            .unwrap();

        assert!(batch.next.is_none());
        let request = &api.requests()[0];
        assert_eq!(request["rcexcludeuser"], "Noisy");
        assert_eq!(request["rcshow"], "!bot");
        assert_eq!(request["rclimit"], "500");
    }

    #[tokio::test]
    async fn test_missing_list_is_malformed() {
        let api = FakeApi::new();
        api.push(json!({"logevents": []}));

        let err = RecentChangesFetcher
            .fetch(&api, &site(json!({})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MalformedResponse { .. }));
    }
}
