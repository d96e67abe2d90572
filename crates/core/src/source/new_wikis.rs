//! `list=wkdomains`, the registry of newly created sites.
//!
//! The registry has no timestamps. Progress is an offset into it, found at
//! bootstrap by probing count-only windows until one comes back empty.

use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value;

use super::{fetch_list, ApiClient, FetchBatch, QueryParams, SourceFetcher};
use crate::errors::{RelayError, Result};
use crate::models::{registry_entries, RawRecord, RecordEntry, Site, SourceKind};
use crate::watermark::{Watermark, WatermarkStore};

/// Lowest registry offset worth probing from.
pub const MIN_WKFROM: u64 = 1_490_000;

/// Upper bound of every incremental request.
pub const MAX_WKTO: u64 = 999_999_999_999_999;

/// Width of one count-only probe window.
pub const PROBE_WINDOW: u64 = 1_000_000;

/// Test sites created by the farm itself.
const TEST_DOMAIN_MARKER: &str = "qatestwiki";

pub struct NewWikisFetcher;

impl NewWikisFetcher {
    async fn probe_count(api: &dyn ApiClient, from: u64) -> Result<u64> {
        let mut params = QueryParams::new();
        params.insert("wkcountonly", "1".to_string());
        params.insert("wkfrom", from.to_string());
        params.insert("wkto", (from + PROBE_WINDOW).to_string());

        let list = fetch_list(api, SourceKind::NewWikis, params).await?;
        let count = list.get("count").ok_or_else(|| {
            RelayError::malformed(SourceKind::NewWikis.list_name(), "count missing")
        })?;
        match count {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| RelayError::malformed(SourceKind::NewWikis.list_name(), "count not numeric"))
    }
}

#[async_trait]
impl SourceFetcher for NewWikisFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::NewWikis
    }

    async fn bootstrap(
        &self,
        api: &dyn ApiClient,
        site: &Site,
        store: &WatermarkStore,
    ) -> Result<()> {
        let mut from = store
            .get(&site.name, self.kind())
            .and_then(|w| w.as_offset())
            .unwrap_or(MIN_WKFROM);

        loop {
            let count = Self::probe_count(api, from).await?;
            debug!("[{}] Registry probe at {} counted {}", site.name, from, count);
            if count == 0 {
                break;
            }
            from += count;
        }

        info!("[{}] Registry offset settled at {}", site.name, from);
        store.advance(&site.name, self.kind(), Watermark::Offset(from));
        Ok(())
    }

    async fn fetch(
        &self,
        api: &dyn ApiClient,
        site: &Site,
        watermark: Option<Watermark>,
    ) -> Result<FetchBatch> {
        let Some(offset) = watermark.and_then(|w| w.as_offset()) else {
            return Ok(FetchBatch::default());
        };

        let mut params = QueryParams::new();
        params.insert("wkfrom", offset.to_string());
        params.insert("wkto", MAX_WKTO.to_string());

        let list = fetch_list(api, self.kind(), params).await?;
        let entries = registry_entries(&list)?;
        let seen = entries.len() as u64;

        let mut records = Vec::new();
        for raw in entries {
            let record = RawRecord::read(self.kind(), raw);
            if let RecordEntry::Registry(entry) = &record.entry {
                if entry.domain.contains(TEST_DOMAIN_MARKER) {
                    debug!("[{}] Skipping test site {}", site.name, entry.domain);
                    continue;
                }
            }
            records.push(record);
        }

        Ok(FetchBatch {
            records,
            next: (seen > 0).then(|| Watermark::Offset(offset + seen)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteConfig;
    use crate::source::fake::FakeApi;
    use serde_json::json;

    fn site() -> Site {
        let config: SiteConfig = serde_json::from_value(json!({
            "fetch": ["newwikis"],
            "transport": {"platform": "notifications"}
        }))
        .unwrap();
        Site::from_config("community", &config, "en").unwrap()
    }

    #[tokio::test]
    async fn test_probe_stops_at_first_empty_window() {
        let api = FakeApi::new();
        api.push(json!({"wkdomains": {"count": 40}}));
        api.push(json!({"wkdomains": {"count": "2"}}));
        api.push(json!({"wkdomains": {"count": 0}}));
        let store = WatermarkStore::new();

        NewWikisFetcher.bootstrap(&api, &site(), &store).await.unwrap();

        let requests = api.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0]["wkfrom"], MIN_WKFROM.to_string());
        assert_eq!(requests[1]["wkfrom"], (MIN_WKFROM + 40).to_string());
        assert_eq!(requests[2]["wkfrom"], (MIN_WKFROM + 42).to_string());
        assert_eq!(requests[0]["wkcountonly"], "1");
        assert_eq!(
            store.get("community", SourceKind::NewWikis),
            Some(Watermark::Offset(MIN_WKFROM + 42))
        );
    }

    #[tokio::test]
    async fn test_probe_resumes_from_stored_offset() {
        let api = FakeApi::new();
        api.push(json!({"wkdomains": {"count": 0}}));
        let store = WatermarkStore::new();
        store.advance("community", SourceKind::NewWikis, Watermark::Offset(2_000_000));

        NewWikisFetcher.bootstrap(&api, &site(), &store).await.unwrap();

        assert_eq!(api.requests()[0]["wkfrom"], "2000000");
        assert_eq!(api.requests()[0]["wkto"], "3000000");
    }

    #[tokio::test]
    async fn test_nothing_before_probe() {
        let api = FakeApi::new();
        let batch = NewWikisFetcher.fetch(&api, &site(), None).await.unwrap();
        assert!(batch.records.is_empty());
        assert!(batch.next.is_none());
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn test_test_sites_dropped_but_counted() {
        let api = FakeApi::new();
        api.push(json!({"wkdomains": {
            "12": {"id": 12, "domain": "b.fandom.com"},
            "11": {"id": 11, "domain": "qatestwiki123.fandom.com"},
            "10": {"id": 10, "domain": "a.fandom.com"}
        }}));

        let batch = NewWikisFetcher
            .fetch(&api, &site(), Some(Watermark::Offset(100)))
            .await
            .unwrap();

        let domains: Vec<_> = batch
            .records
            .iter()
            .map(|r| match &r.entry {
                RecordEntry::Registry(entry) => entry.domain.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(domains, vec!["a.fandom.com", "b.fandom.com"]);
        assert_eq!(batch.next, Some(Watermark::Offset(103)));
        assert_eq!(api.requests()[0]["wkto"], MAX_WKTO.to_string());
    }
}
