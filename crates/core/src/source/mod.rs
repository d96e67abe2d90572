//! Activity sources and the API seam they poll through.
//!
//! Each [`SourceFetcher`] owns the request shape and filtering rules of one
//! feed. Fetchers are stateless: the watermark they fetch from is passed in and
//! the advanced watermark is handed back in the [`FetchBatch`], so the caller
//! decides when progress is committed.

mod abuse_log;
mod client;
mod log_events;
mod new_wikis;
mod recent_changes;

pub use abuse_log::AbuseLogFetcher;
pub use client::MediaWikiClient;
pub use log_events::LogEventsFetcher;
pub use new_wikis::{NewWikisFetcher, MAX_WKTO, MIN_WKFROM, PROBE_WINDOW};
pub use recent_changes::RecentChangesFetcher;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use serde_json::Value;

use crate::errors::{RelayError, Result};
use crate::models::{RawRecord, Site, SourceKind};
use crate::watermark::{Watermark, WatermarkStore};

/// Page-size cap for every list request.
pub const PAGE_LIMIT: u32 = 500;

/// Query-string parameters of one `action=query` request, without the
/// `action` and `format` keys the client adds.
pub type QueryParams = BTreeMap<&'static str, String>;

/// The remote API as seen by the core.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Run an `action=query` request and return the response's `query` object.
    async fn query(&self, params: &QueryParams) -> Result<Value>;
}

/// Result of one fetch pass.
#[derive(Debug, Default)]
pub struct FetchBatch {
    /// Records to normalize, oldest first.
    pub records: Vec<RawRecord>,
    /// Watermark to commit once the records have been handed on.
    pub next: Option<Watermark>,
}

/// One polled feed.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// One-time setup before the first pass.
    async fn bootstrap(
        &self,
        _api: &dyn ApiClient,
        _site: &Site,
        _store: &WatermarkStore,
    ) -> Result<()> {
        Ok(())
    }

    /// Fetch everything newer than `watermark`.
    async fn fetch(
        &self,
        api: &dyn ApiClient,
        site: &Site,
        watermark: Option<Watermark>,
    ) -> Result<FetchBatch>;
}

/// Build the fetcher for a source kind.
pub fn fetcher_for(kind: SourceKind) -> Box<dyn SourceFetcher> {
    match kind {
        SourceKind::RecentChanges => Box::new(RecentChangesFetcher),
        SourceKind::LogEvents => Box::new(LogEventsFetcher),
        SourceKind::AbuseLog => Box::new(AbuseLogFetcher),
        SourceKind::NewWikis => Box::new(NewWikisFetcher),
    }
}

/// `rcend`/`leend`/`aflend` format.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn empty_history_mark() -> Option<Watermark> {
    Utc.timestamp_opt(0, 0).single().map(Watermark::Timestamp)
}

/// Run a list query and pull the list out of the response.
pub(crate) async fn fetch_list(
    api: &dyn ApiClient,
    kind: SourceKind,
    mut params: QueryParams,
) -> Result<Value> {
    params.insert("list", kind.list_name().to_string());
    let query = api.query(&params).await?;
    query
        .get(kind.list_name())
        .cloned()
        .ok_or_else(|| RelayError::malformed(kind.list_name(), "list field missing"))
}

/// Shared pass logic of the timestamped feeds.
///
/// The watermark candidate is the newest timestamp of the whole response, so
/// records dropped by the exclusion rules still count as seen.
pub(crate) fn timestamped_batch(
    kind: SourceKind,
    list: Value,
    site: &Site,
    watermark: Option<Watermark>,
) -> Result<FetchBatch> {
    let Value::Array(items) = list else {
        return Err(RelayError::malformed(kind.list_name(), "expected a list"));
    };

    let mut records: Vec<RawRecord> = items
        .into_iter()
        .map(|item| RawRecord::read(kind, item))
        .collect();

    let next = records
        .iter()
        .filter_map(RawRecord::timestamp)
        .max()
        .map(Watermark::Timestamp);

    let Some(current) = watermark.and_then(|w| w.as_timestamp()) else {
        // First pass: seed only. A feed with no history at all is seeded at
        // the epoch, so its first record is relayed.
        return Ok(FetchBatch {
            records: Vec::new(),
            next: next.or_else(empty_history_mark),
        });
    };

    records.retain(|record| match record.timestamp() {
        Some(ts) => ts > current && !site.excludes(record),
        None => {
            warn!(
                "[{}] Skipping {} record without a timestamp: {}",
                site.name,
                kind,
                record.to_json()
            );
            false
        }
    });
    records.sort_by_key(RawRecord::timestamp);

    Ok(FetchBatch { records, next })
}
