//! `list=abuselog`, abuse filter hits.

use async_trait::async_trait;

use super::{
    fetch_list, format_timestamp, timestamped_batch, ApiClient, FetchBatch, QueryParams,
    SourceFetcher, PAGE_LIMIT,
};
use crate::errors::Result;
use crate::models::{Site, SourceKind};
use crate::watermark::Watermark;

const AFL_PROP: &str = "filter|user|title|action|result|timestamp|ids";

pub struct AbuseLogFetcher;

#[async_trait]
impl SourceFetcher for AbuseLogFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::AbuseLog
    }

    async fn fetch(
        &self,
        api: &dyn ApiClient,
        site: &Site,
        watermark: Option<Watermark>,
    ) -> Result<FetchBatch> {
        let mut params = QueryParams::new();
        params.insert("aflprop", AFL_PROP.to_string());
        params.insert("afllimit", PAGE_LIMIT.to_string());
        if let Some(ts) = watermark.and_then(|w| w.as_timestamp()) {
            params.insert("aflend", format_timestamp(ts));
        }

        let list = fetch_list(api, self.kind(), params).await?;
        timestamped_batch(self.kind(), list, site, watermark)
    }
}
