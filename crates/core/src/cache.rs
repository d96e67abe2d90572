//! Persistable per-site state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::SourceKind;
use crate::normalizer::ThreadCacheEntry;
use crate::watermark::Watermark;

/// What a site needs to resume where it stopped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteCache {
    #[serde(default)]
    pub watermarks: BTreeMap<SourceKind, Watermark>,
    #[serde(default)]
    pub threads: BTreeMap<String, ThreadCacheEntry>,
}

/// The cache file: site name -> state.
pub type CacheFile = BTreeMap<String, SiteCache>;
