//! Thread title resolution for message walls and forum boards.
//!
//! Thread pages are named after their container (`Message Wall:Alice/@comment-...`),
//! not after their title. The title lives in an `<ac_metadata>` tag of the
//! thread's first revision, so it is fetched once per container and cached for
//! the life of the process.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{RelayError, Result};
use crate::source::{ApiClient, QueryParams};

lazy_static! {
    static ref METADATA_TITLE: Regex =
        Regex::new(r#"<ac_metadata\s*title="([^"]+)"[^>]*>"#)
            .expect("Invalid regex pattern");
}

/// A resolved thread container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCacheEntry {
    /// `Thread:<page id>`
    pub target: String,
    pub title: String,
}

/// What a thread page should link to right now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedThread {
    pub target: String,
    /// `None` until the container has been resolved.
    pub title: Option<String>,
}

/// Synchronous thread lookup used by the normalizer.
pub trait ThreadLookup: Send + Sync {
    fn resolve(&self, page: &str) -> ResolvedThread;
}

/// Container key of a thread page: its first two path segments.
pub fn container_key(page: &str) -> String {
    let mut parts = page.split('/');
    match (parts.next(), parts.next()) {
        (Some(root), Some(first)) => format!("{}/{}", root, first),
        _ => page.to_string(),
    }
}

#[derive(Default)]
struct ThreadState {
    cache: BTreeMap<String, ThreadCacheEntry>,
    pending: HashSet<String>,
}

/// Lazily populated thread cache backed by the site's API.
#[derive(Clone)]
pub struct ThreadResolver {
    site: String,
    api: Arc<dyn ApiClient>,
    state: Arc<Mutex<ThreadState>>,
}

impl ThreadResolver {
    pub fn new(site: impl Into<String>, api: Arc<dyn ApiClient>) -> Self {
        Self::with_cache(site, api, BTreeMap::new())
    }

    /// Start from a persisted cache.
    pub fn with_cache(
        site: impl Into<String>,
        api: Arc<dyn ApiClient>,
        cache: BTreeMap<String, ThreadCacheEntry>,
    ) -> Self {
        Self {
            site: site.into(),
            api,
            state: Arc::new(Mutex::new(ThreadState {
                cache,
                pending: HashSet::new(),
            })),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, ThreadCacheEntry> {
        self.lock_state().cache.clone()
    }

    pub fn cached(&self, key: &str) -> Option<ThreadCacheEntry> {
        self.lock_state().cache.get(key).cloned()
    }

    /// Fetch and cache the title of one container.
    pub async fn refresh(&self, key: &str) -> Result<ThreadCacheEntry> {
        let mut params = QueryParams::new();
        params.insert("prop", "revisions".to_string());
        params.insert("titles", key.to_string());
        params.insert("rvlimit", "1".to_string());
        params.insert("rvprop", "content".to_string());

        let result = self.api.query(&params).await.and_then(|q| parse_thread(&q));

        let mut state = self.lock_state();
        state.pending.remove(key);
        let entry = result?;
        debug!("[{}] Resolved thread {} as '{}'", self.site, key, entry.title);
        state.cache.insert(key.to_string(), entry.clone());
        Ok(entry)
    }

    /// Mark `key` as in flight. Returns `false` when it already was.
    fn claim(&self, key: &str) -> bool {
        self.lock_state().pending.insert(key.to_string())
    }

    fn lock_state(&self) -> MutexGuard<'_, ThreadState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Thread cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl ThreadLookup for ThreadResolver {
    fn resolve(&self, page: &str) -> ResolvedThread {
        let key = container_key(page);
        if let Some(entry) = self.cached(&key) {
            return ResolvedThread {
                target: entry.target,
                title: Some(entry.title),
            };
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) if self.claim(&key) => {
                let resolver = self.clone();
                handle.spawn(async move {
                    if let Err(e) = resolver.refresh(&key).await {
                        warn!("[{}] Failed to resolve thread {}: {}", resolver.site, key, e);
                    }
                });
            }
            Ok(_) => {}
            Err(_) => debug!("[{}] No runtime to resolve thread {}", self.site, key),
        }

        ResolvedThread {
            target: page.to_string(),
            title: None,
        }
    }
}

/// Pull the page id and metadata title out of a `prop=revisions` answer.
fn parse_thread(query: &Value) -> Result<ThreadCacheEntry> {
    let page = query
        .get("pages")
        .and_then(|pages| match pages {
            Value::Object(map) => map.values().next(),
            Value::Array(list) => list.first(),
            _ => None,
        })
        .ok_or_else(|| RelayError::malformed("revisions", "no page returned"))?;

    let page_id = page
        .get("pageid")
        .and_then(Value::as_u64)
        .ok_or_else(|| RelayError::malformed("revisions", "thread page does not exist"))?;

    let content = page
        .get("revisions")
        .and_then(|r| r.get(0))
        .and_then(|rev| {
            rev.get("*")
                .or_else(|| rev.get("content"))
                .or_else(|| rev.pointer("/slots/main/content"))
                .or_else(|| rev.pointer("/slots/main/*"))
        })
        .and_then(Value::as_str)
        .ok_or_else(|| RelayError::malformed("revisions", "no revision content"))?;

    let title = METADATA_TITLE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()))
        .ok_or_else(|| RelayError::malformed("revisions", "no thread metadata"))?;

    Ok(ThreadCacheEntry {
        target: format!("Thread:{}", page_id),
        title,
    })
}

/// Decode the HTML entities the wiki writes into attribute values.
pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}
