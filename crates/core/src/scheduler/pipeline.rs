//! Everything one site owns, and one poll pass over one of its sources.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, info, warn};

use crate::cache::SiteCache;
use crate::delivery::{Dispatcher, WebhookTransport};
use crate::errors::{RelayError, Result};
use crate::models::{CanonicalEvent, Site, SiteInfo, SourceKind, ABUSE_LOG_RIGHT};
use crate::normalizer::{EventNormalizer, ThreadResolver};
use crate::source::{fetcher_for, ApiClient, QueryParams, SourceFetcher};
use crate::template::RenderContext;
use crate::watermark::{Watermark, WatermarkStore};

/// Default bound on every outbound API call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide settings handed to every pipeline.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub request_timeout: Duration,
    /// Name and version announced by the welcome message.
    pub agent_name: String,
    pub agent_version: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            agent_name: env!("CARGO_PKG_NAME").to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// What a call to [`SitePipeline::run_pass`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass of the same source was still running.
    Skipped,
    /// The pass finished; this many events were dispatched.
    Completed(usize),
}

struct SourceSlot {
    fetcher: Box<dyn SourceFetcher>,
    enabled: AtomicBool,
    in_flight: AtomicBool,
}

/// Holds a source's in-flight flag for the duration of a pass.
struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SitePipeline {
    site: Site,
    api: Arc<dyn ApiClient>,
    watermarks: WatermarkStore,
    threads: ThreadResolver,
    normalizer: EventNormalizer,
    dispatcher: Dispatcher,
    slots: Vec<SourceSlot>,
    info: RwLock<SiteInfo>,
    options: PipelineOptions,
    active: AtomicBool,
    welcomed: AtomicBool,
}

impl SitePipeline {
    /// Assemble a site's pipeline, seeded from its persisted state.
    ///
    /// Starts the sink workers, so it must run inside a tokio runtime.
    pub fn new(
        site: Site,
        api: Arc<dyn ApiClient>,
        transport: Arc<dyn WebhookTransport>,
        cache: SiteCache,
        options: PipelineOptions,
    ) -> Result<Self> {
        let dispatcher = Dispatcher::from_configs(&site.name, &site.sinks, transport)?;

        let watermarks = WatermarkStore::new();
        watermarks.seed(&site.name, &cache.watermarks);

        let threads = ThreadResolver::with_cache(&site.name, api.clone(), cache.threads);
        let normalizer = EventNormalizer::new(Arc::new(threads.clone()));

        let slots = site
            .sources
            .iter()
            .map(|kind| SourceSlot {
                fetcher: fetcher_for(*kind),
                enabled: AtomicBool::new(true),
                in_flight: AtomicBool::new(false),
            })
            .collect();

        let info = SiteInfo::for_host(&host_of(&site.api_url));

        Ok(Self {
            site,
            api,
            watermarks,
            threads,
            normalizer,
            dispatcher,
            slots,
            info: RwLock::new(info),
            options,
            active: AtomicBool::new(true),
            welcomed: AtomicBool::new(false),
        })
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn name(&self) -> &str {
        &self.site.name
    }

    pub fn watermarks(&self) -> &WatermarkStore {
        &self.watermarks
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop relaying. Passes already running finish but emit nothing.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Sources that still take part in polling.
    pub fn enabled_sources(&self) -> Vec<SourceKind> {
        self.slots
            .iter()
            .filter(|slot| slot.enabled.load(Ordering::Acquire))
            .map(|slot| slot.fetcher.kind())
            .collect()
    }

    pub fn site_info(&self) -> SiteInfo {
        self.info
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Fetch site info, drop sources the account may not read, then let each
    /// fetcher prepare itself.
    pub async fn bootstrap(&self) -> Result<()> {
        let mut params = QueryParams::new();
        params.insert("meta", "siteinfo|userinfo".to_string());
        params.insert("siprop", "general|namespaces".to_string());
        params.insert("uiprop", "rights".to_string());

        let query = self.bounded(self.api.query(&params)).await?;
        let info = SiteInfo::from_query(&query)?;

        for slot in &self.slots {
            if slot.fetcher.kind() == SourceKind::AbuseLog && !info.has_right(ABUSE_LOG_RIGHT) {
                warn!(
                    "[{}] Account lacks '{}', abuse log disabled",
                    self.site.name, ABUSE_LOG_RIGHT
                );
                slot.enabled.store(false, Ordering::Release);
            }
        }
        *self
            .info
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = info;

        for slot in &self.slots {
            if slot.enabled.load(Ordering::Acquire) {
                self.bounded(slot.fetcher.bootstrap(self.api.as_ref(), &self.site, &self.watermarks))
                    .await?;
            }
        }

        info!(
            "[{}] Bootstrapped, polling {:?}",
            self.site.name,
            self.enabled_sources()
        );
        Ok(())
    }

    /// Poll one source once. Overlapping calls for the same source are skipped.
    pub async fn run_pass(&self, kind: SourceKind) -> Result<PassOutcome> {
        let slot = self
            .slots
            .iter()
            .find(|slot| slot.fetcher.kind() == kind)
            .ok_or_else(|| {
                RelayError::Config(format!("source {} is not configured for {}", kind, self.site.name))
            })?;

        let Some(_guard) = PassGuard::acquire(&slot.in_flight) else {
            return Ok(PassOutcome::Skipped);
        };

        let watermark = self.watermarks.get(&self.site.name, kind);
        let batch = self
            .bounded(slot.fetcher.fetch(self.api.as_ref(), &self.site, watermark))
            .await?;

        if !self.is_active() {
            debug!("[{}] Discarding {} pass of an unwatched site", self.site.name, kind);
            return Ok(PassOutcome::Completed(0));
        }

        let info = self.site_info();
        let ctx = RenderContext {
            info: &info,
            strings: &self.site.strings,
            diff_threshold: self.site.diff_threshold,
        };

        if self.site.welcome && !self.welcomed.swap(true, Ordering::AcqRel) {
            let welcome = CanonicalEvent::RelayStarted {
                name: self.options.agent_name.clone(),
                version: self.options.agent_version.clone(),
            };
            self.dispatcher.send(&welcome.to_message(), &ctx);
        }

        let mut emitted = 0;
        for record in &batch.records {
            if let Some(event) = self.normalizer.normalize(record, &self.site) {
                self.dispatcher.send(&event.to_message(), &ctx);
                emitted += 1;
            }
        }

        self.commit(kind, batch.next);
        Ok(PassOutcome::Completed(emitted))
    }

    /// Advance a source's watermark, unless the site was unwatched meanwhile:
    /// its sinks may already be drained, so the records must be fetched again.
    fn commit(&self, kind: SourceKind, next: Option<Watermark>) -> bool {
        let Some(next) = next else {
            return false;
        };
        if !self.is_active() {
            debug!("[{}] Site unwatched, {} watermark left as is", self.site.name, kind);
            return false;
        }
        let advanced = self.watermarks.advance(&self.site.name, kind, next);
        if advanced {
            debug!("[{}] {} watermark now {:?}", self.site.name, kind, next);
        }
        advanced
    }

    /// Persistable state of this site.
    pub fn snapshot(&self) -> SiteCache {
        SiteCache {
            watermarks: self.watermarks.snapshot(&self.site.name),
            threads: self.threads.snapshot(),
        }
    }

    /// Drain the sink queues.
    pub async fn shutdown(&self) {
        self.deactivate();
        self.dispatcher.shutdown().await;
    }

    async fn bounded<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.options.request_timeout, call)
            .await
            .map_err(|_| RelayError::Timeout(self.options.request_timeout))?
    }
}

/// Host part of an API URL.
fn host_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
