//! Drives every watched site on its own interval.
//!
//! Each site runs in one task: bootstrap first, then a ticker that starts one
//! pass per enabled source on every tick. A pass still running when the next
//! tick arrives makes that tick skip the source. Failures stay inside their
//! site; a bootstrap failure disables only that site.

mod pipeline;

pub use pipeline::{PassOutcome, PipelineOptions, SitePipeline, DEFAULT_REQUEST_TIMEOUT};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::cache::{CacheFile, SiteCache};
use crate::errors::RetryClass;

struct WatchedSite {
    pipeline: Arc<SitePipeline>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
pub struct PollScheduler {
    sites: Mutex<HashMap<String, WatchedSite>>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start polling a site. Replaces (and stops) a site of the same name.
    pub fn watch(&self, pipeline: Arc<SitePipeline>) {
        let name = pipeline.name().to_string();
        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::spawn(run_site(pipeline.clone(), cancelled));

        let previous = self.lock_sites().insert(
            name.clone(),
            WatchedSite {
                pipeline,
                cancel,
                task,
            },
        );
        if let Some(previous) = previous {
            warn!("[{}] Site was already watched, replacing it", name);
            previous.pipeline.deactivate();
            let _ = previous.cancel.send(true);
        }
    }

    pub fn watched(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock_sites().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop polling a site and drain its sinks. Returns its final state.
    pub async fn unwatch(&self, name: &str) -> Option<SiteCache> {
        let site = self.lock_sites().remove(name)?;
        Some(stop_site(site).await)
    }

    /// Current state of every watched site.
    pub fn snapshots(&self) -> CacheFile {
        self.lock_sites()
            .iter()
            .map(|(name, site)| (name.clone(), site.pipeline.snapshot()))
            .collect()
    }

    /// Unwatch every site. Returns the state to persist.
    pub async fn shutdown(&self) -> CacheFile {
        let sites: Vec<(String, WatchedSite)> = self.lock_sites().drain().collect();
        let mut file = BTreeMap::new();
        for (name, site) in sites {
            file.insert(name, stop_site(site).await);
        }
        info!("Scheduler stopped");
        file
    }

    fn lock_sites(&self) -> MutexGuard<'_, HashMap<String, WatchedSite>> {
        self.sites.lock().unwrap_or_else(|poisoned| {
            warn!("Scheduler mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

async fn stop_site(site: WatchedSite) -> SiteCache {
    site.pipeline.deactivate();
    let _ = site.cancel.send(true);
    if let Err(e) = site.task.await {
        warn!("[{}] Site task ended abnormally: {}", site.pipeline.name(), e);
    }
    site.pipeline.shutdown().await;
    site.pipeline.snapshot()
}

async fn run_site(pipeline: Arc<SitePipeline>, mut cancelled: watch::Receiver<bool>) {
    let name = pipeline.name().to_string();

    tokio::select! {
        result = pipeline.bootstrap() => {
            if let Err(e) = result {
                error!("[{}] Bootstrap failed, site disabled: {}", name, e);
                return;
            }
        }
        _ = cancelled.changed() => return,
    }

    let mut ticker = interval(pipeline.site().interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancelled.changed() => break,
            _ = ticker.tick() => {
                for kind in pipeline.enabled_sources() {
                    let pipeline = pipeline.clone();
                    tokio::spawn(async move {
                        match pipeline.run_pass(kind).await {
                            Ok(PassOutcome::Skipped) => {
                                debug!("[{}] {} pass still running, tick skipped", pipeline.name(), kind);
                            }
                            Ok(PassOutcome::Completed(0)) => {}
                            Ok(PassOutcome::Completed(n)) => {
                                debug!("[{}] {} pass relayed {} events", pipeline.name(), kind, n);
                            }
                            Err(e) => match e.retry_class() {
                                RetryClass::Fatal => error!("[{}] {} pass failed: {}", pipeline.name(), kind, e),
                                _ => warn!("[{}] {} pass failed, retrying next tick: {}", pipeline.name(), kind, e),
                            },
                        }
                    });
                }
            }
        }
    }

    debug!("[{}] Polling stopped", name);
}
