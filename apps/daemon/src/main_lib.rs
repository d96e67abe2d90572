use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use wikirelay_core::delivery::{HttpWebhookTransport, WebhookTransport};
use wikirelay_core::source::{ApiClient, MediaWikiClient};
use wikirelay_core::{CacheFile, PipelineOptions, PollScheduler, RelayConfig, Site, SitePipeline};

use crate::config::{Config, LogFormat};

/// Install the subscriber. `RUST_LOG` filters (default `info`, with the HTTP
/// stack held at `warn`); the core crate's `log` records are bridged in.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
    }
}

pub fn load_relay_config(path: &Path) -> anyhow::Result<RelayConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read site config {}", path.display()))?;
    let relay: RelayConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid site config {}", path.display()))?;
    Ok(relay)
}

/// Read the persisted state. A missing or unreadable file yields an empty cache.
pub fn load_cache(path: &Path) -> CacheFile {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No cache at {}, starting fresh", path.display());
            return CacheFile::new();
        }
        Err(e) => {
            tracing::warn!("Could not read cache {}: {}", path.display(), e);
            return CacheFile::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!("Ignoring unreadable cache {}: {}", path.display(), e);
            CacheFile::new()
        }
    }
}

pub fn save_cache(path: &Path, cache: &CacheFile) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(cache)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write cache {}", path.display()))?;
    tracing::info!("Cache written to {}", path.display());
    Ok(())
}

/// Build a pipeline for every configured site and start polling them.
///
/// Sites whose configuration cannot be resolved are logged and left out.
/// Must run inside the tokio runtime.
pub fn build_scheduler(
    config: &Config,
    relay: &RelayConfig,
    cache: &CacheFile,
) -> anyhow::Result<PollScheduler> {
    let transport: Arc<dyn WebhookTransport> = Arc::new(HttpWebhookTransport::new(
        config.request_timeout,
        &config.user_agent,
    ));
    let options = PipelineOptions {
        request_timeout: config.request_timeout,
        agent_name: "wikirelay".to_string(),
        agent_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let scheduler = PollScheduler::new();
    for (name, site_config) in &relay.sites {
        let site = match Site::from_config(name, site_config, &config.language) {
            Ok(site) => site,
            Err(e) => {
                tracing::error!("[{}] Site disabled: {}", name, e);
                continue;
            }
        };
        let api: Arc<dyn ApiClient> = Arc::new(MediaWikiClient::new(
            site.api_url.clone(),
            config.request_timeout,
            &config.user_agent,
        ));
        let state = cache.get(name).cloned().unwrap_or_default();
        match SitePipeline::new(site, api, transport.clone(), state, options.clone()) {
            Ok(pipeline) => scheduler.watch(Arc::new(pipeline)),
            Err(e) => tracing::error!("[{}] Site disabled: {}", name, e),
        }
    }

    if scheduler.watched().is_empty() {
        anyhow::bail!("No usable site in the configuration");
    }
    Ok(scheduler)
}

/// Overlay the final snapshots on the loaded cache, keeping entries of sites
/// that were not watched this run.
pub fn merge_cache(mut loaded: CacheFile, snapshots: CacheFile) -> CacheFile {
    loaded.extend(snapshots);
    loaded
}
