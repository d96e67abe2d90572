mod config;
mod main_lib;

use config::Config;
use main_lib::{
    build_scheduler, init_tracing, load_cache, load_relay_config, merge_cache, save_cache,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(config.log_format);

    let relay = load_relay_config(&config.config_path)?;
    let cache = load_cache(&config.cache_path);
    let scheduler = build_scheduler(&config, &relay, &cache)?;
    tracing::info!("Watching {} site(s)", scheduler.watched().len());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    let snapshots = scheduler.shutdown().await;
    save_cache(&config.cache_path, &merge_cache(cache, snapshots))?;
    Ok(())
}
