use std::time::Duration;
use tracing_subscriber::EnvFilter;

use slowlog_sync::config::SyncConfig;
use slowlog_sync::sink::EsStore;
use slowlog_sync::source::AdminApiClient;
use slowlog_sync::sync_engine::SyncEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("slowlog_sync=info")),
        )
        .init();

    let config_path =
        std::env::var("SLOWLOG_CONFIG").unwrap_or_else(|_| "./slowlog.toml".to_string());
    let mut config = SyncConfig::load(&config_path)?;
    config.apply_env_overrides();

    let timeout = Duration::from_secs(config.sync.request_timeout_secs);
    let source = AdminApiClient::new(&config.api, timeout)?;
    let sink = EsStore::new(&config.store, config.sync.local_offset_hours, timeout)?;

    let engine = SyncEngine::new(source, sink, config.sync.clone());
    let written = engine.run().await?;
    tracing::info!("sync pass complete, wrote {written} record(s)");

    Ok(())
}
