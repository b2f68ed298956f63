use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use feed_preview::{server::create_app, setup_logging, LogConfig, PreviewConfig, PreviewService};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging(LogConfig {
        file_output: std::env::var("FEED_PREVIEW_LOG_DIR").is_ok(),
        log_dir: std::env::var("FEED_PREVIEW_LOG_DIR")
            .unwrap_or_else(|_| "logs".into())
            .into(),
        ..LogConfig::default()
    })
    .context("initializing logging")?;

    let config = PreviewConfig::load().context("loading configuration")?;
    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind_addr))?;
    let cleanup_interval = config.server.cleanup_interval_secs;

    let service = PreviewService::new(config);

    if cleanup_interval > 0 {
        let cache = service.cache().clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(cleanup_interval));
            // The first tick fires immediately; skip it so startup stays quiet
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.cleanup_expired().await {
                    Ok(removed) => info!(removed, "Periodic cache cleanup finished"),
                    Err(e) => warn!(error = %e, "Periodic cache cleanup failed"),
                }
            }
        });
    }

    let app = create_app(service);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Preview API listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
