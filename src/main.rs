use anyhow::Context;
use slot_watcher::config::AppConfig;
use slot_watcher::services::SlotWatcher;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slot_watcher=info")),
        )
        .init();

    let config = Arc::new(AppConfig::load().context("invalid configuration")?);
    info!(
        calendar = %config.calendar_url,
        plans = ?config.plan_ids,
        months_ahead = config.months_ahead,
        poll_ms = config.poll_interval.as_millis() as u64,
        dry_run = config.dry_run,
        "slot watcher starting"
    );

    let watcher = SlotWatcher::new(config).context("failed to build watcher")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    watcher.run(shutdown_rx).await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
