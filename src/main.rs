use hearthd::backup::run_scheduler;
use hearthd::config::Config;
use hearthd::engine::Engine;
use hearthd::logging::{initialize_logging, LogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    initialize_logging(LogConfig::from_level(&config.log_level))?;

    let bind_addr = config.bind_addr;
    let backup_cron = config.backup_cron.clone();
    let engine = Engine::build(config).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    if let Some(cron_expr) = backup_cron {
        let manager = engine.backups.clone();
        let registry = engine.registry.clone();
        tokio::spawn(async move {
            if let Err(err) = run_scheduler(manager, registry, cron_expr, shutdown_rx).await {
                tracing::error!(error = %err, "backup scheduler exited");
            }
        });
    }

    let app = hearthd::api::router().with_state(engine);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "hearthd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}

/// Waits for Ctrl+C. Live game-server child processes are left running;
/// only HTTP accept and the backup scheduler loop are torn down.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
