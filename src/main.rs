use anyhow::Context;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

#[cfg(test)]
mod testing;

use config::settings::AppConfig;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new();
    let state = AppState::new(config.clone());

    std::fs::create_dir_all(&config.download_dir).with_context(|| {
        format!("Failed to create download directory {}", config.download_dir.display())
    })?;
    info!(
        dir = %config.download_dir.display(),
        providers = config.tool_commands.len(),
        quota = config.max_downloads_per_session,
        "📁 Downloads configured"
    );

    tokio::spawn(workers::sweeper::start_retention_worker(
        state.sweeper.clone(),
        state.sessions.clone(),
        config.sweep_interval,
        state.shutdown.clone(),
    ));

    let app = app::create_app(state.clone());

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C and cancels `token`, which kills running converters and
/// stops the background workers.
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    token.cancel();
}
