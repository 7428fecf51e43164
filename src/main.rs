use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use transcoder::config::settings::AppConfig;
use transcoder::infrastructure::ffmpeg::engine::FfmpegEngine;
use transcoder::state::AppState;
use transcoder::{app, workers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new();

    let engine = FfmpegEngine::new(config.ffmpeg_bin.clone(), config.transcode_timeout());
    match engine.locate() {
        Some(path) => info!("Using ffmpeg at {}", path.display()),
        None => warn!("{} not found on PATH, every transcode will fail", config.ffmpeg_bin),
    }

    let state = AppState::build(config.clone(), Arc::new(engine)).await?;
    info!(
        "Serving renditions {:?} with at most {} concurrent transcodes",
        state.scheduler.table().labels(),
        state.scheduler.max_concurrency()
    );

    let _sweeper = workers::sweeper::start_sweeper(
        state.workspace.clone(),
        config.sweep_interval(),
        config.sweep_max_age(),
    );

    let app = app::create_app(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
