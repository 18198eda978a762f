mod config;

use anyhow::{Context, Result};
use crate::config::AppConfig;
use shop_api::{create_app, AppState};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::new().context("failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.filter.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("🚀 Starting order service");
    info!("✅ Configuration loaded successfully");
    info!("🌐 Server will bind to: {}", config.server_addr());
    info!("💓 Stream keep-alive every {}s", config.stream.keep_alive_seconds);

    let state = AppState::new(config.api_settings());
    let shutdown = state.shutdown.clone();
    let app = create_app(state);

    let listener = TcpListener::bind(config.server_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr()))?;

    info!("✅ Listening on {}", listener.local_addr()?);
    info!("⌨️  Press Ctrl+C to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
            }
            info!("👋 Shutting down gracefully");
            // end open order streams so in-flight connections can drain
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
