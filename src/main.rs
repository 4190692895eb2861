//! Sentra LPR Service
//!
//! Main entry point for the plate recognition gateway.

use sentra_lpr::state::{AppConfig, AppState};
use sentra_lpr::web_api;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentra_lpr=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sentra LPR Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        camera_mode = %config.camera_mode,
        parking_api_url = %config.parking_api_url,
        detector_url = %config.detector_url,
        min_confidence = config.min_confidence,
        auto_entry_exit = config.auto_entry_exit,
        "Configuration loaded"
    );

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = web_api::create_router(state.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Sentra LPR Service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop all streams before exit so ffmpeg children are released
    tracing::info!("Shutting down, stopping camera streams");
    state.registry.stop_all().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
