//! WebAPI - REST API and WebSocket Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - WebSocket subscription boundary

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let parking_ok = state.parking.health_check().await;
    let detector_ok = state.detector.health_check().await.unwrap_or(false);

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        camera_mode: state.config.camera_mode.clone(),
        cameras_active: state.registry.active_count().await,
        parking_backend_connected: parking_ok,
        detector_connected: detector_ok,
    };

    Json(response)
}
