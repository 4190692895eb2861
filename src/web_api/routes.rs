//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Multipart, Path, Query, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::confirmation::ConfirmAction;
use crate::detector_client::PlateDetector;
use crate::detection_gate::DetectionGate;
use crate::error::{Error, Result};
use crate::models::{ActionRequest, ActionResponse, ApiResponse, DetectionResponse};
use crate::realtime_hub::HubMessage;
use crate::state::AppState;
use crate::stream_controller::best_candidate;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(super::health_check))
        // Cameras
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras/start-all", post(start_all_cameras))
        .route("/api/cameras/stop-all", post(stop_all_cameras))
        .route("/api/cameras/:id", get(get_camera))
        .route("/api/cameras/:id/start", post(start_camera))
        .route("/api/cameras/:id/stop", post(stop_camera))
        // Confirmation
        .route("/api/entry", post(confirm_entry))
        .route("/api/exit", post(confirm_exit))
        // One-shot detection
        .route("/api/detect/image", post(detect_from_upload))
        .route("/api/detect/base64", post(detect_from_base64))
        // Parking backend passthroughs
        .route("/api/spots", get(list_spots))
        .route("/api/logs", get(list_logs))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Camera Handlers
// ========================================

async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    let cameras = state.registry.snapshot().await;
    Json(ApiResponse::success(cameras))
}

async fn get_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let camera = state
        .registry
        .camera(&id)
        .await
        .ok_or_else(|| Error::NotFound(format!("Camera {id} not found")))?;
    Ok(Json(ApiResponse::success(camera)))
}

async fn start_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.registry.start(&id).await?;
    Ok(Json(json!({
        "message": format!("Camera {id} started"),
        "camera_id": id
    })))
}

async fn stop_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.registry.stop(&id).await?;
    Ok(Json(json!({
        "message": format!("Camera {id} stopped"),
        "camera_id": id
    })))
}

async fn start_all_cameras(State(state): State<AppState>) -> impl IntoResponse {
    let outcomes = state.registry.start_all().await;
    Json(ApiResponse::success(outcomes))
}

async fn stop_all_cameras(State(state): State<AppState>) -> impl IntoResponse {
    let outcomes = state.registry.stop_all().await;
    Json(ApiResponse::success(outcomes))
}

// ========================================
// Confirmation Handlers
// ========================================

async fn confirm_entry(
    State(state): State<AppState>,
    Json(request): Json<ActionRequest>,
) -> impl IntoResponse {
    let result = state
        .confirmation
        .confirm(&request.plate_number, ConfirmAction::Entry)
        .await;

    Json(ActionResponse {
        success: result.success,
        message: result.message,
        spot_name: result.spot_name,
        duration_minutes: None,
        amount_charged: None,
    })
}

async fn confirm_exit(
    State(state): State<AppState>,
    Json(request): Json<ActionRequest>,
) -> impl IntoResponse {
    let result = state
        .confirmation
        .confirm(&request.plate_number, ConfirmAction::Exit)
        .await;

    Json(ActionResponse {
        success: result.success,
        message: result.message,
        spot_name: None,
        duration_minutes: result.duration_minutes,
        amount_charged: result.amount_charged,
    })
}

// ========================================
// One-Shot Detection Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct Base64ImageRequest {
    image: String,
}

async fn detect_from_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DetectionResponse>> {
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" || name == "image" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| Error::InvalidInput(format!("could not read upload: {e}")))?;
            image = Some(bytes.to_vec());
        }
    }

    let image = image.ok_or_else(|| Error::InvalidInput("missing image field".to_string()))?;
    let response = one_shot_detect(&state, &image).await?;
    Ok(Json(response))
}

async fn detect_from_base64(
    State(state): State<AppState>,
    Json(request): Json<Base64ImageRequest>,
) -> Result<Json<DetectionResponse>> {
    let image = BASE64
        .decode(request.image.trim())
        .map_err(|e| Error::InvalidInput(format!("invalid base64 image: {e}")))?;
    let response = one_shot_detect(&state, &image).await?;
    Ok(Json(response))
}

/// Run detection on a single still image.
///
/// Bypasses the streams and the dedup window entirely: a plate that passes
/// the gate is always reported, even if a stream just saw it.
async fn one_shot_detect(state: &AppState, image: &[u8]) -> Result<DetectionResponse> {
    if image.is_empty() {
        return Err(Error::InvalidInput("empty image".to_string()));
    }

    let candidates = state.detector.detect(image).await?;
    let gate = DetectionGate::new(state.config.min_confidence);

    let Some(candidate) = best_candidate(candidates, &gate) else {
        return Ok(DetectionResponse::none());
    };

    let plate = state.formats.normalize(&candidate.text);
    Ok(DetectionResponse {
        success: true,
        plate_text: Some(plate.canonical),
        raw_text: Some(candidate.text),
        confidence: Some(candidate.confidence),
        valid: Some(plate.valid),
        vehicle_class: candidate.vehicle_class,
        message: "Plate detected".to_string(),
    })
}

// ========================================
// Parking Backend Passthroughs
// ========================================

#[derive(Debug, Deserialize)]
struct LogsQuery {
    #[serde(default = "default_log_limit")]
    limit: usize,
}

fn default_log_limit() -> usize {
    50
}

async fn list_spots(State(state): State<AppState>) -> impl IntoResponse {
    let spots = state.parking.spots().await;
    Json(ApiResponse::success(spots))
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let logs = state.parking.recent_logs(query.limit).await;
    Json(ApiResponse::success(logs))
}

// ========================================
// WebSocket
// ========================================

/// Inbound client actions on the subscription boundary
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientAction {
    StartCamera { camera_id: String },
    StopCamera { camera_id: String },
    StartAll,
    StopAll,
    ConfirmEntry { plate_number: String },
    ConfirmExit { plate_number: String },
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle one WebSocket subscriber
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // One-time catch-up: current camera snapshot, before any live event.
    // This is not a replay; prior detections are gone.
    let snapshot = HubMessage::CameraList(state.registry.snapshot().await);
    match snapshot.to_json() {
        Ok(json) => {
            if sender.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize camera snapshot");
            return;
        }
    }

    let (subscriber_id, mut rx) = state.hub.register().await;

    // Forward hub messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Apply inbound client actions
    let action_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                handle_client_action(&action_state, &text).await;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(&subscriber_id).await;
}

async fn handle_client_action(state: &AppState, text: &str) {
    let action: ClientAction = match serde_json::from_str(text) {
        Ok(action) => action,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed client action");
            return;
        }
    };

    match action {
        ClientAction::StartCamera { camera_id } => {
            if let Err(e) = state.registry.start(&camera_id).await {
                tracing::warn!(camera_id = %camera_id, error = %e, "Start request failed");
            }
        }
        ClientAction::StopCamera { camera_id } => {
            if let Err(e) = state.registry.stop(&camera_id).await {
                tracing::warn!(camera_id = %camera_id, error = %e, "Stop request failed");
            }
        }
        ClientAction::StartAll => {
            state.registry.start_all().await;
        }
        ClientAction::StopAll => {
            state.registry.stop_all().await;
        }
        ClientAction::ConfirmEntry { plate_number } => {
            // Result reaches every subscriber through the hub
            state
                .confirmation
                .confirm(&plate_number, ConfirmAction::Entry)
                .await;
        }
        ClientAction::ConfirmExit { plate_number } => {
            state
                .confirmation
                .confirm(&plate_number, ConfirmAction::Exit)
                .await;
        }
    }
}
