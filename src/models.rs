//! Shared data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ApiError) -> ApiResponse<T> {
        ApiResponse {
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

/// API error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Role a camera plays in the confirmation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraRole {
    /// Gate where vehicles enter; new detections trigger entry confirmation
    Entry,
    /// Gate where vehicles leave; new detections trigger exit confirmation
    Exit,
    /// Observation only; never triggers confirmation
    Monitor,
}

impl CameraRole {
    /// Label used in events and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraRole::Entry => "entry",
            CameraRole::Exit => "exit",
            CameraRole::Monitor => "monitor",
        }
    }
}

/// De-duplicated, confidence-gated plate detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub camera_id: String,
    pub camera_role: CameraRole,
    /// Canonical plate string
    pub plate_text: String,
    /// OCR text as the recognizer produced it
    pub raw_text: String,
    pub confidence: f32,
    /// Whether a plate grammar matched
    pub valid: bool,
    pub detected_at: DateTime<Utc>,
}

/// Read-only view of one camera for listings and the connect-time snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSnapshot {
    pub id: String,
    pub name: String,
    pub role: CameraRole,
    pub source: String,
    /// Current lifecycle state, serialized as snake_case
    pub state: String,
    pub frame_count: u64,
    pub error: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub camera_mode: String,
    pub cameras_active: usize,
    pub parking_backend_connected: bool,
    pub detector_connected: bool,
}

/// Request body for manual entry/exit confirmation
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    pub plate_number: String,
    #[serde(default)]
    pub camera_id: Option<String>,
}

/// Response body for manual entry/exit confirmation
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_charged: Option<i64>,
}

/// Response body for one-shot detection
#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_class: Option<String>,
    pub message: String,
}

impl DetectionResponse {
    /// Response for a frame with no gated candidate
    pub fn none() -> Self {
        Self {
            success: false,
            plate_text: None,
            raw_text: None,
            confidence: None,
            valid: None,
            vehicle_class: None,
            message: "No plate detected".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_role_serialization() {
        assert_eq!(serde_json::to_string(&CameraRole::Entry).unwrap(), "\"entry\"");
        assert_eq!(serde_json::to_string(&CameraRole::Exit).unwrap(), "\"exit\"");
    }

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success(42);
        assert!(response.ok);
        assert_eq!(response.data, Some(42));
    }
}
