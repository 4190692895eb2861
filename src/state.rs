//! Application state
//!
//! Holds configuration and all shared components

use crate::confirmation::ConfirmationWorkflow;
use crate::detector_client::HttpDetectorClient;
use crate::parking_client::ParkingClient;
use crate::plate_format::PlateFormats;
use crate::realtime_hub::RealtimeHub;
use crate::stream_controller::PipelineConfig;
use crate::stream_registry::{CameraSource, StreamRegistry};
use crate::models::CameraRole;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration, environment-driven
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Parking backend base URL
    pub parking_api_url: String,
    /// Detection service base URL
    pub detector_url: String,
    /// Detector request timeout in seconds
    pub detector_timeout_secs: u64,
    /// Minimum candidate confidence
    pub min_confidence: f32,
    /// Dedup cooldown in seconds
    pub detection_cooldown_secs: u64,
    /// Detect on every Nth frame
    pub frame_skip: u32,
    /// Preview frame width
    pub frame_width: u32,
    /// Preview frame height
    pub frame_height: u32,
    /// Preview JPEG quality 0-100
    pub jpeg_quality: u8,
    /// Preview emission ceiling in frames per second
    pub preview_max_fps: u32,
    /// Confirm entry/exit automatically on new detections
    pub auto_entry_exit: bool,
    /// `simulated` loops file sources; `live` treats EOF as end of stream
    pub camera_mode: String,
    /// Entry gate camera locator
    pub entry_camera_source: String,
    /// Exit gate camera locator
    pub exit_camera_source: String,
    /// Bound on cooperative stream stop in seconds
    pub stop_timeout_secs: u64,
    /// Per-subscriber WebSocket queue capacity
    pub ws_queue_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5001),
            parking_api_url: std::env::var("PARKING_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5000".to_string()),
            detector_url: std::env::var("DETECTOR_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5002".to_string()),
            detector_timeout_secs: std::env::var("DETECTOR_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            min_confidence: std::env::var("MIN_CONFIDENCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.6),
            detection_cooldown_secs: std::env::var("DETECTION_COOLDOWN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            frame_skip: std::env::var("FRAME_SKIP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            frame_width: std::env::var("FRAME_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(640),
            frame_height: std::env::var("FRAME_HEIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(480),
            jpeg_quality: std::env::var("JPEG_QUALITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(80),
            preview_max_fps: std::env::var("PREVIEW_MAX_FPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            auto_entry_exit: std::env::var("AUTO_ENTRY_EXIT")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            camera_mode: std::env::var("CAMERA_MODE").unwrap_or_else(|_| "simulated".to_string()),
            entry_camera_source: std::env::var("ENTRY_CAMERA_SOURCE")
                .unwrap_or_else(|_| "sample_videos/sample_video.mp4".to_string()),
            exit_camera_source: std::env::var("EXIT_CAMERA_SOURCE")
                .unwrap_or_else(|_| "sample_videos/sample_video.mp4".to_string()),
            stop_timeout_secs: std::env::var("STOP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            ws_queue_capacity: std::env::var("WS_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(64),
        }
    }
}

impl AppConfig {
    /// Pipeline parameters handed to every stream controller
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            min_confidence: self.min_confidence,
            cooldown: Duration::from_secs(self.detection_cooldown_secs),
            frame_skip: self.frame_skip,
            preview_interval: Duration::from_millis(1000 / u64::from(self.preview_max_fps.max(1))),
            auto_confirm: self.auto_entry_exit,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            jpeg_quality: self.jpeg_quality,
            loop_playback: self.camera_mode == "simulated",
        }
    }

    /// The configured camera set: one entry gate, one exit gate
    pub fn camera_sources(&self) -> Vec<CameraSource> {
        vec![
            CameraSource {
                id: "entry_cam_01".to_string(),
                name: "Entry Gate 01".to_string(),
                role: CameraRole::Entry,
                source: self.entry_camera_source.clone(),
            },
            CameraSource {
                id: "exit_cam_01".to_string(),
                name: "Exit Gate 01".to_string(),
                role: CameraRole::Exit,
                source: self.exit_camera_source.clone(),
            },
        ]
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// StreamRegistry (camera supervision)
    pub registry: Arc<StreamRegistry>,
    /// RealtimeHub (WebSocket fan-out)
    pub hub: Arc<RealtimeHub>,
    /// Detection service client
    pub detector: Arc<HttpDetectorClient>,
    /// Parking backend client
    pub parking: Arc<ParkingClient>,
    /// Confirmation workflow
    pub confirmation: Arc<ConfirmationWorkflow>,
    /// Plate grammar table
    pub formats: Arc<PlateFormats>,
}

impl AppState {
    /// Wire up all components from configuration
    pub fn new(config: AppConfig) -> Self {
        let hub = Arc::new(RealtimeHub::new(config.ws_queue_capacity));
        let detector = Arc::new(HttpDetectorClient::new(
            &config.detector_url,
            Duration::from_secs(config.detector_timeout_secs),
        ));
        let parking = Arc::new(ParkingClient::new(&config.parking_api_url));
        let confirmation = Arc::new(ConfirmationWorkflow::new(parking.clone(), hub.clone()));
        let formats = Arc::new(PlateFormats::new());

        let registry = Arc::new(StreamRegistry::new(
            config.camera_sources(),
            detector.clone(),
            hub.clone(),
            confirmation.clone(),
            formats.clone(),
            config.pipeline(),
            Duration::from_secs(config.stop_timeout_secs),
        ));

        Self {
            config,
            registry,
            hub,
            detector,
            parking,
            confirmation,
            formats,
        }
    }
}
