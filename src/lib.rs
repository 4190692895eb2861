//! Sentra LPR Service Library
//!
//! License plate recognition gateway for the Sentra parking system.
//!
//! ## Architecture
//!
//! 1. PlateFormats - plate grammar table and OCR normalization
//! 2. DetectionGate - confidence gate in front of the pipeline
//! 3. DedupWindow - per-camera repeat suppression
//! 4. StreamController - camera lifecycle and detection loop
//! 5. StreamRegistry - camera set ownership, start/stop supervision
//! 6. RealtimeHub - WebSocket event distribution
//! 7. ConfirmationWorkflow - entry/exit commits against the parking backend
//! 8. DetectorClient / ParkingClient - external service adapters
//! 9. FrameSource - ffmpeg-backed frame acquisition
//! 10. WebAPI - REST and WebSocket endpoints
//!
//! ## Design Principles
//!
//! - Each camera stream runs independently; no global lock across cameras
//! - Noise never reaches dedup state: the gate filters first
//! - Failures are contained: a bad frame never kills a stream, a bad stream
//!   never touches another camera, a backend rejection is a result

pub mod confirmation;
pub mod dedup_window;
pub mod detection_gate;
pub mod detector_client;
pub mod error;
pub mod frame_source;
pub mod models;
pub mod parking_client;
pub mod plate_format;
pub mod realtime_hub;
pub mod state;
pub mod stream_controller;
pub mod stream_registry;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
