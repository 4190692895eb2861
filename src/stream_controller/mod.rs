//! StreamController - Per-Camera Stream Lifecycle and Detection Pipeline
//!
//! ## Responsibilities
//!
//! - Own one camera's lifecycle state machine
//! - Pull frames, apply frame-skip sampling, call the external detector
//! - Route candidates through gate, normalizer and dedup window
//! - Publish detections, previews and state changes to the RealtimeHub
//! - Trigger auto entry/exit confirmation by camera role
//!
//! Each controller runs its loop in its own task, concurrently with every
//! other camera; there is no global lock. The dedup window is owned by the
//! loop and mutated nowhere else. Per-frame detector failures are contained
//! to that frame; only source failures move the camera to Errored.

use crate::confirmation::{ConfirmAction, ConfirmationWorkflow};
use crate::detection_gate::DetectionGate;
use crate::detector_client::{PlateDetector, RawCandidate};
use crate::dedup_window::{DedupWindow, Observation};
use crate::error::Error;
use crate::frame_source::{FfmpegFrameSource, FfmpegOptions, Frame, FrameSource};
use crate::models::{CameraRole, CameraSnapshot, DetectionEvent};
use crate::plate_format::PlateFormats;
use crate::realtime_hub::{CameraStateMessage, HubMessage, PreviewFrameMessage, RealtimeHub};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};

/// Camera lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    Idle,
    Starting,
    Running,
    Stopping,
    Errored,
}

impl CameraState {
    /// Label used in events and listings
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraState::Idle => "idle",
            CameraState::Starting => "starting",
            CameraState::Running => "running",
            CameraState::Stopping => "stopping",
            CameraState::Errored => "errored",
        }
    }

    /// Whether `next` is reachable from this state in the lifecycle graph
    pub fn can_transition(&self, next: CameraState) -> bool {
        use CameraState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Errored)
                | (Running, Stopping)
                | (Running, Errored)
                | (Stopping, Idle)
                | (Stopping, Errored)
                | (Errored, Idle)
        )
    }
}

/// Pipeline parameters, fixed at process configuration time
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub min_confidence: f32,
    pub cooldown: Duration,
    /// Detect on every Nth frame only
    pub frame_skip: u32,
    /// Minimum spacing between preview emissions
    pub preview_interval: Duration,
    pub auto_confirm: bool,
    pub frame_width: u32,
    pub frame_height: u32,
    pub jpeg_quality: u8,
    /// Loop file playback (simulated camera mode)
    pub loop_playback: bool,
}

/// Observable per-camera state.
///
/// The owning controller mutates it; every other context reads through the
/// synchronized accessors.
pub struct CameraCell {
    pub id: String,
    pub name: String,
    pub role: CameraRole,
    pub source: String,
    state: RwLock<CameraState>,
    frame_count: AtomicU64,
    error: RwLock<Option<String>>,
}

impl CameraCell {
    /// Create a cell in the Idle state
    pub fn new(id: &str, name: &str, role: CameraRole, source: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role,
            source: source.to_string(),
            state: RwLock::new(CameraState::Idle),
            frame_count: AtomicU64::new(0),
            error: RwLock::new(None),
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> CameraState {
        *self.state.read().await
    }

    /// Record or clear the last error message
    pub async fn set_error(&self, message: Option<String>) {
        *self.error.write().await = message;
    }

    /// Read-only view for listings
    pub async fn snapshot(&self) -> CameraSnapshot {
        CameraSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
            source: self.source.clone(),
            state: self.state().await.as_str().to_string(),
            frame_count: self.frame_count.load(Ordering::Relaxed),
            error: self.error.read().await.clone(),
        }
    }

    /// Move to `next` and broadcast the change.
    ///
    /// A transition to the current state is a no-op producing no event; a
    /// transition outside the lifecycle graph is refused.
    pub async fn transition(&self, hub: &RealtimeHub, next: CameraState) -> bool {
        {
            let mut state = self.state.write().await;
            if *state == next {
                return false;
            }
            if !state.can_transition(next) {
                tracing::warn!(
                    camera_id = %self.id,
                    from = %state.as_str(),
                    to = %next.as_str(),
                    "Refusing transition outside the lifecycle graph"
                );
                return false;
            }
            *state = next;
        }

        let error = self.error.read().await.clone();
        hub.broadcast(HubMessage::CameraState(CameraStateMessage {
            camera_id: self.id.clone(),
            state: next.as_str().to_string(),
            error,
            timestamp: Utc::now().to_rfc3339(),
        }))
        .await;
        true
    }
}

/// Preview cadence limiter, independent from detection cadence
struct PreviewThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl PreviewThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(prev) if now.duration_since(prev) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Whether frame `index` (1-based) is eligible for detection
fn should_detect(index: u64, frame_skip: u32) -> bool {
    let skip = frame_skip.max(1) as u64;
    index % skip == 0
}

/// Highest-confidence candidate that passes the gate
pub fn best_candidate(candidates: Vec<RawCandidate>, gate: &DetectionGate) -> Option<RawCandidate> {
    candidates
        .into_iter()
        .filter(|c| gate.accept(c))
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// One camera's stream loop
pub struct StreamController {
    cell: Arc<CameraCell>,
    detector: Arc<dyn PlateDetector>,
    hub: Arc<RealtimeHub>,
    confirmation: Arc<ConfirmationWorkflow>,
    formats: Arc<PlateFormats>,
    config: PipelineConfig,
    gate: DetectionGate,
    dedup: DedupWindow,
    preview: PreviewThrottle,
    stop_rx: watch::Receiver<bool>,
}

impl StreamController {
    /// Create a controller; `stop_rx` flips to true when a stop is requested
    pub fn new(
        cell: Arc<CameraCell>,
        detector: Arc<dyn PlateDetector>,
        hub: Arc<RealtimeHub>,
        confirmation: Arc<ConfirmationWorkflow>,
        formats: Arc<PlateFormats>,
        config: PipelineConfig,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        let gate = DetectionGate::new(config.min_confidence);
        let dedup = DedupWindow::new(config.cooldown);
        let preview = PreviewThrottle::new(config.preview_interval);
        Self {
            cell,
            detector,
            hub,
            confirmation,
            formats,
            config,
            gate,
            dedup,
            preview,
            stop_rx,
        }
    }

    /// Run the read/detect/publish loop until the source ends, a stop is
    /// requested, or the source fails.
    pub async fn run(mut self) {
        let options = FfmpegOptions {
            width: self.config.frame_width,
            height: self.config.frame_height,
            jpeg_quality: self.config.jpeg_quality,
            loop_playback: self.config.loop_playback,
        };

        let mut source = match FfmpegFrameSource::open(&self.cell.source, options) {
            Ok(source) => source,
            Err(e) => {
                self.fail(e.to_string()).await;
                return;
            }
        };

        self.cell
            .transition(&self.hub, CameraState::Running)
            .await;
        tracing::info!(camera_id = %self.cell.id, source = %self.cell.source, "Camera stream running");

        let mut frame_index: u64 = 0;
        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            let next = tokio::select! {
                _ = self.stop_rx.changed() => break,
                frame = source.next_frame() => frame,
            };

            match next {
                Ok(frame) => {
                    frame_index += 1;
                    self.cell.frame_count.store(frame_index, Ordering::Relaxed);

                    let detection = if should_detect(frame_index, self.config.frame_skip) {
                        self.process_frame(&frame).await
                    } else {
                        None
                    };

                    self.maybe_preview(&frame, detection.map(|d| d.plate_text))
                        .await;
                }
                Err(Error::SourceExhausted) => {
                    tracing::info!(camera_id = %self.cell.id, "Source exhausted, stopping stream");
                    break;
                }
                Err(e) => {
                    source.close().await;
                    self.fail(e.to_string()).await;
                    return;
                }
            }
        }

        source.close().await;
        self.cell
            .transition(&self.hub, CameraState::Stopping)
            .await;
        self.cell.transition(&self.hub, CameraState::Idle).await;
        tracing::info!(camera_id = %self.cell.id, "Camera stream stopped");
    }

    /// Detect on one frame. Detector failures are contained here: the frame
    /// is skipped and the loop continues.
    async fn process_frame(&mut self, frame: &Frame) -> Option<DetectionEvent> {
        let candidates = match self.detector.detect(&frame.data).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(
                    camera_id = %self.cell.id,
                    error = %e,
                    "Detector failed, skipping frame"
                );
                return None;
            }
        };

        let candidate = best_candidate(candidates, &self.gate)?;
        let plate = self.formats.normalize(&candidate.text);

        match self.dedup.observe(&plate.canonical, Instant::now()) {
            Observation::Repeat => None,
            Observation::New => {
                let event = DetectionEvent {
                    camera_id: self.cell.id.clone(),
                    camera_role: self.cell.role,
                    plate_text: plate.canonical,
                    raw_text: candidate.text,
                    confidence: candidate.confidence,
                    valid: plate.valid,
                    detected_at: frame.captured_at,
                };

                tracing::info!(
                    camera_id = %self.cell.id,
                    plate = %event.plate_text,
                    confidence = event.confidence,
                    valid = event.valid,
                    "New plate detected"
                );

                self.hub
                    .broadcast(HubMessage::PlateDetected(event.clone()))
                    .await;

                if self.config.auto_confirm {
                    self.auto_confirm(&event);
                }

                Some(event)
            }
        }
    }

    /// Kick off entry/exit confirmation for a new detection, off the loop
    fn auto_confirm(&self, event: &DetectionEvent) {
        let action = match self.cell.role {
            CameraRole::Entry => ConfirmAction::Entry,
            CameraRole::Exit => ConfirmAction::Exit,
            CameraRole::Monitor => return,
        };

        let confirmation = self.confirmation.clone();
        let plate = event.plate_text.clone();
        tokio::spawn(async move {
            confirmation.confirm(&plate, action).await;
        });
    }

    /// Publish a preview frame if the throttle allows and anyone is listening
    async fn maybe_preview(&mut self, frame: &Frame, detection: Option<String>) {
        if self.hub.subscriber_count() == 0 {
            return;
        }
        if !self.preview.ready(Instant::now()) {
            return;
        }

        self.hub
            .broadcast(HubMessage::PreviewFrame(PreviewFrameMessage {
                camera_id: self.cell.id.clone(),
                frame: BASE64.encode(&frame.data),
                timestamp: frame.captured_at.to_rfc3339(),
                detection,
            }))
            .await;
    }

    /// Surface a source failure and recover the camera to Idle
    async fn fail(&self, message: String) {
        tracing::error!(camera_id = %self.cell.id, error = %message, "Camera stream failed");
        self.cell.set_error(Some(message)).await;
        self.cell
            .transition(&self.hub, CameraState::Errored)
            .await;
        self.cell.transition(&self.hub, CameraState::Idle).await;
    }
}
