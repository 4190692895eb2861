//! StreamRegistry - Camera Set Ownership and Stream Supervision
//!
//! ## Responsibilities
//!
//! - Hold the fixed set of configured cameras (single source of truth for
//!   which cameras exist and whether they are running)
//! - Start/stop individual cameras or all of them, idempotently
//! - Expose read-only snapshots for listings and the connect-time catch-up
//!
//! Cameras are created at configuration time and never removed; stopping a
//! camera leaves it in the set. Stopping is cooperative with a hard timeout:
//! if the source never yields, the task is aborted and the camera forced
//! through Errored back to Idle with its resources released.

use crate::confirmation::ConfirmationWorkflow;
use crate::detector_client::PlateDetector;
use crate::models::{CameraRole, CameraSnapshot};
use crate::plate_format::PlateFormats;
use crate::realtime_hub::RealtimeHub;
use crate::stream_controller::{
    CameraCell, CameraState, PipelineConfig, StreamController,
};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// A configured camera source
#[derive(Debug, Clone)]
pub struct CameraSource {
    pub id: String,
    pub name: String,
    pub role: CameraRole,
    /// File path or network stream URI
    pub source: String,
}

/// Per-camera outcome of a start-all / stop-all request
#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub camera_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Running stream resources for one camera
struct CameraRuntime {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct ManagedCamera {
    cell: Arc<CameraCell>,
    runtime: Mutex<Option<CameraRuntime>>,
}

/// StreamRegistry instance
pub struct StreamRegistry {
    cameras: BTreeMap<String, ManagedCamera>,
    detector: Arc<dyn PlateDetector>,
    hub: Arc<RealtimeHub>,
    confirmation: Arc<ConfirmationWorkflow>,
    formats: Arc<PlateFormats>,
    config: PipelineConfig,
    stop_timeout: Duration,
}

impl StreamRegistry {
    /// Create a registry over the configured camera set
    pub fn new(
        sources: Vec<CameraSource>,
        detector: Arc<dyn PlateDetector>,
        hub: Arc<RealtimeHub>,
        confirmation: Arc<ConfirmationWorkflow>,
        formats: Arc<PlateFormats>,
        config: PipelineConfig,
        stop_timeout: Duration,
    ) -> Self {
        let cameras = sources
            .into_iter()
            .map(|s| {
                let cell = Arc::new(CameraCell::new(&s.id, &s.name, s.role, &s.source));
                (
                    s.id,
                    ManagedCamera {
                        cell,
                        runtime: Mutex::new(None),
                    },
                )
            })
            .collect();

        Self {
            cameras,
            detector,
            hub,
            confirmation,
            formats,
            config,
            stop_timeout,
        }
    }

    /// Start a camera's stream. Already starting or running: no-op.
    pub async fn start(&self, camera_id: &str) -> Result<()> {
        let camera = self
            .cameras
            .get(camera_id)
            .ok_or_else(|| Error::NotFound(format!("Camera {camera_id} not found")))?;

        let mut runtime = camera.runtime.lock().await;

        // Reap a loop that ended on its own (EOF or source failure)
        if runtime
            .as_ref()
            .map(|rt| rt.handle.is_finished())
            .unwrap_or(false)
        {
            *runtime = None;
        }
        if runtime.is_some() {
            tracing::debug!(camera_id = %camera_id, "Camera already running");
            return Ok(());
        }

        camera.cell.set_error(None).await;
        camera
            .cell
            .transition(&self.hub, CameraState::Starting)
            .await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let controller = StreamController::new(
            camera.cell.clone(),
            self.detector.clone(),
            self.hub.clone(),
            self.confirmation.clone(),
            self.formats.clone(),
            self.config.clone(),
            stop_rx,
        );
        let handle = tokio::spawn(controller.run());

        *runtime = Some(CameraRuntime { stop_tx, handle });

        tracing::info!(camera_id = %camera_id, "Camera start requested");
        Ok(())
    }

    /// Stop a camera's stream. Already idle: no-op producing no state event.
    ///
    /// Returns once the controller reached Idle or the stop timeout elapsed,
    /// in which case the task is aborted and the camera forced through
    /// Errored back to Idle.
    pub async fn stop(&self, camera_id: &str) -> Result<()> {
        let camera = self
            .cameras
            .get(camera_id)
            .ok_or_else(|| Error::NotFound(format!("Camera {camera_id} not found")))?;

        let mut runtime_guard = camera.runtime.lock().await;
        let Some(runtime) = runtime_guard.take() else {
            tracing::debug!(camera_id = %camera_id, "Camera already idle");
            return Ok(());
        };

        let CameraRuntime { stop_tx, mut handle } = runtime;
        if handle.is_finished() {
            // Loop already exited and settled its own state
            return Ok(());
        }

        camera
            .cell
            .transition(&self.hub, CameraState::Stopping)
            .await;
        let _ = stop_tx.send(true);

        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(_) => {
                tracing::info!(camera_id = %camera_id, "Camera stopped");
            }
            Err(_) => {
                handle.abort();
                tracing::warn!(camera_id = %camera_id, "Stop timed out, aborting stream task");
                camera
                    .cell
                    .set_error(Some("stop timed out: source unresponsive".to_string()))
                    .await;
                camera
                    .cell
                    .transition(&self.hub, CameraState::Errored)
                    .await;
                camera.cell.transition(&self.hub, CameraState::Idle).await;
            }
        }

        Ok(())
    }

    /// Start every camera; one camera's failure never blocks the others
    pub async fn start_all(&self) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(self.cameras.len());
        for camera_id in self.cameras.keys() {
            let result = self.start(camera_id).await;
            outcomes.push(BatchOutcome {
                camera_id: camera_id.clone(),
                ok: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }
        outcomes
    }

    /// Stop every camera, reporting per-camera outcomes
    pub async fn stop_all(&self) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(self.cameras.len());
        for camera_id in self.cameras.keys() {
            let result = self.stop(camera_id).await;
            outcomes.push(BatchOutcome {
                camera_id: camera_id.clone(),
                ok: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }
        outcomes
    }

    /// Snapshot of every camera for listings and connect-time catch-up
    pub async fn snapshot(&self) -> Vec<CameraSnapshot> {
        let mut cameras = Vec::with_capacity(self.cameras.len());
        for camera in self.cameras.values() {
            cameras.push(camera.cell.snapshot().await);
        }
        cameras
    }

    /// Snapshot of one camera
    pub async fn camera(&self, camera_id: &str) -> Option<CameraSnapshot> {
        match self.cameras.get(camera_id) {
            Some(camera) => Some(camera.cell.snapshot().await),
            None => None,
        }
    }

    /// Number of cameras currently running
    pub async fn active_count(&self) -> usize {
        let mut count = 0;
        for camera in self.cameras.values() {
            if camera.cell.state().await == CameraState::Running {
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parking_client::ParkingClient;
    use crate::detector_client::RawCandidate;
    use async_trait::async_trait;

    struct NullDetector;

    #[async_trait]
    impl PlateDetector for NullDetector {
        async fn detect(&self, _image: &[u8]) -> Result<Vec<RawCandidate>> {
            Ok(Vec::new())
        }
    }

    fn pipeline_config() -> PipelineConfig {
        PipelineConfig {
            min_confidence: 0.6,
            cooldown: Duration::from_secs(3),
            frame_skip: 2,
            preview_interval: Duration::from_millis(200),
            auto_confirm: false,
            frame_width: 640,
            frame_height: 480,
            jpeg_quality: 80,
            loop_playback: false,
        }
    }

    fn registry(sources: Vec<CameraSource>) -> StreamRegistry {
        let hub = Arc::new(RealtimeHub::new(8));
        let parking = Arc::new(ParkingClient::new("http://127.0.0.1:9"));
        let confirmation = Arc::new(ConfirmationWorkflow::new(parking, hub.clone()));
        StreamRegistry::new(
            sources,
            Arc::new(NullDetector),
            hub,
            confirmation,
            Arc::new(PlateFormats::new()),
            pipeline_config(),
            Duration::from_secs(2),
        )
    }

    fn sources() -> Vec<CameraSource> {
        vec![
            CameraSource {
                id: "entry_cam_01".to_string(),
                name: "Entry Gate 01".to_string(),
                role: CameraRole::Entry,
                source: "/nonexistent/entry.mp4".to_string(),
            },
            CameraSource {
                id: "exit_cam_01".to_string(),
                name: "Exit Gate 01".to_string(),
                role: CameraRole::Exit,
                source: "/nonexistent/exit.mp4".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_snapshot_lists_configured_cameras() {
        let registry = registry(sources());
        let cameras = registry.snapshot().await;
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].id, "entry_cam_01");
        assert_eq!(cameras[0].state, "idle");
        assert_eq!(cameras[1].role, CameraRole::Exit);
    }

    #[tokio::test]
    async fn test_start_unknown_camera_is_not_found() {
        let registry = registry(sources());
        assert!(matches!(
            registry.start("ghost_cam").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_idle_camera_is_noop() {
        let registry = registry(sources());
        assert!(registry.stop("entry_cam_01").await.is_ok());
        assert_eq!(
            registry.camera("entry_cam_01").await.unwrap().state,
            "idle"
        );
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let registry = registry(sources());
        assert!(registry.start("entry_cam_01").await.is_ok());
        assert!(registry.start("entry_cam_01").await.is_ok());
        let _ = registry.stop("entry_cam_01").await;
    }

    #[tokio::test]
    async fn test_bad_source_recovers_to_idle_with_error() {
        let registry = registry(sources());
        registry.start("entry_cam_01").await.unwrap();

        // The loop fails to open the source, surfaces Errored and recovers
        let mut state = String::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let camera = registry.camera("entry_cam_01").await.unwrap();
            state = camera.state.clone();
            if state == "idle" && camera.error.is_some() {
                break;
            }
        }

        let camera = registry.camera("entry_cam_01").await.unwrap();
        assert_eq!(state, "idle");
        assert!(camera.error.is_some());

        // Other cameras are unaffected
        assert_eq!(registry.camera("exit_cam_01").await.unwrap().state, "idle");
    }

    #[tokio::test]
    async fn test_start_all_reports_per_camera() {
        let registry = registry(sources());
        let outcomes = registry.start_all().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.ok));
        let _ = registry.stop_all().await;
    }
}
