//! RealtimeHub - WebSocket Event Distribution
//!
//! ## Responsibilities
//!
//! - Subscriber connection management
//! - Broadcasting detections, preview frames, confirmation results and
//!   camera state changes
//!
//! Delivery is push-only and at-most-once per subscriber per event: there is
//! no replay for late subscribers (the connect-time camera snapshot is sent
//! by the WebSocket handler, not recorded here). Each subscriber owns a
//! bounded queue; a full queue drops that subscriber's copy of the event and
//! a closed queue removes the subscriber. Publication never waits on a
//! subscriber's I/O.

use crate::confirmation::ConfirmationResult;
use crate::models::{CameraSnapshot, DetectionEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    /// Current camera list; sent once to a fresh subscriber on connect
    CameraList(Vec<CameraSnapshot>),
    /// Live preview frame at reduced rate
    PreviewFrame(PreviewFrameMessage),
    /// New de-duplicated plate detection
    PlateDetected(DetectionEvent),
    /// Outcome of an entry/exit confirmation, success or not
    ConfirmationResult(ConfirmationResult),
    /// Camera lifecycle state change
    CameraState(CameraStateMessage),
}

impl HubMessage {
    /// Serialize for the wire
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Preview frame message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewFrameMessage {
    pub camera_id: String,
    /// Base64-encoded JPEG
    pub frame: String,
    pub timestamp: String,
    /// Canonical plate text when this frame carried a new detection
    pub detection: Option<String>,
}

/// Camera state change message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStateMessage {
    pub camera_id: String,
    pub state: String,
    pub error: Option<String>,
    pub timestamp: String,
}

/// Subscriber connection
struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    subscriber_count: AtomicU64,
    dropped_messages: AtomicU64,
    queue_capacity: usize,
}

impl RealtimeHub {
    /// Create a hub with the given per-subscriber queue capacity
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            subscriber_count: AtomicU64::new(0),
            dropped_messages: AtomicU64::new(0),
            queue_capacity,
        }
    }

    /// Register a new subscriber
    pub async fn register(&self) -> (Uuid, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(id, Subscriber { id, tx });
        }
        self.subscriber_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(subscriber_id = %id, "Subscriber connected");

        (id, rx)
    }

    /// Unregister a subscriber
    pub async fn unregister(&self, id: &Uuid) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(id).is_some() {
            self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(subscriber_id = %id, "Subscriber disconnected");
        }
    }

    /// Broadcast a message to every subscriber connected right now.
    ///
    /// Non-blocking per subscriber: a full queue drops this message for that
    /// subscriber only; a closed queue removes the subscriber.
    pub async fn broadcast(&self, message: HubMessage) {
        let json = match message.to_json() {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize hub message");
                return;
            }
        };

        let mut closed: Vec<Uuid> = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for subscriber in subscribers.values() {
                match subscriber.tx.try_send(json.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            subscriber_id = %subscriber.id,
                            "Subscriber queue full, dropping message"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(subscriber.id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in closed {
                if subscribers.remove(&id).is_some() {
                    self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
                    tracing::info!(subscriber_id = %id, "Removed dead subscriber");
                }
            }
        }
    }

    /// Number of connected subscribers
    pub fn subscriber_count(&self) -> u64 {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    /// Messages dropped because of full subscriber queues
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CameraRole;
    use chrono::Utc;

    fn detection() -> HubMessage {
        HubMessage::PlateDetected(DetectionEvent {
            camera_id: "entry_cam_01".to_string(),
            camera_role: CameraRole::Entry,
            plate_text: "WP CA-1234".to_string(),
            raw_text: "WPCA1234".to_string(),
            confidence: 0.9,
            valid: true,
            detected_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_subscriber_receives_broadcast() {
        let hub = RealtimeHub::new(8);
        let (_id, mut rx) = hub.register().await;

        hub.broadcast(detection()).await;

        let json = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "plate_detected");
        assert_eq!(value["data"]["plate_text"], "WP CA-1234");
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscriber() {
        let hub = RealtimeHub::new(8);

        hub.broadcast(detection()).await;
        hub.broadcast(detection()).await;

        let (_id, mut rx) = hub.register().await;
        assert!(rx.try_recv().is_err(), "late subscriber must not see prior events");

        hub.broadcast(detection()).await;
        assert!(rx.recv().await.is_some(), "subsequent event must arrive");
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking_others() {
        let hub = RealtimeHub::new(1);
        let (_slow, _slow_rx) = hub.register().await;
        let (_fast, mut fast_rx) = hub.register().await;

        // First message fills the slow subscriber's queue (never drained)
        hub.broadcast(detection()).await;
        // Second overflows it but must still reach the other subscriber
        hub.broadcast(detection()).await;

        assert!(fast_rx.recv().await.is_some());
        assert!(fast_rx.recv().await.is_some());
        assert_eq!(hub.dropped_messages(), 1);
        // A slow subscriber is dropped-from, not removed
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_closed_subscriber_removed() {
        let hub = RealtimeHub::new(8);
        let (_id, rx) = hub.register().await;
        drop(rx);

        hub.broadcast(detection()).await;
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let hub = RealtimeHub::new(8);
        let (id, _rx) = hub.register().await;
        hub.unregister(&id).await;
        hub.unregister(&id).await;
        assert_eq!(hub.subscriber_count(), 0);
    }
}
