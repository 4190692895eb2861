//! Confirmation - Entry/Exit Confirmation Workflow
//!
//! ## Responsibilities
//!
//! - Turn a detected or manually confirmed plate into a committed entry/exit
//! - Guard against duplicate in-flight confirmations per (plate, action)
//! - Broadcast every outcome through the RealtimeHub
//!
//! Each invocation makes exactly one backend call. A backend rejection ("no
//! free spot", "vehicle not currently parked") is a normal, user-visible
//! result, not a fault, and is broadcast like a success. The workflow never
//! retries; a retry is an explicit repeat of the same request. A confirm
//! request arriving while the identical (plate, action) pair is outstanding
//! is rejected immediately, not queued.

use crate::parking_client::ParkingClient;
use crate::realtime_hub::{HubMessage, RealtimeHub};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Confirmation action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmAction {
    Entry,
    Exit,
}

impl ConfirmAction {
    /// Label used in results and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmAction::Entry => "entry",
            ConfirmAction::Exit => "exit",
        }
    }
}

/// Outcome of one confirmation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationResult {
    pub action: ConfirmAction,
    pub plate_number: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_charged: Option<i64>,
    pub timestamp: String,
}

impl ConfirmationResult {
    fn rejection(plate_number: &str, action: ConfirmAction, message: &str) -> Self {
        Self {
            action,
            plate_number: plate_number.to_string(),
            success: false,
            message: message.to_string(),
            spot_name: None,
            duration_minutes: None,
            amount_charged: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Confirmation workflow instance
pub struct ConfirmationWorkflow {
    parking: Arc<ParkingClient>,
    hub: Arc<RealtimeHub>,
    /// Outstanding (plate, action) pairs
    in_flight: Mutex<HashSet<(String, ConfirmAction)>>,
}

impl ConfirmationWorkflow {
    /// Create a new workflow
    pub fn new(parking: Arc<ParkingClient>, hub: Arc<RealtimeHub>) -> Self {
        Self {
            parking,
            hub,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Run one confirmation for `plate_number`.
    ///
    /// The backend outcome is broadcast regardless of success. A duplicate
    /// request while the identical pair is outstanding resolves immediately
    /// as an "already in progress" rejection and is not broadcast (no
    /// backend call happened).
    pub async fn confirm(&self, plate_number: &str, action: ConfirmAction) -> ConfirmationResult {
        if !self.try_begin(plate_number, action).await {
            tracing::warn!(
                plate = %plate_number,
                action = %action.as_str(),
                "Confirmation already in progress"
            );
            return ConfirmationResult::rejection(
                plate_number,
                action,
                "Confirmation already in progress",
            );
        }

        let result = match action {
            ConfirmAction::Entry => {
                let outcome = self.parking.vehicle_entry(plate_number).await;
                ConfirmationResult {
                    action,
                    plate_number: plate_number.to_string(),
                    success: outcome.success,
                    message: outcome.message,
                    spot_name: outcome.spot_name,
                    duration_minutes: None,
                    amount_charged: None,
                    timestamp: Utc::now().to_rfc3339(),
                }
            }
            ConfirmAction::Exit => {
                let outcome = self.parking.vehicle_exit(plate_number).await;
                ConfirmationResult {
                    action,
                    plate_number: plate_number.to_string(),
                    success: outcome.success,
                    message: outcome.message,
                    spot_name: None,
                    duration_minutes: outcome.duration_minutes,
                    amount_charged: outcome.amount_charged,
                    timestamp: Utc::now().to_rfc3339(),
                }
            }
        };

        self.finish(plate_number, action).await;

        tracing::info!(
            plate = %plate_number,
            action = %action.as_str(),
            success = result.success,
            message = %result.message,
            "Confirmation completed"
        );

        self.hub
            .broadcast(HubMessage::ConfirmationResult(result.clone()))
            .await;

        result
    }

    /// Atomically claim the (plate, action) pair; false if already claimed
    async fn try_begin(&self, plate_number: &str, action: ConfirmAction) -> bool {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.insert((plate_number.to_string(), action))
    }

    /// Release the (plate, action) pair
    async fn finish(&self, plate_number: &str, action: ConfirmAction) {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.remove(&(plate_number.to_string(), action));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow() -> ConfirmationWorkflow {
        // Unroutable backend: every call resolves as a failed result
        let parking = Arc::new(ParkingClient::new("http://127.0.0.1:9"));
        let hub = Arc::new(RealtimeHub::new(8));
        ConfirmationWorkflow::new(parking, hub)
    }

    #[tokio::test]
    async fn test_in_flight_check_and_set() {
        let workflow = workflow();
        assert!(workflow.try_begin("WP CA-1234", ConfirmAction::Entry).await);
        assert!(!workflow.try_begin("WP CA-1234", ConfirmAction::Entry).await);
        workflow.finish("WP CA-1234", ConfirmAction::Entry).await;
        assert!(workflow.try_begin("WP CA-1234", ConfirmAction::Entry).await);
    }

    #[tokio::test]
    async fn test_distinct_pairs_do_not_conflict() {
        let workflow = workflow();
        assert!(workflow.try_begin("WP CA-1234", ConfirmAction::Entry).await);
        assert!(workflow.try_begin("WP CA-1234", ConfirmAction::Exit).await);
        assert!(workflow.try_begin("WP 1234", ConfirmAction::Entry).await);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_while_outstanding() {
        let workflow = workflow();
        // Simulate an outstanding confirmation for the pair
        assert!(workflow.try_begin("WP CA-1234", ConfirmAction::Entry).await);

        let result = workflow.confirm("WP CA-1234", ConfirmAction::Entry).await;
        assert!(!result.success);
        assert!(result.message.contains("already in progress"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_a_result_and_releases_in_flight() {
        let workflow = workflow();

        let result = workflow.confirm("WP CA-1234", ConfirmAction::Entry).await;
        assert!(!result.success);

        // The pair is free again: failure is terminal for the attempt only
        assert!(workflow.try_begin("WP CA-1234", ConfirmAction::Entry).await);
    }

    #[tokio::test]
    async fn test_backend_result_broadcast() {
        let parking = Arc::new(ParkingClient::new("http://127.0.0.1:9"));
        let hub = Arc::new(RealtimeHub::new(8));
        let (_id, mut rx) = hub.register().await;
        let workflow = ConfirmationWorkflow::new(parking, hub);

        workflow.confirm("WP CA-1234", ConfirmAction::Exit).await;

        let json = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "confirmation_result");
        assert_eq!(value["data"]["action"], "exit");
        assert_eq!(value["data"]["success"], false);
    }
}
