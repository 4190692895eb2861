//! ParkingClient - Parking Backend Adapter
//!
//! ## Responsibilities
//!
//! - Vehicle entry/exit registration against the parking backend
//! - Spot and log queries for the dashboard
//! - Health checks
//!
//! Backend failures are results, never faults: a business rejection ("no free
//! spot") and a transport error both come back as an unsuccessful outcome
//! carrying a message. The client does not retry; a retry is an explicit
//! repeat of the same idempotent request by the caller.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Outcome of a vehicle entry request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub success: bool,
    pub message: String,
    pub spot_name: Option<String>,
    pub status: Option<String>,
}

/// Outcome of a vehicle exit request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitOutcome {
    pub success: bool,
    pub message: String,
    pub duration_minutes: Option<i64>,
    pub amount_charged: Option<i64>,
}

/// Backend response body for entry/exit endpoints
#[derive(Debug, Deserialize)]
struct BackendBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    spot: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    duration_minutes: Option<i64>,
    #[serde(default)]
    amount_charged: Option<i64>,
}

/// HTTP client for the parking system backend
pub struct ParkingClient {
    http: reqwest::Client,
    base_url: String,
}

impl ParkingClient {
    /// Create a new client for the given backend base URL
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check if the parking backend is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/spots", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "Parking backend health check failed");
                false
            }
        }
    }

    /// Register a vehicle entry
    pub async fn vehicle_entry(&self, plate_number: &str) -> EntryOutcome {
        let url = format!("{}/api/vehicle/entry", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "plate_number": plate_number }))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                return EntryOutcome {
                    success: false,
                    message: format!("Connection error: {e}"),
                    spot_name: None,
                    status: None,
                }
            }
        };

        let success = response.status().is_success();
        let body: BackendBody = response.json().await.unwrap_or(BackendBody {
            message: None,
            spot: None,
            status: None,
            duration_minutes: None,
            amount_charged: None,
        });

        EntryOutcome {
            success,
            message: body.message.unwrap_or_else(|| {
                if success {
                    "Entry successful".to_string()
                } else {
                    "Entry failed".to_string()
                }
            }),
            spot_name: body.spot,
            status: body.status,
        }
    }

    /// Register a vehicle exit
    pub async fn vehicle_exit(&self, plate_number: &str) -> ExitOutcome {
        let url = format!("{}/api/vehicle/exit", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "plate_number": plate_number }))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                return ExitOutcome {
                    success: false,
                    message: format!("Connection error: {e}"),
                    duration_minutes: None,
                    amount_charged: None,
                }
            }
        };

        let success = response.status().is_success();
        let body: BackendBody = response.json().await.unwrap_or(BackendBody {
            message: None,
            spot: None,
            status: None,
            duration_minutes: None,
            amount_charged: None,
        });

        ExitOutcome {
            success,
            message: body.message.unwrap_or_else(|| {
                if success {
                    "Exit successful".to_string()
                } else {
                    "Exit failed".to_string()
                }
            }),
            duration_minutes: body.duration_minutes,
            amount_charged: body.amount_charged,
        }
    }

    /// Fetch all parking spots
    pub async fn spots(&self) -> Vec<serde_json::Value> {
        let url = format!("{}/api/spots", self.base_url);
        match self.fetch_list(&url, "spots").await {
            Ok(spots) => spots,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch spots");
                Vec::new()
            }
        }
    }

    /// Fetch recent parking logs
    pub async fn recent_logs(&self, limit: usize) -> Vec<serde_json::Value> {
        let url = format!("{}/api/logs", self.base_url);
        match self.fetch_list(&url, "logs").await {
            Ok(logs) => logs.into_iter().take(limit).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch logs");
                Vec::new()
            }
        }
    }

    async fn fetch_list(&self, url: &str, key: &str) -> reqwest::Result<Vec<serde_json::Value>> {
        let body: serde_json::Value = self.http.get(url).send().await?.json().await?;
        Ok(body
            .get(key)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry_body() {
        let body: BackendBody =
            serde_json::from_str(r#"{"message": "Assigned", "spot": "A-12", "status": "parked"}"#)
                .unwrap();
        assert_eq!(body.spot.as_deref(), Some("A-12"));
        assert_eq!(body.message.as_deref(), Some("Assigned"));
    }

    #[test]
    fn test_parse_exit_body() {
        let body: BackendBody =
            serde_json::from_str(r#"{"message": "Goodbye", "duration_minutes": 42, "amount_charged": 300}"#)
                .unwrap();
        assert_eq!(body.duration_minutes, Some(42));
        assert_eq!(body.amount_charged, Some(300));
    }

    #[test]
    fn test_parse_empty_body() {
        let body: BackendBody = serde_json::from_str("{}").unwrap();
        assert!(body.message.is_none());
        assert!(body.spot.is_none());
    }
}
