//! DetectorClient - External Plate Detector / OCR Adapter
//!
//! ## Responsibilities
//!
//! - Send frames to the detection service
//! - Parse candidate lists from the response
//! - Connection management
//!
//! The detector is a black box: given an image it returns zero or more
//! `(bounding box, raw text, confidence)` candidates. It may be slow; callers
//! must not assume bounded latency. Any transport or parse failure surfaces
//! as [`Error::Detector`] so the caller can skip the frame and continue.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Unfiltered, unvalidated recognition candidate from one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCandidate {
    /// Raw OCR text as the recognizer produced it
    pub text: String,
    /// Recognition confidence in [0, 1]
    pub confidence: f32,
    /// Plate bounding box, if the detector localized it
    pub bbox: Option<BBox>,
    /// Vehicle class label (car, bus, ...), if detected
    pub vehicle_class: Option<String>,
}

/// Detection service response body
#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    candidates: Vec<CandidateBody>,
}

#[derive(Debug, Deserialize)]
struct CandidateBody {
    text: String,
    confidence: f32,
    #[serde(default)]
    bbox: Option<BBox>,
    #[serde(default)]
    vehicle_class: Option<String>,
}

impl From<CandidateBody> for RawCandidate {
    fn from(body: CandidateBody) -> Self {
        RawCandidate {
            text: body.text,
            confidence: body.confidence.clamp(0.0, 1.0),
            bbox: body.bbox,
            vehicle_class: body.vehicle_class,
        }
    }
}

/// External detector boundary
#[async_trait]
pub trait PlateDetector: Send + Sync {
    /// Run detection over one JPEG frame
    async fn detect(&self, image: &[u8]) -> Result<Vec<RawCandidate>>;
}

/// HTTP client for the detection service
pub struct HttpDetectorClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDetectorClient {
    /// Create a new client for the given detector base URL
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check detector reachability
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.http.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl PlateDetector for HttpDetectorClient {
    async fn detect(&self, image: &[u8]) -> Result<Vec<RawCandidate>> {
        let part = Part::bytes(image.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| Error::Detector(format!("invalid multipart: {e}")))?;
        let form = Form::new().part("image", part);

        let url = format!("{}/detect", self.base_url);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Detector(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Detector(format!(
                "detector returned {}",
                response.status()
            )));
        }

        let body: DetectResponse = response
            .json()
            .await
            .map_err(|e| Error::Detector(format!("malformed response: {e}")))?;

        Ok(body.candidates.into_iter().map(RawCandidate::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detect_response() {
        let body = r#"{
            "candidates": [
                {"text": "WPCA1234", "confidence": 0.91,
                 "bbox": {"x1": 10.0, "y1": 20.0, "x2": 110.0, "y2": 60.0},
                 "vehicle_class": "car"}
            ]
        }"#;
        let parsed: DetectResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.candidates.len(), 1);

        let candidate = RawCandidate::from(parsed.candidates.into_iter().next().unwrap());
        assert_eq!(candidate.text, "WPCA1234");
        assert_eq!(candidate.vehicle_class.as_deref(), Some("car"));
    }

    #[test]
    fn test_parse_empty_response() {
        let parsed: DetectResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_empty());
    }

    #[test]
    fn test_confidence_clamped() {
        let body = CandidateBody {
            text: "WP1234".to_string(),
            confidence: 1.7,
            bbox: None,
            vehicle_class: None,
        };
        assert_eq!(RawCandidate::from(body).confidence, 1.0);
    }
}
