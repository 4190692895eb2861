//! Detection Gate
//!
//! Confidence gate between the raw detector output and the rest of the
//! pipeline. Nothing downstream of the gate may ever see a sub-threshold
//! candidate; it is the sole protection keeping noise out of the
//! deduplication state.

use crate::detector_client::RawCandidate;

/// Confidence threshold policy, fixed at process configuration time
#[derive(Debug, Clone, Copy)]
pub struct DetectionGate {
    min_confidence: f32,
}

impl DetectionGate {
    /// Create a gate with the configured minimum confidence
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    /// Accept or reject a raw candidate
    pub fn accept(&self, candidate: &RawCandidate) -> bool {
        candidate.confidence >= self.min_confidence
    }

    /// Configured threshold
    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector_client::RawCandidate;

    fn candidate(confidence: f32) -> RawCandidate {
        RawCandidate {
            text: "WP CA-1234".to_string(),
            confidence,
            bbox: None,
            vehicle_class: None,
        }
    }

    #[test]
    fn test_accepts_at_threshold() {
        let gate = DetectionGate::new(0.6);
        assert!(gate.accept(&candidate(0.6)));
        assert!(gate.accept(&candidate(0.95)));
    }

    #[test]
    fn test_rejects_below_threshold() {
        let gate = DetectionGate::new(0.6);
        assert!(!gate.accept(&candidate(0.59)));
        assert!(!gate.accept(&candidate(0.0)));
    }

    #[test]
    fn test_monotonic_in_threshold() {
        // Accepted at t implies accepted at any t' <= t
        let c = candidate(0.7);
        for threshold in [0.7, 0.5, 0.3, 0.0] {
            assert!(DetectionGate::new(threshold).accept(&c));
        }
    }
}
