//! DedupWindow - Per-Camera Plate Deduplication
//!
//! ## Responsibilities
//!
//! - Classify each accepted plate sighting as New or Repeat
//! - Sliding cooldown window (a continuously visible plate never ages out
//!   mid-dwell)
//! - Opportunistic purge of stale entries
//!
//! Each camera's stream loop owns exactly one window; there is no
//! cross-camera sharing and no internal locking. The same plate may
//! legitimately be New at an entry and an exit camera at the same instant.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Classification of a plate sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Not seen within the cooldown window; surfaces a detection event
    New,
    /// Seen within the cooldown window; suppressed
    Repeat,
}

/// Recency table for one camera
pub struct DedupWindow {
    cooldown: Duration,
    /// Entries older than this are eligible for purge
    purge_horizon: Duration,
    last_seen: HashMap<String, Instant>,
}

impl DedupWindow {
    /// Create a window with the configured cooldown
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            purge_horizon: cooldown * 10,
            last_seen: HashMap::new(),
        }
    }

    /// Classify a sighting of `plate` at `now` and refresh its timestamp.
    ///
    /// Absent, or last seen longer than the cooldown ago: New. Within the
    /// cooldown: Repeat. Both outcomes slide `last_seen` forward.
    pub fn observe(&mut self, plate: &str, now: Instant) -> Observation {
        let observation = match self.last_seen.get(plate) {
            Some(&seen) if now.duration_since(seen) <= self.cooldown => Observation::Repeat,
            _ => Observation::New,
        };

        self.last_seen.insert(plate.to_string(), now);
        self.purge(now);

        observation
    }

    /// Drop entries older than the purge horizon.
    ///
    /// Correctness never depends on this running; classification compares
    /// against the cooldown at read time.
    pub fn purge(&mut self, now: Instant) {
        let horizon = self.purge_horizon;
        self.last_seen
            .retain(|_, &mut seen| now.duration_since(seen) <= horizon);
    }

    /// Forget all sightings
    pub fn clear(&mut self) {
        self.last_seen.clear();
    }

    /// Number of tracked plates
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Whether any plates are tracked
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(3);

    #[test]
    fn test_first_sighting_is_new() {
        let mut window = DedupWindow::new(COOLDOWN);
        assert_eq!(window.observe("WP CA-1234", Instant::now()), Observation::New);
    }

    #[test]
    fn test_within_cooldown_is_repeat() {
        let mut window = DedupWindow::new(COOLDOWN);
        let start = Instant::now();
        window.observe("WP CA-1234", start);
        assert_eq!(
            window.observe("WP CA-1234", start + Duration::from_secs(1)),
            Observation::Repeat
        );
    }

    #[test]
    fn test_after_cooldown_is_new_again() {
        let mut window = DedupWindow::new(COOLDOWN);
        let start = Instant::now();
        window.observe("WP CA-1234", start);
        assert_eq!(
            window.observe("WP CA-1234", start + Duration::from_secs(4)),
            Observation::New
        );
    }

    #[test]
    fn test_entry_exit_scenario() {
        // cooldown 3s: t=0 New, t=1 Repeat, t=4 New
        let mut window = DedupWindow::new(COOLDOWN);
        let t0 = Instant::now();
        assert_eq!(window.observe("WP CA-1234", t0), Observation::New);
        assert_eq!(
            window.observe("WP CA-1234", t0 + Duration::from_secs(1)),
            Observation::Repeat
        );
        assert_eq!(
            window.observe("WP CA-1234", t0 + Duration::from_secs(4)),
            Observation::New
        );
    }

    #[test]
    fn test_sliding_window_refreshes_on_repeat() {
        // A plate in view every second never ages out mid-dwell
        let mut window = DedupWindow::new(COOLDOWN);
        let t0 = Instant::now();
        window.observe("WP CA-1234", t0);
        for s in 1..=10 {
            assert_eq!(
                window.observe("WP CA-1234", t0 + Duration::from_secs(s)),
                Observation::Repeat,
                "sighting at t={s} should still be within the slid window"
            );
        }
    }

    #[test]
    fn test_windows_are_camera_isolated() {
        let mut entry = DedupWindow::new(COOLDOWN);
        let mut exit = DedupWindow::new(COOLDOWN);
        let now = Instant::now();
        assert_eq!(entry.observe("WP CA-1234", now), Observation::New);
        assert_eq!(exit.observe("WP CA-1234", now), Observation::New);
    }

    #[test]
    fn test_distinct_plates_independent() {
        let mut window = DedupWindow::new(COOLDOWN);
        let now = Instant::now();
        window.observe("WP CA-1234", now);
        assert_eq!(window.observe("WP 1234", now), Observation::New);
    }

    #[test]
    fn test_stale_entries_purged() {
        let mut window = DedupWindow::new(COOLDOWN);
        let t0 = Instant::now();
        window.observe("WP CA-1234", t0);
        // Next observation well past the purge horizon evicts the old entry
        window.observe("WP 1234", t0 + COOLDOWN * 20);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut window = DedupWindow::new(COOLDOWN);
        window.observe("WP CA-1234", Instant::now());
        window.clear();
        assert!(window.is_empty());
    }
}
