//! Progress throttling.
//!
//! Rate-limits progress emission so chat surfaces are not flooded with
//! edits. One throttle instance belongs to one session; phase separation
//! and per-session keying fall out of that ownership.

use std::time::{Duration, Instant};
use vidferry_core::{OrchestratorConfig, ProgressSnapshot};

/// Rate-limiter for progress updates.
///
/// Emits when the configured interval elapsed OR the percentage moved by
/// the configured step since the last emission, whichever happens first.
/// The first sample of a session and every phase transition always emit,
/// so the user sees each phase begin regardless of timing.
pub struct ProgressThrottle {
    min_interval: Duration,
    percent_step: f64,
    last_emit: Option<Instant>,
    last_snapshot: Option<ProgressSnapshot>,
}

impl ProgressThrottle {
    /// Create a new throttle with the given gates.
    #[must_use]
    pub const fn new(min_interval: Duration, percent_step: f64) -> Self {
        Self {
            min_interval,
            percent_step,
            last_emit: None,
            last_snapshot: None,
        }
    }

    /// Create a throttle from the orchestrator config.
    #[must_use]
    pub const fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.progress_interval, config.progress_step)
    }

    /// Check whether this sample should reach the user.
    ///
    /// A `true` return records the sample as the new comparison baseline.
    pub fn should_emit(&mut self, snapshot: ProgressSnapshot) -> bool {
        let now = Instant::now();
        if self.decide(snapshot, now) {
            self.last_emit = Some(now);
            self.last_snapshot = Some(snapshot);
            return true;
        }
        false
    }

    fn decide(&self, snapshot: ProgressSnapshot, now: Instant) -> bool {
        let Some(last) = self.last_snapshot else {
            return true;
        };
        if snapshot.phase != last.phase {
            return true;
        }
        if let Some(last_emit) = self.last_emit {
            if now.duration_since(last_emit) >= self.min_interval {
                return true;
            }
        }
        if let (Some(current), Some(previous)) = (snapshot.percent(), last.percent()) {
            return (current - previous).abs() >= self.percent_step;
        }
        false
    }

    /// Force the next check to return true.
    pub const fn reset(&mut self) {
        self.last_emit = None;
        self.last_snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidferry_core::TransferPhase;

    fn dl(done: u64, total: u64) -> ProgressSnapshot {
        ProgressSnapshot::new(TransferPhase::Download, done, total)
    }

    #[test]
    fn test_first_sample_always_emits() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60), 5.0);
        assert!(throttle.should_emit(dl(0, 1000)));
    }

    #[test]
    fn test_respects_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(50), 100.0);
        assert!(throttle.should_emit(dl(0, 1000)));
        assert!(!throttle.should_emit(dl(10, 1000))); // Too soon, 1% step

        std::thread::sleep(Duration::from_millis(60));
        assert!(throttle.should_emit(dl(20, 1000))); // Enough time passed
    }

    #[test]
    fn test_percent_step_beats_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60), 5.0);
        assert!(throttle.should_emit(dl(0, 1000)));
        assert!(!throttle.should_emit(dl(30, 1000))); // 3% moved
        assert!(throttle.should_emit(dl(60, 1000))); // 6% since last emit
        assert!(!throttle.should_emit(dl(80, 1000))); // 2% since last emit
    }

    #[test]
    fn test_phase_transition_always_emits() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60), 100.0);
        assert!(throttle.should_emit(dl(1000, 1000)));
        let upload = ProgressSnapshot::new(TransferPhase::Upload, 0, 1000);
        assert!(throttle.should_emit(upload));
        assert!(!throttle.should_emit(ProgressSnapshot::new(TransferPhase::Upload, 10, 1000)));
    }

    #[test]
    fn test_unknown_total_falls_back_to_time() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(50), 5.0);
        assert!(throttle.should_emit(dl(0, 0)));
        assert!(!throttle.should_emit(dl(500_000, 0))); // No percentage to compare

        std::thread::sleep(Duration::from_millis(60));
        assert!(throttle.should_emit(dl(900_000, 0)));
    }

    #[test]
    fn test_reset_allows_immediate_emit() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60), 100.0);
        assert!(throttle.should_emit(dl(0, 1000)));
        assert!(!throttle.should_emit(dl(10, 1000)));

        throttle.reset();
        assert!(throttle.should_emit(dl(10, 1000)));
    }
}
