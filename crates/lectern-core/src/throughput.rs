//! Segment throughput estimation
//!
//! Throughput is expressed as a ratio of media time delivered to wall time
//! spent fetching it: a 2 s segment loaded in 1 s gives 2.0. Values below
//! 1.0 mean the network is falling behind real time.

use tracing::trace;

/// Lower clamp for a single sample
pub const MIN_RATIO: f64 = 0.1;
/// Upper clamp for a single sample
pub const MAX_RATIO: f64 = 5.0;

/// Last-sample throughput estimator.
///
/// Segment cadence is 1-4 s, so the latest sample is recent enough that no
/// averaging is needed; clamping keeps one outlier from dominating.
#[derive(Debug, Clone)]
pub struct ThroughputEstimator {
    healthy_ratio: f64,
    estimate: Option<f64>,
    samples: u64,
}

impl ThroughputEstimator {
    pub fn new(healthy_ratio: f64) -> Self {
        Self {
            healthy_ratio,
            estimate: None,
            samples: 0,
        }
    }

    /// Record one loaded segment. Samples with no measurable load time
    /// are ignored.
    pub fn record(&mut self, segment_duration_ms: f64, load_ms: f64) {
        if !(load_ms > 0.0 && segment_duration_ms.is_finite() && segment_duration_ms > 0.0) {
            return;
        }

        let ratio = (segment_duration_ms / load_ms).clamp(MIN_RATIO, MAX_RATIO);
        self.estimate = Some(ratio);
        self.samples += 1;

        trace!(segment_duration_ms, load_ms, ratio, "Throughput sample");
    }

    /// Current clamped estimate, if any segment has been measured
    pub fn ratio(&self) -> Option<f64> {
        self.estimate
    }

    /// True once a measured segment loaded at least `healthy_ratio` times
    /// faster than real time. Unmeasured throughput is not healthy.
    pub fn is_healthy(&self) -> bool {
        self.estimate.is_some_and(|ratio| ratio >= self.healthy_ratio)
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }
}

impl Default for ThroughputEstimator {
    fn default() -> Self {
        Self::new(0.9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_from_load_time() {
        let mut estimator = ThroughputEstimator::default();
        estimator.record(2000.0, 1000.0);

        assert_eq!(estimator.ratio(), Some(2.0));
        assert!(estimator.is_healthy());
    }

    #[test]
    fn test_ratio_clamped() {
        let mut estimator = ThroughputEstimator::default();

        estimator.record(2000.0, 1.0);
        assert_eq!(estimator.ratio(), Some(MAX_RATIO));

        estimator.record(2000.0, 100_000.0);
        assert_eq!(estimator.ratio(), Some(MIN_RATIO));
        assert!(!estimator.is_healthy());
    }

    #[test]
    fn test_healthy_boundary() {
        let mut estimator = ThroughputEstimator::default();

        estimator.record(900.0, 1000.0);
        assert!(estimator.is_healthy());

        estimator.record(890.0, 1000.0);
        assert!(!estimator.is_healthy());
    }

    #[test]
    fn test_zero_load_time_ignored() {
        let mut estimator = ThroughputEstimator::default();
        estimator.record(2000.0, 0.0);

        assert_eq!(estimator.ratio(), None);
        assert_eq!(estimator.sample_count(), 0);
        assert!(!estimator.is_healthy());
    }
}
