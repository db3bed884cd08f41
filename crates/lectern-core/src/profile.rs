//! Segment metadata tracking
//!
//! Remembers the target segment duration and total playlist duration from
//! the most recent playlist reload. Until one arrives, a conservative default
//! profile is reported.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Segment cadence of the stream being played
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentProfile {
    /// `#EXT-X-TARGETDURATION` of the live playlist, seconds
    pub target_duration: f64,
    /// Sum of segment durations currently retained by the playlist, seconds
    pub playlist_duration: f64,
}

impl SegmentProfile {
    /// Build a profile; the playlist is never shorter than one segment.
    pub fn new(target_duration: f64, playlist_duration: f64) -> Self {
        let playlist_duration = if playlist_duration.is_finite() {
            playlist_duration.max(target_duration)
        } else {
            target_duration
        };
        Self {
            target_duration,
            playlist_duration,
        }
    }

    /// Profile assumed when nothing has been observed
    pub fn conservative(target_duration: f64, playlist_segments: f64) -> Self {
        Self::new(target_duration, target_duration * playlist_segments)
    }
}

impl Default for SegmentProfile {
    fn default() -> Self {
        Self::conservative(2.0, 4.0)
    }
}

/// Latest observed [`SegmentProfile`]
#[derive(Debug, Clone)]
pub struct SegmentTracker {
    fallback: SegmentProfile,
    observed: Option<SegmentProfile>,
}

impl SegmentTracker {
    pub fn new(fallback: SegmentProfile) -> Self {
        Self {
            fallback,
            observed: None,
        }
    }

    /// Record a playlist reload. Returns true if the profile changed.
    pub fn observe(&mut self, target_duration: f64, playlist_duration: f64) -> bool {
        if !(target_duration.is_finite() && target_duration > 0.0) {
            debug!(target_duration, "Ignoring invalid target duration");
            return false;
        }

        let profile = SegmentProfile::new(target_duration, playlist_duration);
        let changed = self.observed != Some(profile);
        if changed {
            debug!(
                target_duration = profile.target_duration,
                playlist_duration = profile.playlist_duration,
                "Segment profile updated"
            );
        }
        self.observed = Some(profile);
        changed
    }

    pub fn profile(&self) -> SegmentProfile {
        self.observed.unwrap_or(self.fallback)
    }

    pub fn has_observation(&self) -> bool {
        self.observed.is_some()
    }
}

impl Default for SegmentTracker {
    fn default() -> Self {
        Self::new(SegmentProfile::default())
    }
}
