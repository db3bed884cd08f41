//! Buffer threshold calculation
//!
//! All three thresholds scale with the target segment duration, so a change
//! in segment cadence re-tunes the controller without a restart:
//!
//! - `start`: lead buffer required before (re)starting playback. Never more
//!   than the playlist retains beyond the live edge segment, never less than
//!   one and a half segments.
//! - `resume`: below this, playback is at risk and may be paused.
//! - `critical`: at or below this, playback is paused immediately.

use crate::profile::SegmentProfile;
use serde::{Deserialize, Serialize};

/// Lead buffer thresholds in seconds; `critical < resume < start`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferThresholds {
    pub start: f64,
    pub resume: f64,
    pub critical: f64,
}

impl BufferThresholds {
    /// Derive thresholds from a segment profile
    pub fn from_profile(profile: &SegmentProfile) -> Self {
        let target = profile.target_duration;
        let playlist = profile.playlist_duration;

        let start = (3.0 * target).min(playlist - target).max(1.5 * target);
        let resume = (1.5 * target).min(start - 0.5 * target).max(target);
        let critical = (0.75 * target).min(resume - 0.4 * target).max(0.5 * target);

        Self {
            start,
            resume,
            critical,
        }
    }

    /// Thresholds from an optional profile, falling back to the default one
    pub fn for_profile(profile: Option<&SegmentProfile>) -> Self {
        match profile {
            Some(profile) => Self::from_profile(profile),
            None => Self::from_profile(&SegmentProfile::default()),
        }
    }

    /// Lower bound on buffered-ahead for which a grace period may be granted
    pub fn grace_floor(&self, target_duration: f64) -> f64 {
        (0.35 * target_duration).max(0.9 * self.critical)
    }
}

impl Default for BufferThresholds {
    fn default() -> Self {
        Self::for_profile(None)
    }
}
