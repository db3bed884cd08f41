//! Core types for the live preview controller

use crate::{config::StreamEndpoints, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

// =============================================================================
// Stream Targets
// =============================================================================

/// Encoder-side identifier correlating an incoming stream with its segments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BroadcastKey(String);

impl BroadcastKey {
    /// Validate and wrap a broadcast key.
    ///
    /// Keys end up as a path segment of the manifest URL, so only ASCII
    /// alphanumerics, `-`, `_` and `.` are accepted.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if valid {
            Ok(Self(key))
        } else {
            Err(Error::InvalidKey(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BroadcastKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BroadcastKey> for String {
    fn from(key: BroadcastKey) -> Self {
        key.0
    }
}

impl fmt::Display for BroadcastKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A playback source: broadcast key plus its derived manifest URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTarget {
    pub key: BroadcastKey,
    pub manifest_url: Url,
}

impl StreamTarget {
    /// Derive the manifest URL for `key` under the configured HLS base URL
    pub fn derive(endpoints: &StreamEndpoints, key: BroadcastKey) -> Result<Self> {
        let mut base = endpoints.hls_base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let manifest_url = base.join(&format!("{}.{}", key, endpoints.playlist_extension))?;

        Ok(Self { key, manifest_url })
    }

    /// Same endpoints, different key
    pub fn with_key(&self, endpoints: &StreamEndpoints, key: BroadcastKey) -> Result<Self> {
        Self::derive(endpoints, key)
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key, self.manifest_url)
    }
}

/// Identity of one controller instance.
///
/// Every attachment gets a fresh id; callbacks tagged with an old id are
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(Uuid);

impl ControllerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ControllerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Playback State
// =============================================================================

/// Playback state, owned exclusively by the playback controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No source attached
    Idle,
    /// Building lead buffer before (re)starting playback
    Buffering,
    /// Autoplay was refused; only a user-initiated play leaves this state
    AwaitingGesture,
    /// Media is playing
    Playing,
    /// Paused by the controller to rebuild the lead buffer
    PausedForRebuffer,
    /// Waiting on a scheduled reload or in-engine recovery
    Recovering,
    /// Terminal for this controller; a manual retry is required
    Failed,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        match (*self, target) {
            // Teardown is always allowed
            (_, Idle) => true,
            (Failed, _) => false,
            (_, Failed) => true,
            (Idle, Recovering) => false,
            (_, Recovering) => true,
            _ => matches!(
                (*self, target),
                (Idle, Buffering)
                    | (Buffering, Playing)
                    | (Buffering, AwaitingGesture)
                    | (AwaitingGesture, Playing)
                    | (Playing, PausedForRebuffer)
                    | (Playing, AwaitingGesture)
                    | (PausedForRebuffer, Buffering)
                    | (Recovering, Buffering)
                    | (Recovering, Playing)
            ),
        }
    }

    /// States the UI shows as a waiting indicator
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            PlaybackState::Buffering | PlaybackState::PausedForRebuffer | PlaybackState::Recovering
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::AwaitingGesture => write!(f, "awaiting_gesture"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::PausedForRebuffer => write!(f, "paused_for_rebuffer"),
            PlaybackState::Recovering => write!(f, "recovering"),
            PlaybackState::Failed => write!(f, "failed"),
        }
    }
}

/// Why a controller ended up in [`PlaybackState::Failed`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The manifest never became available within the poll budget
    StreamNotStarted,
    /// Playback broke and recovery was exhausted or impossible
    PlaybackFailed { detail: String },
}

impl FailureReason {
    pub fn playback(detail: impl Into<String>) -> Self {
        FailureReason::PlaybackFailed {
            detail: detail.into(),
        }
    }

    /// Human readable message for the viewer
    pub fn message(&self) -> String {
        match self {
            FailureReason::StreamNotStarted => "The stream has not started yet. Check that the \
                 encoder is running and that it is using the stream key shown for this session."
                .to_string(),
            FailureReason::PlaybackFailed { detail } => {
                format!("Playback failed ({detail}). Retry to reconnect to the stream.")
            }
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::StreamNotStarted => write!(f, "stream not started"),
            FailureReason::PlaybackFailed { detail } => write!(f, "playback failed: {detail}"),
        }
    }
}

// =============================================================================
// Observed Status
// =============================================================================

/// Progress of the stream readiness poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollProgress {
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Snapshot published to whatever renders the player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    /// Target currently being watched
    pub target: StreamTarget,
    /// Current controller state (Idle while no controller is attached)
    pub state: PlaybackState,
    /// Set while waiting for the stream to become available
    pub polling: Option<PollProgress>,
    /// Set when state is Failed
    pub failure: Option<FailureReason>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl PlayerStatus {
    pub fn new(target: StreamTarget) -> Self {
        Self {
            target,
            state: PlaybackState::Idle,
            polling: None,
            failure: None,
            updated_at: Utc::now(),
        }
    }

    /// Message to show in place of the video, if any
    pub fn overlay_message(&self) -> Option<String> {
        if let Some(reason) = &self.failure {
            return Some(reason.message());
        }
        if let Some(progress) = self.polling {
            return Some(format!(
                "Waiting for the stream to start (check {} of {})",
                progress.attempt, progress.max_attempts
            ));
        }
        match self.state {
            PlaybackState::Buffering | PlaybackState::PausedForRebuffer => {
                Some("Connecting...".to_string())
            }
            PlaybackState::Recovering => Some("Reconnecting...".to_string()),
            PlaybackState::AwaitingGesture => Some("Click play to start the preview".to_string()),
            _ => None,
        }
    }
}
