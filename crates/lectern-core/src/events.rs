//! Typed event contract between the playback controller and its collaborators
//!
//! The segment engine's event vocabulary is normalised into [`EngineEvent`]
//! and the media element's callbacks into [`MediaEvent`] at the boundary, so
//! recovery policy never matches on a library's free-form strings.
//!
//! ## hls.js boundary
//!
//! ```javascript
//! hls.on(Hls.Events.LEVEL_LOADED, (_, data) =>
//!   player.onLevelLoaded(data.details.targetduration, data.details.totalduration));
//! hls.on(Hls.Events.ERROR, (_, data) => player.onError(data));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Events produced by the segment-fetching engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Manifest request issued
    ManifestLoading,
    /// Manifest parsed; the pipeline is healthy
    ManifestReady,
    /// Live playlist reloaded with the given cadence (seconds)
    SegmentProfileUpdated {
        target_duration: f64,
        playlist_duration: f64,
    },
    /// Segment request issued
    SegmentLoading,
    /// Segment fetched
    SegmentLoaded { load_ms: f64, duration_ms: f64 },
    /// Segment appended to the media buffer
    BufferAppended,
    /// Error reported by the engine
    Error(EngineError),
}

/// Callbacks from the media playback primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// A play attempt succeeded
    PlayStarted,
    /// A play attempt was refused
    PlayRejected(PlayRejection),
    /// Media paused
    Paused,
    /// Media ran out of data
    Waiting,
    /// Media element error (decode, unsupported source)
    Error(String),
}

/// Why a play attempt was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayRejection {
    /// The host refused autoplay without a user gesture
    Autoplay,
    /// Interrupted by a load or pause; safe to try again
    Interrupted,
}

/// Broad error category reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Network,
    Media,
    Other,
}

/// Closed set of error details the recovery policy distinguishes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorDetail {
    ManifestLoadError,
    ManifestLoadTimeout,
    ManifestParsing,
    LevelLoadError,
    LevelLoadTimeout,
    FragmentLoadError,
    FragmentLoadTimeout,
    FragmentParsing,
    BufferAppend,
    BufferStalled,
    BufferSeekOverHole,
    BufferNudgeOnStall,
    BufferFull,
    Decode,
    Other(String),
}

impl ErrorDetail {
    /// Map an hls.js `ErrorDetails` value
    pub fn from_hls_js(details: &str) -> Self {
        match details {
            "manifestLoadError" => ErrorDetail::ManifestLoadError,
            "manifestLoadTimeOut" => ErrorDetail::ManifestLoadTimeout,
            "manifestParsingError" => ErrorDetail::ManifestParsing,
            "levelLoadError" => ErrorDetail::LevelLoadError,
            "levelLoadTimeOut" => ErrorDetail::LevelLoadTimeout,
            "fragLoadError" => ErrorDetail::FragmentLoadError,
            "fragLoadTimeOut" => ErrorDetail::FragmentLoadTimeout,
            "fragParsingError" => ErrorDetail::FragmentParsing,
            "bufferAppendError" | "bufferAppendingError" => ErrorDetail::BufferAppend,
            "bufferStalledError" => ErrorDetail::BufferStalled,
            "bufferSeekOverHole" => ErrorDetail::BufferSeekOverHole,
            "bufferNudgeOnStall" => ErrorDetail::BufferNudgeOnStall,
            "bufferFullError" => ErrorDetail::BufferFull,
            other => ErrorDetail::Other(other.to_string()),
        }
    }

    /// Manifest or level playlist failed to load
    pub fn is_playlist_load(&self) -> bool {
        matches!(
            self,
            ErrorDetail::ManifestLoadError
                | ErrorDetail::ManifestLoadTimeout
                | ErrorDetail::LevelLoadError
                | ErrorDetail::LevelLoadTimeout
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ErrorDetail::ManifestLoadTimeout
                | ErrorDetail::LevelLoadTimeout
                | ErrorDetail::FragmentLoadTimeout
        )
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorDetail::ManifestLoadError => "manifest-load-error",
            ErrorDetail::ManifestLoadTimeout => "manifest-load-timeout",
            ErrorDetail::ManifestParsing => "manifest-parsing",
            ErrorDetail::LevelLoadError => "level-load-error",
            ErrorDetail::LevelLoadTimeout => "level-load-timeout",
            ErrorDetail::FragmentLoadError => "fragment-load-error",
            ErrorDetail::FragmentLoadTimeout => "fragment-load-timeout",
            ErrorDetail::FragmentParsing => "fragment-parsing",
            ErrorDetail::BufferAppend => "buffer-append",
            ErrorDetail::BufferStalled => "buffer-stalled",
            ErrorDetail::BufferSeekOverHole => "buffer-seek-over-hole",
            ErrorDetail::BufferNudgeOnStall => "buffer-nudge-on-stall",
            ErrorDetail::BufferFull => "buffer-full",
            ErrorDetail::Decode => "decode-error",
            ErrorDetail::Other(other) => other,
        };
        f.write_str(name)
    }
}

/// Error event from the segment engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub fatal: bool,
    pub category: ErrorCategory,
    pub detail: ErrorDetail,
    /// HTTP status of the failed request, when there was a response
    pub http_status: Option<u16>,
}

impl EngineError {
    pub fn new(fatal: bool, category: ErrorCategory, detail: ErrorDetail) -> Self {
        Self {
            fatal,
            category,
            detail,
            http_status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Response status was a client or server error
    pub fn has_error_status(&self) -> bool {
        self.http_status.is_some_and(|status| (400..600).contains(&status))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.fatal { "fatal" } else { "non-fatal" };
        write!(f, "{severity} {:?} error: {}", self.category, self.detail)?;
        if let Some(status) = self.http_status {
            write!(f, " (HTTP {status})")?;
        }
        Ok(())
    }
}

// =============================================================================
// hls.js payloads
// =============================================================================

/// `Hls.Events.ERROR` data object
#[derive(Debug, Clone, Deserialize)]
pub struct HlsErrorData {
    #[serde(rename = "type")]
    pub kind: String,
    pub details: String,
    #[serde(default)]
    pub fatal: bool,
    #[serde(default)]
    pub response: Option<HlsResponse>,
}

/// Loader response attached to network errors
#[derive(Debug, Clone, Deserialize)]
pub struct HlsResponse {
    #[serde(default)]
    pub code: Option<i64>,
}

impl From<HlsErrorData> for EngineError {
    fn from(data: HlsErrorData) -> Self {
        let category = match data.kind.as_str() {
            "networkError" => ErrorCategory::Network,
            "mediaError" => ErrorCategory::Media,
            _ => ErrorCategory::Other,
        };
        let http_status = data
            .response
            .and_then(|response| response.code)
            .and_then(|code| u16::try_from(code).ok())
            .filter(|code| (100..600).contains(code));

        EngineError {
            fatal: data.fatal,
            category,
            detail: ErrorDetail::from_hls_js(&data.details),
            http_status,
        }
    }
}

/// `Hls.Events.FRAG_LOADED` data object (fragment duration and load timings)
#[derive(Debug, Clone, Deserialize)]
pub struct HlsFragLoaded {
    pub frag: HlsFragment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HlsFragment {
    /// Seconds
    pub duration: f64,
    pub stats: HlsLoadStats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HlsLoadStats {
    pub loading: HlsLoadTiming,
}

/// `performance.now()` timestamps in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct HlsLoadTiming {
    pub start: f64,
    pub end: f64,
}

impl From<HlsFragLoaded> for EngineEvent {
    fn from(data: HlsFragLoaded) -> Self {
        EngineEvent::SegmentLoaded {
            load_ms: data.frag.stats.loading.end - data.frag.stats.loading.start,
            duration_ms: data.frag.duration * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hls_error_normalisation() {
        let data: HlsErrorData = serde_json::from_str(
            r#"{"type": "networkError", "details": "manifestLoadError", "fatal": true,
                "response": {"code": 404, "text": "Not Found"}}"#,
        )
        .unwrap();
        let error = EngineError::from(data);

        assert!(error.fatal);
        assert_eq!(error.category, ErrorCategory::Network);
        assert_eq!(error.detail, ErrorDetail::ManifestLoadError);
        assert_eq!(error.http_status, Some(404));
        assert!(error.has_error_status());
    }

    #[test]
    fn test_network_failure_has_no_status() {
        let data: HlsErrorData = serde_json::from_str(
            r#"{"type": "networkError", "details": "fragLoadTimeOut", "response": {"code": 0}}"#,
        )
        .unwrap();
        let error = EngineError::from(data);

        assert!(!error.fatal);
        assert_eq!(error.detail, ErrorDetail::FragmentLoadTimeout);
        assert_eq!(error.http_status, None);
    }

    #[test]
    fn test_unknown_details_preserved() {
        let detail = ErrorDetail::from_hls_js("keySystemNoKeys");
        assert_eq!(detail, ErrorDetail::Other("keySystemNoKeys".into()));
        assert_eq!(detail.to_string(), "keySystemNoKeys");
    }

    #[test]
    fn test_frag_loaded_timings() {
        let data: HlsFragLoaded = serde_json::from_str(
            r#"{"frag": {"duration": 2.0, "sn": 41,
                "stats": {"loading": {"start": 1000.0, "first": 1100.0, "end": 1500.0}}}}"#,
        )
        .unwrap();

        assert_eq!(
            EngineEvent::from(data),
            EngineEvent::SegmentLoaded {
                load_ms: 500.0,
                duration_ms: 2000.0
            }
        );
    }
}
