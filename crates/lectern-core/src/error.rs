//! Error types for Lectern Core

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
///
/// Playback failures never surface through this type; they resolve into
/// [`PlaybackState::Failed`](crate::PlaybackState::Failed) plus a
/// [`FailureReason`](crate::FailureReason). These errors cover construction,
/// configuration and probe failures.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    // Target errors
    #[error("Invalid broadcast key: {0:?}")]
    InvalidKey(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Status document errors
    #[error("Failed to parse ingest status document: {0}")]
    StatusParse(String),

    #[error("Ingest status endpoint not configured")]
    StatusUnavailable,

    // Engine errors
    #[error("Segment engine failed to load source: {0}")]
    EngineLoad(String),

    #[error("Media error recovery failed: {0}")]
    MediaRecovery(String),

    // Session errors
    #[error("Session is closed")]
    SessionClosed,

    // Network errors
    #[cfg(feature = "runtime")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },
}

impl Error {
    /// Returns true if retrying the failed operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            #[cfg(feature = "runtime")]
            Error::Network(_) => true,
            Error::HttpStatus { status, .. } => *status >= 500,
            Error::EngineLoad(_) | Error::MediaRecovery(_) => true,
            _ => false,
        }
    }

    /// Returns the error code for telemetry
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::ConfigParse(_) => "CONFIG_PARSE",
            Error::InvalidKey(_) => "INVALID_KEY",
            Error::Url(_) => "INVALID_URL",
            Error::StatusParse(_) => "STATUS_PARSE",
            Error::StatusUnavailable => "STATUS_UNAVAILABLE",
            Error::EngineLoad(_) => "ENGINE_LOAD",
            Error::MediaRecovery(_) => "MEDIA_RECOVERY",
            Error::SessionClosed => "SESSION_CLOSED",
            #[cfg(feature = "runtime")]
            Error::Network(_) => "NETWORK",
            Error::HttpStatus { .. } => "HTTP_STATUS",
        }
    }
}
