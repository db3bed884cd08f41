//! Engine error classification and bounded-retry recovery policy
//!
//! | Class               | Errors                                          | Action                              |
//! |---------------------|-------------------------------------------------|-------------------------------------|
//! | Ignorable           | any non-fatal error                             | none, the engine self-heals         |
//! | NotReady            | fatal playlist load error with HTTP 4xx/5xx     | poll for the stream                 |
//! | RecoverableNetwork  | fatal playlist load timeout / failure           | reload after 3 s x attempt, then poll |
//! | RecoverableNetwork  | other fatal network errors                      | resume loading after 2 s x attempt, then fail |
//! | RecoverableMedia    | fatal media errors                              | in-engine recovery, then reload     |
//! | Terminal            | fatal errors of any other category              | fail                                |
//!
//! Counters reset whenever the engine reports a parsed manifest or a loaded
//! playlist.

use crate::{
    config::ControllerConfig,
    events::{EngineError, ErrorCategory},
    types::FailureReason,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Taxonomy of engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    Ignorable,
    NotReady,
    RecoverableNetwork,
    RecoverableMedia,
    Terminal,
}

/// Classify an engine error
pub fn classify(error: &EngineError) -> ErrorClass {
    if !error.fatal {
        return ErrorClass::Ignorable;
    }

    match error.category {
        ErrorCategory::Network
            if error.detail.is_playlist_load()
                && !error.detail.is_timeout()
                && error.has_error_status() =>
        {
            ErrorClass::NotReady
        }
        ErrorCategory::Network => ErrorClass::RecoverableNetwork,
        ErrorCategory::Media => ErrorClass::RecoverableMedia,
        ErrorCategory::Other => ErrorClass::Terminal,
    }
}

/// What the controller should do about an error
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Nothing; the engine handles it
    Ignore,
    /// Reload the source after `delay`
    ReloadSource { delay: Duration, attempt: u32 },
    /// Restart segment loading after `delay`
    ResumeLoading { delay: Duration, attempt: u32 },
    /// Ask the engine to recover its media pipeline in place
    RecoverMedia { attempt: u32 },
    /// The stream is not available; hand over to the readiness poller and
    /// report the reason if it never comes up
    AwaitStream(FailureReason),
    /// Give up on this controller
    Fail(FailureReason),
}

/// Per-category retry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCounters {
    pub network: u32,
    pub media: u32,
    /// Informational only; readiness polling has its own budget
    pub not_ready: u32,
}

/// Bounded retry policy
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    network_limit: u32,
    media_limit: u32,
    manifest_backoff: Duration,
    network_backoff: Duration,
    counters: RetryCounters,
}

impl RecoveryPolicy {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            network_limit: config.network_retry_limit,
            media_limit: config.media_recovery_attempts,
            manifest_backoff: Duration::from_millis(config.manifest_retry_backoff_ms),
            network_backoff: Duration::from_millis(config.network_retry_backoff_ms),
            counters: RetryCounters::default(),
        }
    }

    /// Decide how to handle `error`, updating counters
    pub fn decide(&mut self, error: &EngineError) -> RecoveryAction {
        let class = classify(error);
        debug!(%error, ?class, "Classified engine error");

        match class {
            ErrorClass::Ignorable => RecoveryAction::Ignore,
            ErrorClass::NotReady => {
                self.counters.not_ready += 1;
                RecoveryAction::AwaitStream(FailureReason::StreamNotStarted)
            }
            ErrorClass::RecoverableNetwork => {
                self.counters.network += 1;
                let attempt = self.counters.network;
                let playlist = error.detail.is_playlist_load();

                if attempt < self.network_limit {
                    if playlist {
                        RecoveryAction::ReloadSource {
                            delay: self.manifest_backoff * attempt,
                            attempt,
                        }
                    } else {
                        RecoveryAction::ResumeLoading {
                            delay: self.network_backoff * attempt,
                            attempt,
                        }
                    }
                } else if playlist {
                    warn!(attempt, detail = %error.detail, "Playlist retries exhausted, polling for stream");
                    RecoveryAction::AwaitStream(FailureReason::playback(format!(
                        "playlist requests kept failing ({}) after {attempt} attempts",
                        error.detail
                    )))
                } else {
                    warn!(attempt, detail = %error.detail, "Network retries exhausted");
                    RecoveryAction::Fail(FailureReason::playback(format!(
                        "network error ({}) persisted after {attempt} attempts",
                        error.detail
                    )))
                }
            }
            ErrorClass::RecoverableMedia => {
                if self.counters.media < self.media_limit {
                    self.counters.media += 1;
                    RecoveryAction::RecoverMedia {
                        attempt: self.counters.media,
                    }
                } else {
                    self.reload_under_network_budget(&error.detail.to_string())
                }
            }
            ErrorClass::Terminal => {
                warn!(%error, "Unrecoverable engine error");
                RecoveryAction::Fail(FailureReason::playback(format!(
                    "unrecoverable engine error ({})",
                    error.detail
                )))
            }
        }
    }

    /// In-engine media recovery threw; fall back to a full reload
    pub fn media_recovery_failed(&mut self, cause: &str) -> RecoveryAction {
        self.reload_under_network_budget(cause)
    }

    fn reload_under_network_budget(&mut self, cause: &str) -> RecoveryAction {
        self.counters.network += 1;
        let attempt = self.counters.network;

        if attempt < self.network_limit {
            RecoveryAction::ReloadSource {
                delay: self.manifest_backoff * attempt,
                attempt,
            }
        } else {
            warn!(attempt, cause, "Media recovery exhausted");
            RecoveryAction::Fail(FailureReason::playback(format!(
                "media error ({cause}) could not be recovered"
            )))
        }
    }

    /// The pipeline proved healthy again
    pub fn record_success(&mut self) {
        if self.counters != RetryCounters::default() {
            debug!(counters = ?self.counters, "Resetting retry counters");
        }
        self.counters = RetryCounters::default();
    }

    pub fn counters(&self) -> RetryCounters {
        self.counters
    }
}
