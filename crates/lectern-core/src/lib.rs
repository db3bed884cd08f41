//! Lectern Core - Live Preview Playback Controller
//!
//! This crate keeps live preview playback smooth over a low-latency HLS
//! stream whose segments may not exist yet:
//! - Segment cadence tracking and buffer threshold derivation
//! - Throughput-aware rebuffer decisions
//! - Buffer-driven play/pause state machine
//! - Engine error classification with bounded retries
//! - Stream readiness polling with broadcast key resynchronisation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Lectern Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │   Segment    │  │  Throughput  │  │   Recovery   │          │
//! │  │   Tracker    │  │  Estimator   │  │    Policy    │          │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘          │
//! │         │                 │                 │                   │
//! │  ┌──────┴───────┐         │                 │                   │
//! │  │  Thresholds  │         │                 │                   │
//! │  └──────┬───────┘         │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │                              │
//! │                    │ Controller  │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐           │
//! │  │  Readiness   │──│    Live     │  │    Ingest    │           │
//! │  │   Poller     │  │   Session   │  │    Status    │           │
//! │  └──────────────┘  └─────────────┘  └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The controller and everything below it are runtime-agnostic. The
//! `runtime` feature adds the tokio session driver and the HTTP probe.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod profile;
pub mod recovery;
pub mod status;
pub mod thresholds;
pub mod throughput;
pub mod types;

#[cfg(feature = "runtime")]
pub mod readiness;
#[cfg(feature = "runtime")]
pub mod session;

pub use config::{ControllerConfig, PollConfig, StreamEndpoints};
pub use controller::{MediaElement, PlaybackController, SegmentEngine, Step};
pub use error::{Error, Result};
pub use events::{EngineError, EngineEvent, ErrorCategory, ErrorDetail, MediaEvent, PlayRejection};
pub use profile::{SegmentProfile, SegmentTracker};
pub use recovery::{classify, ErrorClass, RecoveryAction, RecoveryPolicy, RetryCounters};
pub use thresholds::BufferThresholds;
pub use throughput::ThroughputEstimator;
pub use types::*;

#[cfg(feature = "runtime")]
pub use readiness::{HttpProbe, PollOutcome, ReadinessPoller, StreamProbe};
#[cfg(feature = "runtime")]
pub use session::{EngineFactory, EventSink, LiveSession, SessionHandle, TaskHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library initialisation
pub fn init() {
    tracing::info!(version = VERSION, "Lectern Core initialized");
}
