//! Playback controller - buffer-driven play/pause state machine
//!
//! Coordinates:
//! - Segment profile tracking and threshold derivation
//! - Throughput-based grace before rebuffering
//! - Engine error recovery with tick-counted backoff
//! - Play attempt serialisation and autoplay rejection
//!
//! The controller is the only component that calls `play`/`pause` on the
//! media element. It never blocks and owns no timers: the runtime driving it
//! calls [`PlaybackController::tick`] every sample interval and forwards
//! engine and media callbacks. Delays are counted in ticks.
//!
//! ```text
//!   Idle ──attach──▶ Buffering ──ahead ≥ start, play ok──▶ Playing
//!                      ▲   │                                │
//!          pause acked │   └─autoplay refused─▶ AwaitingGesture
//!                      │                                    │
//!               PausedForRebuffer ◀──ahead ≤ critical───────┘
//!                                    (or < resume, no grace)
//! ```

use crate::{
    config::ControllerConfig,
    events::{EngineError, EngineEvent, ErrorCategory, ErrorDetail, MediaEvent, PlayRejection},
    profile::{SegmentProfile, SegmentTracker},
    recovery::{RecoveryAction, RecoveryPolicy, RetryCounters},
    thresholds::BufferThresholds,
    throughput::ThroughputEstimator,
    types::{ControllerId, FailureReason, PlaybackState, StreamTarget},
    Result,
};
use tracing::{debug, info, trace, warn};
use url::Url;

/// Tolerance when locating the playhead inside a buffered range (seconds)
const RANGE_TOLERANCE: f64 = 0.1;

/// Media playback primitive (e.g. a `<video>` element)
pub trait MediaElement {
    /// Buffered time ranges as `(start, end)` seconds
    fn buffered_ranges(&self) -> Vec<(f64, f64)>;

    /// Playhead position in seconds
    fn current_time(&self) -> f64;

    fn paused(&self) -> bool;

    /// Request playback. The outcome arrives later as
    /// [`MediaEvent::PlayStarted`] or [`MediaEvent::PlayRejected`].
    fn play(&mut self);

    fn pause(&mut self);
}

/// Segment fetching and demuxing engine (e.g. hls.js)
pub trait SegmentEngine {
    /// Media element type this engine feeds
    type Media: MediaElement;

    fn load_source(&mut self, url: &Url) -> Result<()>;

    fn attach_media(&mut self, media: &Self::Media) -> Result<()>;

    fn start_load(&mut self);

    /// Attempt in-place recovery of the media pipeline
    fn recover_media_error(&mut self) -> Result<()>;

    /// Release the engine and detach it from the media element
    fn destroy(&mut self);
}

/// What the owner of the controller has to do next
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Nothing; keep driving the controller
    Continue,
    /// The stream is unavailable; tear down and poll for readiness. The
    /// reason is what to report if polling runs out.
    AwaitStream(FailureReason),
    /// The controller failed and released its engine
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Reload,
    ResumeLoading,
}

#[derive(Debug, Clone, Copy)]
struct PendingAction {
    kind: PendingKind,
    remaining_ticks: u32,
}

/// Playback controller for a single [`StreamTarget`].
///
/// A new target always gets a new controller; nothing is carried over.
pub struct PlaybackController<E: SegmentEngine> {
    id: ControllerId,
    target: StreamTarget,
    config: ControllerConfig,
    engine: Option<E>,
    media: E::Media,
    state: PlaybackState,
    tracker: SegmentTracker,
    throughput: ThroughputEstimator,
    policy: RecoveryPolicy,
    /// A play() call is outstanding
    play_in_flight: bool,
    /// The next pause callback is ours
    pause_requested: bool,
    /// Consecutive ticks spent below `resume` without pausing
    grace_ticks: u32,
    pending: Option<PendingAction>,
    failure: Option<FailureReason>,
    torn_down: bool,
}

impl<E: SegmentEngine> PlaybackController<E> {
    /// Attach `engine` to `media` and start loading `target`
    pub fn attach(
        id: ControllerId,
        target: StreamTarget,
        mut engine: E,
        media: E::Media,
        config: ControllerConfig,
    ) -> Result<Self> {
        config.validate()?;

        engine.attach_media(&media)?;
        if let Err(err) = engine.load_source(&target.manifest_url) {
            engine.destroy();
            return Err(err);
        }

        let fallback =
            SegmentProfile::conservative(config.default_target_duration, config.default_playlist_segments);

        let mut controller = Self {
            id,
            target,
            throughput: ThroughputEstimator::new(config.healthy_throughput_ratio),
            policy: RecoveryPolicy::new(&config),
            tracker: SegmentTracker::new(fallback),
            config,
            engine: Some(engine),
            media,
            state: PlaybackState::Idle,
            play_in_flight: false,
            pause_requested: false,
            grace_ticks: 0,
            pending: None,
            failure: None,
            torn_down: false,
        };

        info!(
            controller = %controller.id,
            target = %controller.target,
            "Controller attached"
        );
        controller.set_state(PlaybackState::Buffering);

        Ok(controller)
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    pub fn profile(&self) -> SegmentProfile {
        self.tracker.profile()
    }

    /// Thresholds for the current segment profile
    pub fn thresholds(&self) -> BufferThresholds {
        BufferThresholds::from_profile(&self.tracker.profile())
    }

    pub fn throughput_ratio(&self) -> Option<f64> {
        self.throughput.ratio()
    }

    pub fn retry_counters(&self) -> RetryCounters {
        self.policy.counters()
    }

    pub fn play_in_flight(&self) -> bool {
        self.play_in_flight
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn media(&self) -> &E::Media {
        &self.media
    }

    /// Seconds of media buffered ahead of the playhead.
    ///
    /// Before playback starts the playhead may sit before the first buffered
    /// range (the engine seeks to it on first play); that range counts.
    pub fn buffered_ahead(&self) -> f64 {
        let time = self.media.current_time();
        let ranges = self.media.buffered_ranges();

        if let Some((_, end)) = ranges
            .iter()
            .find(|(start, end)| *start - RANGE_TOLERANCE <= time && time <= *end)
        {
            return (end - time).max(0.0);
        }

        if self.media.paused() {
            if let Some((start, end)) = ranges.first() {
                if time < *start {
                    return end - start;
                }
            }
        }

        0.0
    }

    // =========================================================================
    // Sampler
    // =========================================================================

    /// Periodic buffer sample
    pub fn tick(&mut self) -> Step {
        if !self.is_live() {
            return Step::Continue;
        }

        if let Some(step) = self.run_pending() {
            return step;
        }

        let ahead = self.buffered_ahead();
        let thresholds = self.thresholds();
        trace!(controller = %self.id, state = %self.state, ahead, "Buffer sample");

        match self.state {
            PlaybackState::Buffering => {
                if ahead >= thresholds.start && self.media.paused() && !self.play_in_flight {
                    debug!(controller = %self.id, ahead, start = thresholds.start, "Lead buffer ready");
                    self.request_play();
                }
            }
            PlaybackState::Playing => self.check_rebuffer(ahead, &thresholds),
            PlaybackState::PausedForRebuffer => {
                // Some hosts do not report a pause that was already in effect
                if self.media.paused() {
                    self.pause_requested = false;
                    self.set_state(PlaybackState::Buffering);
                }
            }
            _ => {}
        }

        Step::Continue
    }

    fn check_rebuffer(&mut self, ahead: f64, thresholds: &BufferThresholds) {
        if ahead <= thresholds.critical {
            self.pause_for_rebuffer(ahead, "critical");
            return;
        }

        if ahead < thresholds.resume {
            let target = self.tracker.profile().target_duration;
            let graceful = self.throughput.is_healthy() && ahead > thresholds.grace_floor(target);

            if graceful && self.grace_ticks < self.config.max_grace_ticks {
                self.grace_ticks += 1;
                debug!(
                    controller = %self.id,
                    ahead,
                    grace_tick = self.grace_ticks,
                    ratio = ?self.throughput.ratio(),
                    "Low buffer, throughput healthy, holding playback"
                );
            } else {
                self.pause_for_rebuffer(ahead, "low");
            }
            return;
        }

        self.grace_ticks = 0;
    }

    fn run_pending(&mut self) -> Option<Step> {
        let pending = self.pending.as_mut()?;
        pending.remaining_ticks = pending.remaining_ticks.saturating_sub(1);
        if pending.remaining_ticks > 0 {
            return None;
        }

        let kind = pending.kind;
        self.pending = None;
        let engine = self.engine.as_mut()?;

        match kind {
            PendingKind::Reload => {
                info!(controller = %self.id, url = %self.target.manifest_url, "Reloading source");
                if let Err(err) = engine.load_source(&self.target.manifest_url) {
                    return Some(self.fail(FailureReason::playback(format!("reload failed: {err}"))));
                }
            }
            PendingKind::ResumeLoading => {
                info!(controller = %self.id, "Resuming segment loading");
                engine.start_load();
            }
        }
        None
    }

    // =========================================================================
    // Engine events
    // =========================================================================

    pub fn handle_engine_event(&mut self, event: EngineEvent) -> Step {
        if !self.is_live() {
            trace!(controller = %self.id, ?event, "Dropping engine event");
            return Step::Continue;
        }

        match event {
            EngineEvent::ManifestLoading => {
                debug!(controller = %self.id, "Manifest loading");
            }
            EngineEvent::ManifestReady => {
                debug!(controller = %self.id, "Manifest parsed");
                self.policy.record_success();
                self.recovered();
            }
            EngineEvent::SegmentProfileUpdated {
                target_duration,
                playlist_duration,
            } => {
                if self.tracker.observe(target_duration, playlist_duration) {
                    let thresholds = self.thresholds();
                    info!(
                        controller = %self.id,
                        target_duration,
                        playlist_duration,
                        start = thresholds.start,
                        resume = thresholds.resume,
                        critical = thresholds.critical,
                        "Buffer thresholds retuned"
                    );
                }
                self.policy.record_success();
                self.recovered();
            }
            EngineEvent::SegmentLoading | EngineEvent::BufferAppended => {}
            EngineEvent::SegmentLoaded {
                load_ms,
                duration_ms,
            } => {
                self.throughput.record(duration_ms, load_ms);
            }
            EngineEvent::Error(error) => return self.handle_error(&error),
        }

        Step::Continue
    }

    fn handle_error(&mut self, error: &EngineError) -> Step {
        let action = self.policy.decide(error);
        self.apply(action)
    }

    fn apply(&mut self, action: RecoveryAction) -> Step {
        match action {
            RecoveryAction::Ignore => Step::Continue,
            RecoveryAction::ReloadSource { delay, attempt } => {
                info!(controller = %self.id, attempt, delay_ms = delay.as_millis() as u64, "Scheduling source reload");
                self.schedule(PendingKind::Reload, delay);
                Step::Continue
            }
            RecoveryAction::ResumeLoading { delay, attempt } => {
                info!(controller = %self.id, attempt, delay_ms = delay.as_millis() as u64, "Scheduling load resume");
                self.schedule(PendingKind::ResumeLoading, delay);
                Step::Continue
            }
            RecoveryAction::RecoverMedia { attempt } => {
                info!(controller = %self.id, attempt, "Recovering media error in engine");
                self.set_state(PlaybackState::Recovering);
                let outcome = match self.engine.as_mut() {
                    Some(engine) => engine.recover_media_error(),
                    None => return Step::Continue,
                };
                match outcome {
                    Ok(()) => Step::Continue,
                    Err(err) => {
                        warn!(controller = %self.id, error = %err, "In-engine media recovery failed");
                        let fallback = self.policy.media_recovery_failed(&err.to_string());
                        self.apply(fallback)
                    }
                }
            }
            RecoveryAction::AwaitStream(reason) => {
                info!(controller = %self.id, target = %self.target, %reason, "Stream unavailable");
                self.pending = None;
                self.set_state(PlaybackState::Recovering);
                Step::AwaitStream(reason)
            }
            RecoveryAction::Fail(reason) => self.fail(reason),
        }
    }

    fn schedule(&mut self, kind: PendingKind, delay: std::time::Duration) {
        self.pending = Some(PendingAction {
            kind,
            remaining_ticks: self.config.ticks_for(delay),
        });
        self.set_state(PlaybackState::Recovering);
    }

    /// A healthy pipeline signal ends a recovery with nothing left pending
    fn recovered(&mut self) {
        if self.state != PlaybackState::Recovering || self.pending.is_some() {
            return;
        }

        if self.media.paused() {
            self.set_state(PlaybackState::Buffering);
        } else {
            self.set_state(PlaybackState::Playing);
        }
    }

    // =========================================================================
    // Media events
    // =========================================================================

    pub fn handle_media_event(&mut self, event: MediaEvent) -> Step {
        if !self.is_live() {
            trace!(controller = %self.id, ?event, "Dropping media event");
            return Step::Continue;
        }

        match event {
            MediaEvent::PlayStarted => {
                self.play_in_flight = false;
                if matches!(
                    self.state,
                    PlaybackState::Buffering | PlaybackState::AwaitingGesture
                ) {
                    self.grace_ticks = 0;
                    self.set_state(PlaybackState::Playing);
                }
            }
            MediaEvent::PlayRejected(PlayRejection::Autoplay) => {
                self.play_in_flight = false;
                if matches!(
                    self.state,
                    PlaybackState::Buffering | PlaybackState::AwaitingGesture
                ) {
                    warn!(controller = %self.id, "Autoplay refused, waiting for user gesture");
                    self.set_state(PlaybackState::AwaitingGesture);
                }
            }
            MediaEvent::PlayRejected(PlayRejection::Interrupted) => {
                debug!(controller = %self.id, "Play attempt interrupted");
                self.play_in_flight = false;
            }
            MediaEvent::Paused => {
                if self.pause_requested {
                    self.pause_requested = false;
                    if self.state == PlaybackState::PausedForRebuffer {
                        self.set_state(PlaybackState::Buffering);
                    }
                } else if self.state == PlaybackState::Playing {
                    info!(controller = %self.id, "Paused by viewer");
                    self.set_state(PlaybackState::AwaitingGesture);
                }
            }
            MediaEvent::Waiting => {
                if self.state == PlaybackState::Playing {
                    let ahead = self.buffered_ahead();
                    if ahead < self.thresholds().resume {
                        self.pause_for_rebuffer(ahead, "stalled");
                    }
                }
            }
            MediaEvent::Error(detail) => {
                warn!(controller = %self.id, detail, "Media element error");
                let error = EngineError::new(true, ErrorCategory::Media, ErrorDetail::Decode);
                return self.handle_error(&error);
            }
        }

        Step::Continue
    }

    /// Viewer-initiated play; the only way out of `AwaitingGesture`
    pub fn user_play(&mut self) {
        if !self.is_live() || self.play_in_flight {
            return;
        }
        info!(controller = %self.id, state = %self.state, "User requested play");
        self.play_in_flight = true;
        self.media.play();
    }

    // =========================================================================
    // Side effects
    // =========================================================================

    fn request_play(&mut self) {
        self.play_in_flight = true;
        self.media.play();
    }

    fn pause_for_rebuffer(&mut self, ahead: f64, reason: &'static str) {
        info!(controller = %self.id, ahead, reason, "Pausing to rebuffer");
        self.grace_ticks = 0;
        self.pause_requested = true;
        self.media.pause();
        self.set_state(PlaybackState::PausedForRebuffer);
    }

    fn fail(&mut self, reason: FailureReason) -> Step {
        warn!(controller = %self.id, %reason, "Controller failed");
        self.pending = None;
        self.release_engine();
        self.failure = Some(reason.clone());
        self.set_state(PlaybackState::Failed);
        Step::Failed(reason)
    }

    /// Stop reacting to events and release the engine. Safe to call twice.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.pending = None;
        self.play_in_flight = false;
        self.release_engine();
        self.state = PlaybackState::Idle;
        info!(controller = %self.id, "Controller torn down");
    }

    fn release_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
    }

    fn is_live(&self) -> bool {
        !self.torn_down && self.state != PlaybackState::Failed
    }

    fn set_state(&mut self, new_state: PlaybackState) -> bool {
        let current = self.state;
        if current == new_state {
            return true;
        }
        if !current.can_transition_to(new_state) {
            warn!(controller = %self.id, from = %current, to = %new_state, "Invalid state transition");
            return false;
        }

        self.state = new_state;
        info!(controller = %self.id, from = %current, to = %new_state, "State transition");
        true
    }
}

impl<E: SegmentEngine> Drop for PlaybackController<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}
