//! Live Session - runtime driver for playback controllers
//!
//! Coordinates:
//! - One controller per stream target, rebuilt rather than mutated
//! - The buffer sampler and readiness poller as cancellable tasks
//! - Stale callback rejection by controller identity
//! - Status publication for the UI layer
//!
//! Inputs are served by a biased select: commands first, then engine and
//! media events, then timer inputs. An error reported in the same turn as a
//! sampler tick is therefore classified before the tick can resume playback.

use crate::{
    config::{ControllerConfig, StreamEndpoints},
    controller::{PlaybackController, SegmentEngine, Step},
    events::{EngineEvent, MediaEvent},
    readiness::{PollOutcome, ReadinessPoller, StreamProbe},
    types::{BroadcastKey, ControllerId, FailureReason, PlaybackState, PlayerStatus, PollProgress, StreamTarget},
    Error, Result,
};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

/// Builds a fresh segment engine for each controller
pub trait EngineFactory {
    type Engine: SegmentEngine;

    /// Create an engine for `target`. Engine and media callbacks must be
    /// reported through `sink`, which is tagged with the new controller's id.
    fn create(&mut self, target: &StreamTarget, sink: EventSink) -> Result<Self::Engine>;
}

/// Handle to a spawned task; aborted on [`TaskHandle::cancel`] or drop
#[derive(Debug)]
pub struct TaskHandle(JoinHandle<()>);

impl TaskHandle {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }

    pub fn cancel(&self) {
        self.0.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug)]
enum SessionEvent {
    Engine(EngineEvent),
    Media(MediaEvent),
}

#[derive(Debug)]
struct TaggedEvent {
    id: ControllerId,
    event: SessionEvent,
}

/// Reports engine and media callbacks for one controller instance
#[derive(Debug, Clone)]
pub struct EventSink {
    id: ControllerId,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn engine(&self, event: EngineEvent) {
        let _ = self.tx.send(TaggedEvent {
            id: self.id,
            event: SessionEvent::Engine(event),
        });
    }

    pub fn media(&self, event: MediaEvent) {
        let _ = self.tx.send(TaggedEvent {
            id: self.id,
            event: SessionEvent::Media(event),
        });
    }
}

#[derive(Debug)]
enum TimerInput {
    Tick(ControllerId),
    PollProgress(ControllerId, PollProgress),
    PollFinished(ControllerId, PollOutcome),
}

#[derive(Debug)]
enum Command {
    UserPlay,
    Retry,
    Retarget(BroadcastKey),
    Teardown,
}

/// Clonable control surface for a running [`LiveSession`]
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<PlayerStatus>,
}

impl SessionHandle {
    /// Viewer pressed play
    pub fn user_play(&self) -> Result<()> {
        self.send(Command::UserPlay)
    }

    /// Manual retry: restart readiness polling from the first attempt
    pub fn retry(&self) -> Result<()> {
        self.send(Command::Retry)
    }

    /// Watch a different broadcast key
    pub fn retarget(&self, key: BroadcastKey) -> Result<()> {
        self.send(Command::Retarget(key))
    }

    /// Stop the session. Calling this more than once has no further effect.
    pub fn teardown(&self) {
        let _ = self.commands.send(Command::Teardown);
    }

    /// Current status snapshot
    pub fn status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::SessionClosed)
    }
}

struct Attachment<E: SegmentEngine> {
    controller: PlaybackController<E>,
    _sampler: TaskHandle,
}

struct Polling {
    id: ControllerId,
    /// Reported if the poll budget runs out
    on_exhausted: FailureReason,
    _task: TaskHandle,
}

type MediaOf<F> = <<F as EngineFactory>::Engine as SegmentEngine>::Media;

/// Live preview session for one viewer
pub struct LiveSession<F: EngineFactory> {
    factory: F,
    media: MediaOf<F>,
    probe: Arc<dyn StreamProbe>,
    endpoints: StreamEndpoints,
    config: ControllerConfig,
    target: StreamTarget,
    attachment: Option<Attachment<F::Engine>>,
    polling: Option<Polling>,
    failure: Option<FailureReason>,
    progress: Option<PollProgress>,
    status_tx: watch::Sender<PlayerStatus>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<TaggedEvent>,
    event_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    timer_tx: mpsc::UnboundedSender<TimerInput>,
    timer_rx: mpsc::UnboundedReceiver<TimerInput>,
}

impl<F> LiveSession<F>
where
    F: EngineFactory,
    MediaOf<F>: Clone,
{
    /// Create a session for `key`; nothing happens until [`LiveSession::run`]
    pub fn new(
        factory: F,
        media: MediaOf<F>,
        probe: Arc<dyn StreamProbe>,
        endpoints: StreamEndpoints,
        key: BroadcastKey,
        config: ControllerConfig,
    ) -> Result<(Self, SessionHandle)> {
        config.validate()?;
        let target = StreamTarget::derive(&endpoints, key)?;

        let (status_tx, status_rx) = watch::channel(PlayerStatus::new(target.clone()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let session = Self {
            factory,
            media,
            probe,
            endpoints,
            config,
            target,
            attachment: None,
            polling: None,
            failure: None,
            progress: None,
            status_tx,
            command_rx,
            event_tx,
            event_rx,
            timer_tx,
            timer_rx,
        };
        let handle = SessionHandle {
            commands: command_tx,
            status: status_rx,
        };

        Ok((session, handle))
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    /// Drive the session until torn down or every handle is dropped
    #[instrument(skip(self), fields(target = %self.target))]
    pub async fn run(mut self) {
        info!("Live session started");
        self.attach();

        loop {
            tokio::select! {
                biased;

                command = self.command_rx.recv() => match command {
                    Some(Command::Teardown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(tagged) = self.event_rx.recv() => self.handle_event(tagged),
                Some(input) = self.timer_rx.recv() => self.handle_timer(input),
            }
        }

        self.shutdown();
        info!("Live session ended");
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    fn handle_command(&mut self, command: Command) {
        debug!(?command, "Session command");
        match command {
            Command::UserPlay => {
                if let Some(attachment) = self.attachment.as_mut() {
                    attachment.controller.user_play();
                }
            }
            Command::Retry => {
                self.detach();
                self.failure = None;
                self.start_polling(FailureReason::StreamNotStarted);
            }
            Command::Retarget(key) => match StreamTarget::derive(&self.endpoints, key) {
                Ok(target) => {
                    info!(from = %self.target, to = %target, "Retargeting session");
                    self.target = target;
                    self.failure = None;
                    self.attach();
                }
                Err(err) => warn!(error = %err, "Ignoring retarget"),
            },
            Command::Teardown => {}
        }
        self.publish();
    }

    fn handle_event(&mut self, tagged: TaggedEvent) {
        let Some(attachment) = self.attachment.as_mut() else {
            trace!(id = %tagged.id, "Event with no attached controller");
            return;
        };
        if attachment.controller.id() != tagged.id {
            trace!(id = %tagged.id, current = %attachment.controller.id(), "Dropping stale event");
            return;
        }

        let step = match tagged.event {
            SessionEvent::Engine(event) => attachment.controller.handle_engine_event(event),
            SessionEvent::Media(event) => attachment.controller.handle_media_event(event),
        };
        self.after_step(step);
    }

    fn handle_timer(&mut self, input: TimerInput) {
        match input {
            TimerInput::Tick(id) => {
                let Some(attachment) = self.attachment.as_mut() else {
                    return;
                };
                if attachment.controller.id() != id {
                    return;
                }
                let step = attachment.controller.tick();
                self.after_step(step);
            }
            TimerInput::PollProgress(id, progress) => {
                if self.polling.as_ref().is_some_and(|polling| polling.id == id) {
                    self.progress = Some(progress);
                    self.publish();
                }
            }
            TimerInput::PollFinished(id, outcome) => {
                let polling = match self.polling.take() {
                    Some(polling) if polling.id == id => polling,
                    other => {
                        self.polling = other;
                        trace!(%id, "Dropping stale poll outcome");
                        return;
                    }
                };
                self.progress = None;
                self.handle_poll_outcome(outcome, polling.on_exhausted);
            }
        }
    }

    fn handle_poll_outcome(&mut self, outcome: PollOutcome, on_exhausted: FailureReason) {
        match outcome {
            PollOutcome::Ready => self.attach(),
            PollOutcome::Resynced(key) => match self.target.with_key(&self.endpoints, key) {
                Ok(target) => {
                    info!(from = %self.target, to = %target, "Resynced to active broadcast key");
                    self.target = target;
                    self.attach();
                }
                Err(err) => self.fail(FailureReason::playback(format!("resync failed: {err}"))),
            },
            PollOutcome::Exhausted => self.fail(on_exhausted),
        }
    }

    fn after_step(&mut self, step: Step) {
        match step {
            Step::Continue => {}
            Step::AwaitStream(on_exhausted) => {
                self.detach();
                self.start_polling(on_exhausted);
            }
            Step::Failed(reason) => self.fail(reason),
        }
        self.publish();
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Replace any controller with a fresh one for the current target
    fn attach(&mut self) {
        self.stop_polling();
        self.detach();

        let id = ControllerId::new();
        let sink = EventSink {
            id,
            tx: self.event_tx.clone(),
        };

        let engine = match self.factory.create(&self.target, sink) {
            Ok(engine) => engine,
            Err(err) => {
                self.fail(FailureReason::playback(format!("could not create engine: {err}")));
                return;
            }
        };

        let controller = match PlaybackController::attach(
            id,
            self.target.clone(),
            engine,
            self.media.clone(),
            self.config.clone(),
        ) {
            Ok(controller) => controller,
            Err(err) => {
                self.fail(FailureReason::playback(format!("could not attach: {err}")));
                return;
            }
        };

        let sampler = spawn_sampler(id, self.config.sample_interval(), self.timer_tx.clone());
        self.attachment = Some(Attachment {
            controller,
            _sampler: sampler,
        });
        self.failure = None;
        self.publish();
    }

    /// Tear down the current controller and stop its sampler
    fn detach(&mut self) {
        if let Some(mut attachment) = self.attachment.take() {
            attachment.controller.teardown();
        }
    }

    fn start_polling(&mut self, on_exhausted: FailureReason) {
        self.stop_polling();

        let id = ControllerId::new();
        let poller = ReadinessPoller::new(self.config.poll.clone());
        let probe = self.probe.clone();
        let target = self.target.clone();
        let tx = self.timer_tx.clone();

        info!(target = %target, "Polling for stream readiness");
        let task = TaskHandle::spawn(async move {
            let progress_tx = tx.clone();
            let outcome = poller
                .run(probe.as_ref(), &target, move |progress| {
                    let _ = progress_tx.send(TimerInput::PollProgress(id, progress));
                })
                .await;
            let _ = tx.send(TimerInput::PollFinished(id, outcome));
        });

        self.polling = Some(Polling {
            id,
            on_exhausted,
            _task: task,
        });
        self.progress = Some(PollProgress {
            attempt: 0,
            max_attempts: self.config.poll.max_attempts,
        });
        self.publish();
    }

    fn stop_polling(&mut self) {
        self.polling = None;
        self.progress = None;
    }

    fn fail(&mut self, reason: FailureReason) {
        warn!(%reason, "Session failed");
        self.detach();
        self.stop_polling();
        self.failure = Some(reason);
        self.publish();
    }

    fn shutdown(&mut self) {
        self.detach();
        self.stop_polling();
        self.publish();
    }

    fn publish(&mut self) {
        let state = match (&self.attachment, &self.failure) {
            (Some(attachment), _) => attachment.controller.state(),
            (None, Some(_)) => PlaybackState::Failed,
            (None, None) => PlaybackState::Idle,
        };
        let target = self.target.clone();
        let polling = self.progress;
        let failure = self.failure.clone();

        self.status_tx.send_if_modified(|status| {
            if status.state == state
                && status.polling == polling
                && status.failure == failure
                && status.target == target
            {
                return false;
            }
            *status = PlayerStatus {
                target,
                state,
                polling,
                failure,
                updated_at: Utc::now(),
            };
            true
        });
    }
}

fn spawn_sampler(
    id: ControllerId,
    period: std::time::Duration,
    tx: mpsc::UnboundedSender<TimerInput>,
) -> TaskHandle {
    TaskHandle::spawn(async move {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if tx.send(TimerInput::Tick(id)).is_err() {
                break;
            }
        }
    })
}
