//! Session-level tests: readiness polling, resync, event ordering, stale callbacks and teardown

mod common;

use common::{endpoints, key, SimFactory, SimMedia, SimProbe};
use lectern_core::{
    ControllerConfig, EngineError, EngineEvent, Error, ErrorCategory, ErrorDetail, FailureReason,
    LiveSession, MediaEvent, PlaybackState, PollConfig, SessionHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

fn not_found() -> EngineEvent {
    EngineEvent::Error(
        EngineError::new(true, ErrorCategory::Network, ErrorDetail::ManifestLoadError)
            .with_status(404),
    )
}

fn manifest_timeout() -> EngineEvent {
    EngineEvent::Error(EngineError::new(
        true,
        ErrorCategory::Network,
        ErrorDetail::ManifestLoadTimeout,
    ))
}

fn start(
    factory: &SimFactory,
    media: &SimMedia,
    probe: Arc<SimProbe>,
    config: ControllerConfig,
) -> (SessionHandle, JoinHandle<()>) {
    common::init_tracing();
    let (session, handle) = LiveSession::new(
        factory.clone(),
        media.clone(),
        probe,
        endpoints(),
        key("lecture-7"),
        config,
    )
    .unwrap();
    (handle, tokio::spawn(session.run()))
}

async fn wait_for_state(handle: &SessionHandle, state: PlaybackState) {
    handle
        .subscribe()
        .wait_for(|status| status.state == state)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_missing_manifest_polls_until_ready() {
    let factory = SimFactory::default();
    let media = SimMedia::new();
    let probe = Arc::new(SimProbe::ready_on(10));
    let (handle, _task) = start(&factory, &media, probe.clone(), ControllerConfig::default());
    wait_for_state(&handle, PlaybackState::Buffering).await;

    let started = tokio::time::Instant::now();
    factory.sink(0).engine(not_found());

    let mut status = handle.subscribe();
    status.wait_for(|status| status.polling.is_some()).await.unwrap();
    assert_eq!(status.borrow().state, PlaybackState::Idle);
    assert_eq!(factory.destroys(), 1);

    status.wait_for(|status| status.polling.is_none()).await.unwrap();
    assert_eq!(status.borrow().state, PlaybackState::Buffering);
    assert_eq!(probe.checks(), 10);
    assert_eq!(factory.count(), 2);
    assert_eq!(factory.target(1).key, key("lecture-7"));
    assert!(started.elapsed() >= Duration::from_secs(27));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_poll_progress_is_published() {
    let factory = SimFactory::default();
    let media = SimMedia::new();
    let probe = Arc::new(SimProbe::never_ready());
    let (handle, _task) = start(&factory, &media, probe, ControllerConfig::default());
    wait_for_state(&handle, PlaybackState::Buffering).await;

    factory.sink(0).engine(not_found());

    let mut status = handle.subscribe();
    for attempt in 1..=3 {
        status
            .wait_for(|status| status.polling.is_some_and(|p| p.attempt == attempt))
            .await
            .unwrap();
        let message = status.borrow().overlay_message().unwrap();
        assert!(message.contains(&format!("check {attempt} of 10")), "{message}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_publishing_key_resyncs_target() {
    let factory = SimFactory::default();
    let media = SimMedia::new();
    let probe = Arc::new(SimProbe::never_ready().publishing(vec![key("fresh")]));
    let (handle, _task) = start(&factory, &media, probe.clone(), ControllerConfig::default());
    wait_for_state(&handle, PlaybackState::Buffering).await;

    factory.sink(0).engine(not_found());

    handle
        .subscribe()
        .wait_for(|status| status.target.key == key("fresh") && status.state == PlaybackState::Buffering)
        .await
        .unwrap();

    assert_eq!(probe.checks(), 1);
    assert_eq!(factory.count(), 2);
    assert_eq!(
        factory.target(1).manifest_url.as_str(),
        "http://media.test/hls/fresh.m3u8"
    );
    assert!(handle.status().polling.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stale_callbacks_are_ignored() {
    let factory = SimFactory::default();
    let media = SimMedia::new();
    let probe = Arc::new(SimProbe::never_ready());
    let (handle, _task) = start(&factory, &media, probe, ControllerConfig::default());
    wait_for_state(&handle, PlaybackState::Buffering).await;

    let stale = factory.sink(0);
    handle.retarget(key("other")).unwrap();
    handle
        .subscribe()
        .wait_for(|status| status.target.key == key("other"))
        .await
        .unwrap();
    assert_eq!(factory.count(), 2);
    assert_ne!(stale.id(), factory.sink(1).id());

    stale.engine(EngineEvent::Error(EngineError::new(
        true,
        ErrorCategory::Other,
        ErrorDetail::Other("internalException".into()),
    )));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = handle.status();
    assert_eq!(status.state, PlaybackState::Buffering);
    assert!(status.failure.is_none());
    assert_eq!(factory.destroys(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_polling_fails_then_retry_restarts() {
    let factory = SimFactory::default();
    let media = SimMedia::new();
    let probe = Arc::new(SimProbe::never_ready());
    let config = ControllerConfig {
        poll: PollConfig {
            interval_ms: 3000,
            max_attempts: 3,
        },
        ..Default::default()
    };
    let (handle, _task) = start(&factory, &media, probe.clone(), config);
    wait_for_state(&handle, PlaybackState::Buffering).await;

    factory.sink(0).engine(not_found());

    let mut status = handle.subscribe();
    status.wait_for(|status| status.failure.is_some()).await.unwrap();
    assert_eq!(status.borrow().state, PlaybackState::Failed);
    assert_eq!(status.borrow().failure, Some(FailureReason::StreamNotStarted));
    assert_eq!(probe.checks(), 3);

    handle.retry().unwrap();
    status
        .wait_for(|status| status.polling.is_some_and(|p| p.attempt == 1))
        .await
        .unwrap();
    assert!(status.borrow().failure.is_none());
    assert_eq!(status.borrow().state, PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_that_outlast_polling_report_playback_failure() {
    let factory = SimFactory::default();
    let media = SimMedia::new();
    let readiness = Arc::new(SimProbe::never_ready());
    let config = ControllerConfig {
        poll: PollConfig {
            interval_ms: 3000,
            max_attempts: 3,
        },
        ..Default::default()
    };
    let (handle, _task) = start(&factory, &media, readiness.clone(), config);
    wait_for_state(&handle, PlaybackState::Buffering).await;

    let sink = factory.sink(0);
    for _ in 0..3 {
        sink.engine(manifest_timeout());
    }

    let mut status = handle.subscribe();
    status.wait_for(|status| status.failure.is_some()).await.unwrap();
    assert_eq!(readiness.checks(), 3);
    assert_eq!(factory.destroys(), 1);
    assert_eq!(status.borrow().state, PlaybackState::Failed);

    match status.borrow().failure.clone() {
        Some(FailureReason::PlaybackFailed { detail }) => {
            assert!(detail.contains("manifest-load-timeout"), "{detail}");
        }
        other => panic!("expected a playback failure, got {other:?}"),
    };
}

#[tokio::test(start_paused = true)]
async fn test_error_is_handled_before_tick_in_same_turn() {
    let factory = SimFactory::default();
    let media = SimMedia::new();
    let readiness = Arc::new(SimProbe::never_ready());
    let (handle, _task) = start(&factory, &media, readiness, ControllerConfig::default());
    wait_for_state(&handle, PlaybackState::Buffering).await;

    // Enough lead buffer that the first sample would call play()
    media.set_ahead(6.0);

    // Fires on the same timer turn as the sampler's first tick, so the
    // session wakes with both the error and the tick queued
    let sink = factory.sink(0);
    let first_tick = tokio::time::Instant::now() + Duration::from_millis(500);
    tokio::spawn(async move {
        tokio::time::sleep_until(first_tick).await;
        sink.engine(EngineEvent::Error(EngineError::new(
            true,
            ErrorCategory::Other,
            ErrorDetail::Other("internalException".into()),
        )));
    });

    wait_for_state(&handle, PlaybackState::Failed).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(media.plays(), 0);
    assert_eq!(factory.destroys(), 1);
    assert!(matches!(
        handle.status().failure,
        Some(FailureReason::PlaybackFailed { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_plays_through_session() {
    let factory = SimFactory::default();
    let media = SimMedia::new();
    let probe = Arc::new(SimProbe::never_ready());
    let (handle, _task) = start(&factory, &media, probe, ControllerConfig::default());
    wait_for_state(&handle, PlaybackState::Buffering).await;

    let sink = factory.sink(0);
    sink.engine(EngineEvent::SegmentProfileUpdated {
        target_duration: 2.0,
        playlist_duration: 8.0,
    });
    media.set_ahead(6.0);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(media.plays(), 1);

    media.set_paused(false);
    sink.media(MediaEvent::PlayStarted);
    wait_for_state(&handle, PlaybackState::Playing).await;

    media.set_ahead(1.0);
    wait_for_state(&handle, PlaybackState::PausedForRebuffer).await;
    assert_eq!(media.pauses(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_is_idempotent() {
    let factory = SimFactory::default();
    let media = SimMedia::new();
    let probe = Arc::new(SimProbe::never_ready());
    let (handle, task) = start(&factory, &media, probe, ControllerConfig::default());
    wait_for_state(&handle, PlaybackState::Buffering).await;

    handle.teardown();
    handle.teardown();
    task.await.unwrap();

    assert_eq!(factory.destroys(), 1);
    assert_eq!(handle.status().state, PlaybackState::Idle);
    assert!(matches!(handle.user_play(), Err(Error::SessionClosed)));
}
