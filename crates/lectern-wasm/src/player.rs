//! LecternPlayer - controller bound to hls.js and a `<video>` element
//!
//! ## Usage with hls.js
//!
//! ```javascript
//! const hls = new Hls({ lowLatencyMode: true });
//! const player = new LecternPlayer(hls, video, 'https://media.example.edu/hls/', key);
//!
//! hls.on(Hls.Events.MANIFEST_PARSED, () => handle(player.onManifestParsed()));
//! hls.on(Hls.Events.LEVEL_LOADED, (_, d) =>
//!   handle(player.onLevelLoaded(d.details.targetduration, d.details.totalduration)));
//! hls.on(Hls.Events.FRAG_LOADED, (_, d) => handle(player.onFragLoaded(d)));
//! hls.on(Hls.Events.ERROR, (_, d) => handle(player.onError(d)));
//! video.addEventListener('pause', () => handle(player.onPause()));
//! video.addEventListener('waiting', () => handle(player.onWaiting()));
//! setInterval(() => handle(player.tick()), 500);
//!
//! // handle(step): 'continue' | 'await_stream' | 'failed'
//! ```
//!
//! ## Waiting for the stream
//!
//! On `await_stream` the page owns readiness polling. Destroy the player,
//! then check every 3 s, at most 10 times. A key reported by
//! `resyncKeyFromStat` wins over a manifest that happens to exist in the
//! same round. When the checks run out, show `unavailableMessage()`,
//! read before `destroy()`.
//!
//! ```javascript
//! async function awaitStream(key) {
//!   for (let attempt = 1; attempt <= 10; attempt++) {
//!     showOverlay(`Waiting for the broadcast to start (check ${attempt} of 10)`);
//!     const stat = await fetch(statUrl).then(r => (r.ok ? r.text() : null), () => null);
//!     const fresh = stat && resyncKeyFromStat(stat, 'live', key);
//!     if (fresh) return fresh;
//!     const head = await fetch(`${hlsBase}${key}.m3u8`, { method: 'HEAD' }).catch(() => null);
//!     if (head && head.ok) return key;
//!     await new Promise(r => setTimeout(r, 3000));
//!   }
//!   return null;
//! }
//!
//! // const next = await awaitStream(key);
//! // next ? start(new LecternPlayer(new Hls(), video, hlsBase, next)) : showRetry();
//! ```

use crate::engine::{Hls, HlsEngine, JsMedia, Outcomes};
use lectern_core::events::{HlsErrorData, HlsFragLoaded};
use lectern_core::{
    BroadcastKey, ControllerConfig, ControllerId, EngineError, EngineEvent, MediaEvent,
    FailureReason, PlaybackController, StreamEndpoints, StreamTarget, Step,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use url::Url;
use wasm_bindgen::prelude::*;
use web_sys::HtmlMediaElement;

fn js_error(err: impl std::fmt::Display) -> JsError {
    JsError::new(&err.to_string())
}

fn step_name(step: &Step) -> String {
    match step {
        Step::Continue => "continue",
        Step::AwaitStream(_) => "await_stream",
        Step::Failed(_) => "failed",
    }
    .to_string()
}

/// Live preview player driven by the host page's timers and events
#[wasm_bindgen]
pub struct LecternPlayer {
    controller: PlaybackController<HlsEngine>,
    outcomes: Outcomes,
    /// Reason to show if the stream never comes back after `await_stream`
    unavailable: Option<FailureReason>,
}

#[wasm_bindgen]
impl LecternPlayer {
    /// Attach `hls` to `media` and start loading `<hlsBase><key>.m3u8`.
    ///
    /// `config` is an optional controller configuration object.
    #[wasm_bindgen(constructor)]
    pub fn new(
        hls: Hls,
        media: HtmlMediaElement,
        hls_base: &str,
        key: &str,
        config: JsValue,
    ) -> Result<LecternPlayer, JsError> {
        let config: ControllerConfig = if config.is_undefined() || config.is_null() {
            ControllerConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(js_error)?
        };

        let base = Url::parse(hls_base).map_err(js_error)?;
        let key = BroadcastKey::new(key).map_err(js_error)?;
        let target = StreamTarget::derive(&StreamEndpoints::new(base), key).map_err(js_error)?;

        let outcomes: Outcomes = Rc::new(RefCell::new(VecDeque::new()));
        let controller = PlaybackController::attach(
            ControllerId::new(),
            target,
            HlsEngine::new(hls),
            JsMedia::new(media, outcomes.clone()),
            config,
        )
        .map_err(js_error)?;

        Ok(Self {
            controller,
            outcomes,
            unavailable: None,
        })
    }

    /// Manifest URL being played
    #[wasm_bindgen(js_name = manifestUrl)]
    pub fn manifest_url(&self) -> String {
        self.controller.target().manifest_url.to_string()
    }

    // =========================================================================
    // hls.js events
    // =========================================================================

    #[wasm_bindgen(js_name = onManifestParsed)]
    pub fn on_manifest_parsed(&mut self) -> String {
        self.engine_event(EngineEvent::ManifestReady)
    }

    /// `LEVEL_LOADED`: `details.targetduration` and `details.totalduration`
    #[wasm_bindgen(js_name = onLevelLoaded)]
    pub fn on_level_loaded(&mut self, target_duration: f64, total_duration: f64) -> String {
        self.engine_event(EngineEvent::SegmentProfileUpdated {
            target_duration,
            playlist_duration: total_duration,
        })
    }

    /// `FRAG_LOADED` data object
    #[wasm_bindgen(js_name = onFragLoaded)]
    pub fn on_frag_loaded(&mut self, data: JsValue) -> Result<String, JsError> {
        let data: HlsFragLoaded = serde_wasm_bindgen::from_value(data).map_err(js_error)?;
        Ok(self.engine_event(EngineEvent::from(data)))
    }

    /// `ERROR` data object
    #[wasm_bindgen(js_name = onError)]
    pub fn on_error(&mut self, data: JsValue) -> Result<String, JsError> {
        let data: HlsErrorData = serde_wasm_bindgen::from_value(data).map_err(js_error)?;
        Ok(self.engine_event(EngineEvent::Error(EngineError::from(data))))
    }

    // =========================================================================
    // Media element events
    // =========================================================================

    #[wasm_bindgen(js_name = onPause)]
    pub fn on_pause(&mut self) -> String {
        self.media_event(MediaEvent::Paused)
    }

    #[wasm_bindgen(js_name = onWaiting)]
    pub fn on_waiting(&mut self) -> String {
        self.media_event(MediaEvent::Waiting)
    }

    /// Media element `error` event; `detail` is the `MediaError` message
    #[wasm_bindgen(js_name = onMediaError)]
    pub fn on_media_error(&mut self, detail: String) -> String {
        self.media_event(MediaEvent::Error(detail))
    }

    /// Viewer clicked play
    #[wasm_bindgen(js_name = userPlay)]
    pub fn user_play(&mut self) -> String {
        if let Some(step) = self.drain() {
            return self.report(step);
        }
        self.controller.user_play();
        self.report(Step::Continue)
    }

    /// Buffer sample; call every `sample_interval_ms`
    pub fn tick(&mut self) -> String {
        if let Some(step) = self.drain() {
            return self.report(step);
        }
        let step = self.controller.tick();
        self.report(step)
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Controller state, e.g. `"buffering"` or `"awaiting_gesture"`
    pub fn state(&self) -> String {
        self.controller.state().to_string()
    }

    /// Viewer-facing explanation once the player has failed
    #[wasm_bindgen(js_name = failureMessage)]
    pub fn failure_message(&self) -> Option<String> {
        self.controller.failure().map(|reason| reason.message())
    }

    /// What to tell the viewer if polling after `await_stream` runs out
    #[wasm_bindgen(js_name = unavailableMessage)]
    pub fn unavailable_message(&self) -> Option<String> {
        self.unavailable.as_ref().map(|reason| reason.message())
    }

    /// Active start/resume/critical thresholds as JSON
    #[wasm_bindgen(js_name = thresholdsJson)]
    pub fn thresholds_json(&self) -> String {
        serde_json::to_string(&self.controller.thresholds()).unwrap_or_default()
    }

    /// Seconds buffered ahead of the playhead
    #[wasm_bindgen(js_name = bufferedAhead)]
    pub fn buffered_ahead(&self) -> f64 {
        self.controller.buffered_ahead()
    }

    /// Release hls.js. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.outcomes.borrow_mut().clear();
        self.controller.teardown();
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn engine_event(&mut self, event: EngineEvent) -> String {
        if let Some(step) = self.drain() {
            return self.report(step);
        }
        let step = self.controller.handle_engine_event(event);
        self.report(step)
    }

    fn media_event(&mut self, event: MediaEvent) -> String {
        if let Some(step) = self.drain() {
            return self.report(step);
        }
        let step = self.controller.handle_media_event(event);
        self.report(step)
    }

    fn report(&mut self, step: Step) -> String {
        if let Step::AwaitStream(reason) = &step {
            self.unavailable = Some(reason.clone());
        }
        step_name(&step)
    }

    /// Feed settled play promises to the controller in arrival order
    fn drain(&mut self) -> Option<Step> {
        loop {
            let event = self.outcomes.borrow_mut().pop_front()?;
            let step = self.controller.handle_media_event(event);
            if step != Step::Continue {
                return Some(step);
            }
        }
    }
}

impl Drop for LecternPlayer {
    fn drop(&mut self) {
        if !self.controller.is_torn_down() {
            web_sys::console::log_1(
                &format!("[Lectern] Releasing player for {}", self.controller.target()).into(),
            );
        }
    }
}

