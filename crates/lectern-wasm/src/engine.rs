//! hls.js engine and `<video>` element adapters
//!
//! The page creates the `Hls` instance and the media element; these wrappers
//! let the controller drive them through its engine and media traits.

use lectern_core::{Error, MediaElement, MediaEvent, PlayRejection, Result, SegmentEngine};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::HtmlMediaElement;

#[wasm_bindgen]
extern "C" {
    /// hls.js instance owned by the host page
    #[derive(Debug, Clone)]
    pub type Hls;

    #[wasm_bindgen(method, catch, js_name = loadSource)]
    fn load_source(this: &Hls, url: &str) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = attachMedia)]
    fn attach_media(this: &Hls, media: &HtmlMediaElement) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = startLoad)]
    fn start_load(this: &Hls);

    #[wasm_bindgen(method, catch, js_name = recoverMediaError)]
    fn recover_media_error(this: &Hls) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(method)]
    fn destroy(this: &Hls);
}

/// Readable text for a thrown JS value
pub(crate) fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(value, &JsValue::from_str("message"))
                .ok()
                .and_then(|message| message.as_string())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

/// [`SegmentEngine`] over an hls.js instance
pub struct HlsEngine {
    hls: Hls,
}

impl HlsEngine {
    pub fn new(hls: Hls) -> Self {
        Self { hls }
    }
}

impl SegmentEngine for HlsEngine {
    type Media = JsMedia;

    fn load_source(&mut self, url: &Url) -> Result<()> {
        self.hls
            .load_source(url.as_str())
            .map_err(|err| Error::EngineLoad(describe(&err)))
    }

    fn attach_media(&mut self, media: &JsMedia) -> Result<()> {
        self.hls
            .attach_media(&media.element)
            .map_err(|err| Error::EngineLoad(describe(&err)))
    }

    fn start_load(&mut self) {
        self.hls.start_load();
    }

    fn recover_media_error(&mut self) -> Result<()> {
        self.hls
            .recover_media_error()
            .map_err(|err| Error::MediaRecovery(describe(&err)))
    }

    fn destroy(&mut self) {
        self.hls.destroy();
    }
}

/// Play promise outcomes waiting to be fed back to the controller
pub type Outcomes = Rc<RefCell<VecDeque<MediaEvent>>>;

/// [`MediaElement`] over an `HTMLMediaElement`
#[derive(Clone)]
pub struct JsMedia {
    element: HtmlMediaElement,
    outcomes: Outcomes,
}

impl JsMedia {
    pub fn new(element: HtmlMediaElement, outcomes: Outcomes) -> Self {
        Self { element, outcomes }
    }
}

impl MediaElement for JsMedia {
    fn buffered_ranges(&self) -> Vec<(f64, f64)> {
        let ranges = self.element.buffered();
        (0..ranges.length())
            .filter_map(|i| Some((ranges.start(i).ok()?, ranges.end(i).ok()?)))
            .collect()
    }

    fn current_time(&self) -> f64 {
        self.element.current_time()
    }

    fn paused(&self) -> bool {
        self.element.paused()
    }

    fn play(&mut self) {
        let promise = match self.element.play() {
            Ok(promise) => promise,
            Err(err) => {
                self.outcomes
                    .borrow_mut()
                    .push_back(MediaEvent::PlayRejected(rejection(&err)));
                return;
            }
        };

        let outcomes = self.outcomes.clone();
        spawn_local(async move {
            let event = match JsFuture::from(promise).await {
                Ok(_) => MediaEvent::PlayStarted,
                Err(err) => MediaEvent::PlayRejected(rejection(&err)),
            };
            outcomes.borrow_mut().push_back(event);
        });
    }

    fn pause(&mut self) {
        if let Err(err) = self.element.pause() {
            web_sys::console::warn_1(&format!("[Lectern] pause() threw: {}", describe(&err)).into());
        }
    }
}

/// `NotAllowedError` is the autoplay policy; anything else (usually
/// `AbortError` from a load or pause) can simply be retried
fn rejection(err: &JsValue) -> PlayRejection {
    let name = js_sys::Reflect::get(err, &JsValue::from_str("name"))
        .ok()
        .and_then(|name| name.as_string());

    match name.as_deref() {
        Some("NotAllowedError") => PlayRejection::Autoplay,
        _ => PlayRejection::Interrupted,
    }
}
