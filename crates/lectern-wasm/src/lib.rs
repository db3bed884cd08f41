//! Lectern WASM - live preview playback in the browser
//!
//! Runs the Lectern playback controller against hls.js and a `<video>`
//! element:
//! - Buffer thresholds derived from the live playlist cadence
//! - Buffer-driven play/pause with autoplay handling
//! - hls.js error classification and bounded recovery
//!
//! ## Integration with hls.js
//!
//! ```javascript
//! import init, { LecternPlayer, computeThresholds } from '@lectern/wasm';
//!
//! await init();
//! const player = new LecternPlayer(hls, video, hlsBase, streamKey);
//! ```
//!
//! Readiness polling runs in the page; see [`LecternPlayer`] for the loop
//! and `resyncKeyFromStat` for the key switch.

use lectern_core::{status, BroadcastKey, BufferThresholds, SegmentProfile};
use wasm_bindgen::prelude::*;

mod engine;
mod player;

pub use engine::{Hls, HlsEngine, JsMedia};
pub use player::LecternPlayer;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    web_sys::console::log_1(&format!("[Lectern WASM] Initialized v{}", lectern_core::VERSION).into());
}

/// Library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Start/resume/critical thresholds (seconds) for a segment cadence, as JSON
#[wasm_bindgen(js_name = computeThresholds)]
pub fn compute_thresholds(target_duration: f64, playlist_duration: f64) -> String {
    let profile = (target_duration.is_finite() && target_duration > 0.0)
        .then(|| SegmentProfile::new(target_duration, playlist_duration));
    let thresholds = BufferThresholds::for_profile(profile.as_ref());
    serde_json::to_string(&thresholds).unwrap_or_default()
}

/// Keys currently publishing to `application` in an nginx-rtmp `stat` document
#[wasm_bindgen(js_name = activeKeysFromStat)]
pub fn active_keys_from_stat(xml: &str, application: &str) -> Result<js_sys::Array, JsError> {
    let keys = status::active_keys(xml, application).map_err(|err| JsError::new(&err.to_string()))?;
    Ok(keys
        .iter()
        .map(|key| JsValue::from_str(key.as_str()))
        .collect())
}

/// Publishing key a viewer on `current_key` should switch to, if any.
///
/// `undefined` when nothing is publishing or `current_key` itself is live.
#[wasm_bindgen(js_name = resyncKeyFromStat)]
pub fn resync_key_from_stat(
    xml: &str,
    application: &str,
    current_key: &str,
) -> Result<Option<String>, JsError> {
    let current = BroadcastKey::new(current_key).map_err(|err| JsError::new(&err.to_string()))?;
    let publishing =
        status::active_keys(xml, application).map_err(|err| JsError::new(&err.to_string()))?;
    Ok(status::resync_candidate(&current, &publishing).map(|key| key.as_str().to_string()))
}
