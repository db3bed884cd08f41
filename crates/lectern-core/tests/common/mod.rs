//! Simulated engine, media element and probe shared by integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lectern_core::{
    BroadcastKey, EngineFactory, EventSink, MediaElement, Result, SegmentEngine, StreamEndpoints,
    StreamProbe, StreamTarget,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn key(name: &str) -> BroadcastKey {
    BroadcastKey::new(name).unwrap()
}

pub fn endpoints() -> StreamEndpoints {
    StreamEndpoints::new(Url::parse("http://media.test/hls/").unwrap())
}

pub fn target(name: &str) -> StreamTarget {
    StreamTarget::derive(&endpoints(), key(name)).unwrap()
}

// =============================================================================
// Media
// =============================================================================

#[derive(Debug)]
pub struct SimMediaState {
    pub ranges: Vec<(f64, f64)>,
    pub time: f64,
    pub paused: bool,
    pub plays: u32,
    pub pauses: u32,
}

#[derive(Debug, Clone)]
pub struct SimMedia(Arc<Mutex<SimMediaState>>);

impl SimMedia {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SimMediaState {
            ranges: Vec::new(),
            time: 0.0,
            paused: true,
            plays: 0,
            pauses: 0,
        })))
    }

    pub fn set_ahead(&self, ahead: f64) {
        let mut state = self.0.lock().unwrap();
        state.ranges = vec![(state.time, state.time + ahead)];
    }

    pub fn set_paused(&self, paused: bool) {
        self.0.lock().unwrap().paused = paused;
    }

    pub fn plays(&self) -> u32 {
        self.0.lock().unwrap().plays
    }

    pub fn pauses(&self) -> u32 {
        self.0.lock().unwrap().pauses
    }
}

impl MediaElement for SimMedia {
    fn buffered_ranges(&self) -> Vec<(f64, f64)> {
        self.0.lock().unwrap().ranges.clone()
    }

    fn current_time(&self) -> f64 {
        self.0.lock().unwrap().time
    }

    fn paused(&self) -> bool {
        self.0.lock().unwrap().paused
    }

    fn play(&mut self) {
        self.0.lock().unwrap().plays += 1;
    }

    fn pause(&mut self) {
        self.0.lock().unwrap().pauses += 1;
    }
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Default)]
pub struct EngineLog {
    pub loads: Vec<Url>,
    pub start_loads: u32,
    pub recoveries: u32,
    pub destroys: u32,
}

pub struct SimEngine {
    log: Arc<Mutex<EngineLog>>,
}

impl SimEngine {
    pub fn new(log: Arc<Mutex<EngineLog>>) -> Self {
        Self { log }
    }
}

impl SegmentEngine for SimEngine {
    type Media = SimMedia;

    fn load_source(&mut self, url: &Url) -> Result<()> {
        self.log.lock().unwrap().loads.push(url.clone());
        Ok(())
    }

    fn attach_media(&mut self, _media: &SimMedia) -> Result<()> {
        Ok(())
    }

    fn start_load(&mut self) {
        self.log.lock().unwrap().start_loads += 1;
    }

    fn recover_media_error(&mut self) -> Result<()> {
        self.log.lock().unwrap().recoveries += 1;
        Ok(())
    }

    fn destroy(&mut self) {
        self.log.lock().unwrap().destroys += 1;
    }
}

/// Records every engine it builds together with its event sink
#[derive(Clone, Default)]
pub struct SimFactory {
    pub created: Arc<Mutex<Vec<(StreamTarget, EventSink)>>>,
    pub log: Arc<Mutex<EngineLog>>,
}

impl SimFactory {
    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn sink(&self, index: usize) -> EventSink {
        self.created.lock().unwrap()[index].1.clone()
    }

    pub fn target(&self, index: usize) -> StreamTarget {
        self.created.lock().unwrap()[index].0.clone()
    }

    pub fn destroys(&self) -> u32 {
        self.log.lock().unwrap().destroys
    }
}

impl EngineFactory for SimFactory {
    type Engine = SimEngine;

    fn create(&mut self, target: &StreamTarget, sink: EventSink) -> Result<SimEngine> {
        self.created.lock().unwrap().push((target.clone(), sink));
        Ok(SimEngine::new(self.log.clone()))
    }
}

// =============================================================================
// Probe
// =============================================================================

/// Manifest becomes available on the `ready_on`-th check; optionally
/// reports a fixed set of publishing keys
pub struct SimProbe {
    pub ready_on: Option<u32>,
    pub publishing: Option<Vec<BroadcastKey>>,
    pub checks: AtomicU32,
    pub key_queries: AtomicU32,
}

impl SimProbe {
    pub fn ready_on(check: u32) -> Self {
        Self {
            ready_on: Some(check),
            publishing: None,
            checks: AtomicU32::new(0),
            key_queries: AtomicU32::new(0),
        }
    }

    pub fn never_ready() -> Self {
        Self {
            ready_on: None,
            publishing: None,
            checks: AtomicU32::new(0),
            key_queries: AtomicU32::new(0),
        }
    }

    pub fn publishing(mut self, keys: Vec<BroadcastKey>) -> Self {
        self.publishing = Some(keys);
        self
    }

    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamProbe for SimProbe {
    async fn manifest_available(&self, _url: &Url) -> bool {
        let check = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        self.ready_on.is_some_and(|ready| check >= ready)
    }

    async fn active_keys(&self) -> Result<Vec<BroadcastKey>> {
        self.key_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.publishing.clone().unwrap_or_default())
    }

    fn supports_key_query(&self) -> bool {
        self.publishing.is_some()
    }
}
