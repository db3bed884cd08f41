//! Controller and endpoint configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Tuning for the playback controller and readiness poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Buffer sampler period in milliseconds
    pub sample_interval_ms: u64,
    /// Consecutive sampler ticks a healthy stream may spend below the
    /// resume threshold before being paused
    pub max_grace_ticks: u32,
    /// Throughput ratio at or above which the network is keeping up
    pub healthy_throughput_ratio: f64,
    /// Fatal network errors tolerated before the category is terminal
    pub network_retry_limit: u32,
    /// In-engine media error recoveries attempted before reloading
    pub media_recovery_attempts: u32,
    /// Backoff unit for manifest/level timeouts (multiplied by attempt)
    pub manifest_retry_backoff_ms: u64,
    /// Backoff unit for other network errors (multiplied by attempt)
    pub network_retry_backoff_ms: u64,
    /// Target segment duration assumed before the first playlist load
    pub default_target_duration: f64,
    /// Playlist length, in segments, assumed before the first playlist load
    pub default_playlist_segments: f64,
    /// Stream readiness polling
    pub poll: PollConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 500,
            max_grace_ticks: 4,
            healthy_throughput_ratio: 0.9,
            network_retry_limit: 3,
            media_recovery_attempts: 1,
            manifest_retry_backoff_ms: 3000,
            network_retry_backoff_ms: 2000,
            default_target_duration: 2.0,
            default_playlist_segments: 4.0,
            poll: PollConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Shorter grace and faster retries, for sub-second segment cadences
    pub fn low_latency() -> Self {
        Self {
            max_grace_ticks: 2,
            manifest_retry_backoff_ms: 1500,
            network_retry_backoff_ms: 1000,
            default_target_duration: 1.0,
            ..Default::default()
        }
    }

    /// More patience everywhere, for viewers on poor connections
    pub fn conservative() -> Self {
        Self {
            max_grace_ticks: 6,
            network_retry_limit: 4,
            default_target_duration: 4.0,
            poll: PollConfig {
                interval_ms: 5000,
                max_attempts: 12,
            },
            ..Default::default()
        }
    }

    /// Load a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            return Err(Error::InvalidConfig("sample_interval_ms must be > 0".into()));
        }
        if self.network_retry_limit == 0 {
            return Err(Error::InvalidConfig("network_retry_limit must be > 0".into()));
        }
        if !(self.default_target_duration.is_finite() && self.default_target_duration > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "default_target_duration must be positive, got {}",
                self.default_target_duration
            )));
        }
        if !(self.default_playlist_segments >= 1.0) {
            return Err(Error::InvalidConfig(
                "default_playlist_segments must be at least 1".into(),
            ));
        }
        if !(self.healthy_throughput_ratio > 0.0) {
            return Err(Error::InvalidConfig(
                "healthy_throughput_ratio must be positive".into(),
            ));
        }
        self.poll.validate()
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Number of sampler ticks covering `delay`, at least one
    pub fn ticks_for(&self, delay: Duration) -> u32 {
        let interval = self.sample_interval_ms.max(1) as u128;
        let ticks = delay.as_millis().div_ceil(interval);
        ticks.clamp(1, u32::MAX as u128) as u32
    }
}

/// Readiness poll cadence and budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between existence checks in milliseconds
    pub interval_ms: u64,
    /// Existence checks before giving up
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            max_attempts: 10,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 || self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "poll interval and attempts must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Where streams are published and where the ingest server reports status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamEndpoints {
    /// Base URL the segmenter publishes playlists under
    pub hls_base_url: Url,
    /// Ingest server statistics endpoint (nginx-rtmp `stat` XML)
    pub status_url: Option<Url>,
    /// Ingest application whose streams are considered
    pub application: String,
    /// Playlist file extension
    pub playlist_extension: String,
    /// Timeout for probe requests in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for StreamEndpoints {
    fn default() -> Self {
        Self {
            hls_base_url: Url::parse("http://localhost:8080/hls/").expect("static URL is valid"),
            status_url: None,
            application: "live".to_string(),
            playlist_extension: "m3u8".to_string(),
            request_timeout_ms: 5000,
        }
    }
}

impl StreamEndpoints {
    pub fn new(hls_base_url: Url) -> Self {
        Self {
            hls_base_url,
            ..Default::default()
        }
    }

    pub fn with_status_url(mut self, status_url: Url) -> Self {
        self.status_url = Some(status_url);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
