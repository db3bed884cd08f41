//! Stream readiness polling and key resynchronisation
//!
//! Runs when the manifest is missing: the broadcaster has not started yet,
//! or the viewer is attached to a stale key. Each attempt checks the
//! manifest's existence and, when the ingest server exposes its status,
//! which keys are actually publishing. A publishing key other than the
//! viewer's is authoritative and ends polling immediately.

use crate::{
    config::{PollConfig, StreamEndpoints},
    status::{self, resync_candidate},
    types::{BroadcastKey, PollProgress, StreamTarget},
    Error, Result,
};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Availability checks against the delivery and ingest servers
#[async_trait]
pub trait StreamProbe: Send + Sync {
    /// Cheap existence check for a manifest; any failure means "not ready"
    async fn manifest_available(&self, url: &Url) -> bool;

    /// Keys currently being published
    async fn active_keys(&self) -> Result<Vec<BroadcastKey>>;

    /// Whether [`StreamProbe::active_keys`] can be answered at all
    fn supports_key_query(&self) -> bool {
        true
    }
}

/// HTTP probe: `HEAD` on the manifest, `GET` on the ingest `stat` page
pub struct HttpProbe {
    client: Client,
    endpoints: StreamEndpoints,
}

impl HttpProbe {
    pub fn new(endpoints: StreamEndpoints) -> Result<Self> {
        let client = Client::builder()
            .timeout(endpoints.request_timeout())
            .build()?;
        Ok(Self::with_client(client, endpoints))
    }

    pub fn with_client(client: Client, endpoints: StreamEndpoints) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl StreamProbe for HttpProbe {
    #[instrument(skip(self))]
    async fn manifest_available(&self, url: &Url) -> bool {
        match self.client.head(url.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(status = status.as_u16(), "Manifest existence check");
                status.is_success()
            }
            Err(err) => {
                debug!(error = %err, "Manifest existence check failed");
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn active_keys(&self) -> Result<Vec<BroadcastKey>> {
        let url = self.endpoints.status_url.as_ref().ok_or(Error::StatusUnavailable)?;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        status::active_keys(&body, &self.endpoints.application)
    }

    fn supports_key_query(&self) -> bool {
        self.endpoints.status_url.is_some()
    }
}

/// How a polling run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The manifest now exists
    Ready,
    /// A different key is publishing; switch to it
    Resynced(BroadcastKey),
    /// The attempt budget ran out
    Exhausted,
}

/// Bounded readiness poller
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    config: PollConfig,
}

impl ReadinessPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Poll until the target is ready, a resync is detected, or the budget
    /// runs out. The first check is immediate.
    #[instrument(skip(self, probe, target, on_attempt), fields(target = %target))]
    pub async fn run<F>(&self, probe: &dyn StreamProbe, target: &StreamTarget, mut on_attempt: F) -> PollOutcome
    where
        F: FnMut(PollProgress) + Send,
    {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            on_attempt(PollProgress {
                attempt,
                max_attempts,
            });

            let (available, keys) = if probe.supports_key_query() {
                let (available, keys) =
                    tokio::join!(probe.manifest_available(&target.manifest_url), probe.active_keys());
                (available, Some(keys))
            } else {
                (probe.manifest_available(&target.manifest_url).await, None)
            };

            match keys {
                Some(Ok(keys)) => {
                    if let Some(key) = resync_candidate(&target.key, &keys) {
                        info!(attempt, from = %target.key, to = %key, "Active broadcast key differs, resyncing");
                        return PollOutcome::Resynced(key);
                    }
                }
                Some(Err(err)) => {
                    debug!(attempt, error = %err, "Active key query failed");
                }
                None => {}
            }

            if available {
                info!(attempt, "Stream is available");
                return PollOutcome::Ready;
            }

            debug!(attempt, max_attempts, "Stream not available yet");
            if attempt < max_attempts {
                tokio::time::sleep(self.config.interval()).await;
            }
        }

        warn!(max_attempts, "Stream did not become available");
        PollOutcome::Exhausted
    }
}
