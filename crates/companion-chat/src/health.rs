//! Cached reachability probe of the generation backend.
//!
//! The learning-model status is read on demand and never cached.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use companion_core::config::BackendConfig;

pub const ONLINE_MESSAGE: &str = "Knowledge base connected";
pub const OFFLINE_MESSAGE: &str = "Knowledge base unavailable";

/// Upper bound on a learning-model status request.
pub const LEARNING_STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Reachability of the backend as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub online: bool,
    pub message: String,
}

impl BackendStatus {
    pub fn online() -> Self {
        Self {
            online: true,
            message: ONLINE_MESSAGE.to_string(),
        }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            message: OFFLINE_MESSAGE.to_string(),
        }
    }
}

/// Observation counters of the learning model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    #[serde(default)]
    pub observation_count: u64,
    #[serde(default)]
    pub learning_rate: f64,
}

/// Readiness of the learning model. The default is "not ready, nothing
/// observed" and stands in for any failed request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStatus {
    pub ready: bool,
    pub learning: LearningStats,
}

/// Status body as sent by the backend; either field may be missing or null.
#[derive(Deserialize)]
struct LearningStatusBody {
    #[serde(default)]
    ready: Option<bool>,
    #[serde(default)]
    learning: Option<LearningStats>,
}

impl From<LearningStatusBody> for LearningStatus {
    fn from(body: LearningStatusBody) -> Self {
        Self {
            ready: body.ready.unwrap_or(false),
            learning: body.learning.unwrap_or_default(),
        }
    }
}

/// GET on the backend base URL with a short timeout, cached for `ttl`.
///
/// Concurrent callers share a single in-progress probe.
pub struct HealthProbe {
    client: reqwest::Client,
    url: String,
    learning_url: String,
    ttl: Duration,
    cached: Mutex<Option<(BackendStatus, Instant)>>,
}

impl std::fmt::Debug for HealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProbe")
            .field("url", &self.url)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl HealthProbe {
    pub fn new(base_url: &str, timeout: Duration, ttl: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        let base = base_url.trim_end_matches('/');
        Self {
            client,
            url: format!("{}/", base),
            learning_url: format!("{}/nyptho/status", base),
            ttl,
            cached: Mutex::new(None),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(
            &config.base_url,
            config.health_timeout(),
            config.health_cache_ttl(),
        )
    }

    /// Current status, probing only when the cached result has expired.
    pub async fn status(&self) -> BackendStatus {
        let mut cached = self.cached.lock().await;
        if let Some((status, at)) = cached.as_ref() {
            if at.elapsed() < self.ttl {
                return status.clone();
            }
        }
        let status = self.probe().await;
        *cached = Some((status.clone(), Instant::now()));
        status
    }

    pub async fn is_available(&self) -> bool {
        self.status().await.online
    }

    /// Drop the cached result so the next call probes again.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Ask the backend how far the learning model has got. Not cached.
    pub async fn learning_status(&self) -> LearningStatus {
        let resp = match self
            .client
            .get(&self.learning_url)
            .timeout(LEARNING_STATUS_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(status = resp.status().as_u16(), "Learning status unavailable");
                return LearningStatus::default();
            }
            Err(e) => {
                debug!(error = %e, "Learning status request failed");
                return LearningStatus::default();
            }
        };
        match resp.json::<LearningStatusBody>().await {
            Ok(body) => body.into(),
            Err(e) => {
                debug!(error = %e, "Learning status body was malformed");
                LearningStatus::default()
            }
        }
    }

    async fn probe(&self) -> BackendStatus {
        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(url = %self.url, "Backend probe succeeded");
                BackendStatus::online()
            }
            Ok(resp) => {
                debug!(url = %self.url, status = resp.status().as_u16(), "Backend probe unhealthy");
                BackendStatus::offline()
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Backend probe failed");
                BackendStatus::offline()
            }
        }
    }
}
