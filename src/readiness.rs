use std::time::Duration;

use reqwest::Client;

use crate::backend::{BackendHandle, BackendLiveness, HEALTH_PATH};
use crate::error::{GateError, GateResult};

pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_HEALTH_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Bounded polling schedule for the backend health check.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Pause between failed attempts
    pub interval: Duration,
    /// Attempts before startup is abandoned
    pub max_attempts: u32,
    /// Per-attempt request timeout
    pub attempt_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEALTH_INTERVAL,
            max_attempts: DEFAULT_HEALTH_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }
}

/// Blocks startup until the backend answers its health check.
///
/// The gate is one-shot: once it opens it is never re-checked.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    config: ReadinessConfig,
}

impl ReadinessGate {
    pub fn new(config: ReadinessConfig) -> Self {
        Self { config }
    }

    /// Poll until healthy. Returns the 1-based attempt that succeeded.
    pub async fn wait(&self, client: &Client, backend: &BackendHandle) -> GateResult<u32> {
        let url = backend.endpoint(HEALTH_PATH);
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            match self.probe(client, &url).await {
                Ok(()) => {
                    log::info!("Backend is healthy after {} attempt(s)", attempt);
                    return Ok(attempt);
                }
                Err(reason) => {
                    log::info!(
                        "Backend not ready ({}/{}): {}",
                        attempt,
                        max_attempts,
                        reason
                    );
                }
            }

            if let BackendLiveness::Exited { code } = backend.liveness() {
                log::error!("Backend exited with code {:?} before becoming healthy", code);
                return Err(GateError::BackendNotReady {
                    url: backend.base_url().to_string(),
                    attempts: attempt,
                });
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        log::error!(
            "Backend at {} did not become healthy after {} attempts",
            backend.base_url(),
            max_attempts
        );
        Err(GateError::BackendNotReady {
            url: backend.base_url().to_string(),
            attempts: max_attempts,
        })
    }

    async fn probe(&self, client: &Client, url: &str) -> Result<(), String> {
        let res = client
            .get(url)
            .timeout(self.config.attempt_timeout)
            .send()
            .await
            .map_err(|e| format!("not reachable yet ({})", e))?;
        if res.status().is_success() {
            Ok(())
        } else {
            Err(format!("health check is pending with status {}", res.status()))
        }
    }
}
