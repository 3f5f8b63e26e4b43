#![allow(dead_code)]

pub mod mock_backend;

use std::time::Duration;

use tts_gate::WorkerContext;
use tts_gate::backend::BackendHandle;
use tts_gate::readiness::ReadinessConfig;

pub fn fast_readiness(max_attempts: u32) -> ReadinessConfig {
    ReadinessConfig {
        interval: Duration::from_millis(10),
        max_attempts,
        attempt_timeout: Duration::from_millis(500),
    }
}

/// Context wired to a running mock backend.
pub async fn ready_context(backend: &mock_backend::MockBackend) -> WorkerContext {
    WorkerContext::connect(BackendHandle::external(&backend.url), &fast_readiness(10))
        .await
        .expect("mock backend should pass the readiness gate")
}
