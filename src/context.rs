use serde_json::json;

use crate::admission::AdmissionGate;
use crate::backend::{BackendConfig, BackendHandle, SPEECH_PATH};
use crate::error::{GateError, GateResult};
use crate::proxy::{self, SynthesisResult};
use crate::readiness::{ReadinessConfig, ReadinessGate};
use crate::request::SynthesisRequest;

/// Process-wide state shared by every request handler.
///
/// A context only exists once its backend has passed the readiness gate, so
/// holding one means the worker may serve jobs.
#[derive(Debug)]
pub struct WorkerContext {
    client: reqwest::Client,
    backend: BackendHandle,
    admission: AdmissionGate,
}

impl WorkerContext {
    /// Launch the backend and wait for it to become healthy.
    pub async fn start(
        backend_config: &BackendConfig,
        readiness: &ReadinessConfig,
    ) -> GateResult<Self> {
        let backend = backend_config.launch()?;
        Self::connect(backend, readiness).await
    }

    /// Wait for an existing backend to become healthy.
    ///
    /// On failure the handle is dropped, which kills a spawned backend.
    pub async fn connect(backend: BackendHandle, readiness: &ReadinessConfig) -> GateResult<Self> {
        // No overall timeout: synthesis may legitimately run for minutes
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GateError::Unexpected(format!("failed to build HTTP client: {}", e)))?;

        ReadinessGate::new(readiness.clone())
            .wait(&client, &backend)
            .await?;

        Ok(Self {
            client,
            backend,
            admission: AdmissionGate::new(),
        })
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    pub fn admission(&self) -> &AdmissionGate {
        &self.admission
    }

    /// Run one synthesis against the backend while holding the slot.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> GateResult<SynthesisResult> {
        let permit = self.admission.acquire().await?;
        log::debug!(
            "Synthesizing {} chars as {} with voice {}",
            request.text.chars().count(),
            request.response_format,
            request.voice
        );
        proxy::forward(
            &self.client,
            &self.backend.endpoint(SPEECH_PATH),
            request,
            permit,
        )
        .await
    }

    pub fn status(&self) -> serde_json::Value {
        let stats = self.admission.stats();
        json!({
            "backend_url": self.backend.base_url(),
            "backend": self.backend.liveness(),
            "in_flight": stats.in_flight,
            "waiting": stats.waiting,
            "acquired": stats.acquired,
            "released": stats.released,
        })
    }

    /// Stop the backend. Called once the server has shut down.
    pub async fn shutdown(self) {
        self.backend.shutdown().await;
    }
}
