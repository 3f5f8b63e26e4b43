//! Subordinate inference process
//!
//! The worker owns exactly one backend for its whole lifetime. The child is
//! spawned with `kill_on_drop`, so dropping the [`BackendHandle`] never leaves
//! an orphaned GPU process behind.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::process::{Child, Command};

use crate::error::{GateError, GateResult};

pub const DEFAULT_BACKEND_PROGRAM: &str = "fish-speech";
pub const DEFAULT_BACKEND_PORT: u16 = 3000;
pub const DEFAULT_VOICE_DIR: &str = "/app/voices";

pub const HEALTH_PATH: &str = "/health";
pub const SPEECH_PATH: &str = "/v1/audio/speech";

#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Executable started as the inference server
    pub program: String,
    /// Port the backend listens on (loopback only)
    pub port: u16,
    /// Directory holding reference voices
    pub voice_dir: PathBuf,
    /// Model checkpoint directory, passed through when set
    pub checkpoint_dir: Option<PathBuf>,
    /// Use an already running backend instead of spawning one
    pub external_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_BACKEND_PROGRAM.to_string(),
            port: DEFAULT_BACKEND_PORT,
            voice_dir: PathBuf::from(DEFAULT_VOICE_DIR),
            checkpoint_dir: None,
            external_url: None,
        }
    }
}

impl BackendConfig {
    pub fn base_url(&self) -> String {
        match &self.external_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://127.0.0.1:{}", self.port),
        }
    }

    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            "--port".to_string(),
            self.port.to_string(),
            "--voice-dir".to_string(),
            self.voice_dir.display().to_string(),
        ];
        if let Some(checkpoint_dir) = &self.checkpoint_dir {
            args.push("--checkpoint-dir".to_string());
            args.push(checkpoint_dir.display().to_string());
        }
        args
    }

    /// Start the backend, or attach to the external one when configured.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(&self) -> GateResult<BackendHandle> {
        if let Some(url) = &self.external_url {
            log::info!("Using external backend at {}", url);
            return Ok(BackendHandle::external(url));
        }

        let args = self.command_args();
        log::info!("Starting backend: {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GateError::SpawnFailed {
                program: self.program.clone(),
                source,
            })?;

        log::info!(
            "Backend started with pid {}",
            child.id().map(|pid| pid.to_string()).unwrap_or_default()
        );

        Ok(BackendHandle {
            base_url: self.base_url(),
            process: Some(Mutex::new(child)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BackendLiveness {
    /// Backend is managed outside this worker
    External,
    Running { pid: Option<u32> },
    Exited { code: Option<i32> },
}

impl BackendLiveness {
    pub fn is_alive(&self) -> bool {
        !matches!(self, BackendLiveness::Exited { .. })
    }
}

/// The worker's one backend: where to reach it and, when spawned here, the
/// process itself.
#[derive(Debug)]
pub struct BackendHandle {
    base_url: String,
    process: Option<Mutex<Child>>,
}

impl BackendHandle {
    pub fn external(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            process: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, api_path: &str) -> String {
        if api_path.starts_with('/') {
            format!("{}{}", self.base_url, api_path)
        } else {
            format!("{}/{}", self.base_url, api_path)
        }
    }

    /// Non-blocking check of the child process.
    pub fn liveness(&self) -> BackendLiveness {
        let Some(process) = &self.process else {
            return BackendLiveness::External;
        };
        let mut child = process.lock().unwrap_or_else(PoisonError::into_inner);
        match child.try_wait() {
            Ok(Some(status)) => BackendLiveness::Exited {
                code: status.code(),
            },
            Ok(None) => BackendLiveness::Running { pid: child.id() },
            Err(e) => {
                log::warn!("Failed to poll backend process: {}", e);
                BackendLiveness::Running { pid: child.id() }
            }
        }
    }

    /// Kill the backend and wait for it to exit.
    pub async fn shutdown(self) {
        let Some(process) = self.process else {
            return;
        };
        let mut child = process.into_inner().unwrap_or_else(PoisonError::into_inner);
        match child.kill().await {
            Ok(()) => log::info!("Backend stopped"),
            Err(e) => log::warn!("Failed to stop backend: {}", e),
        }
    }
}
