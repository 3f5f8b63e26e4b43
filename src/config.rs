use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

use crate::backend::{
    BackendConfig, DEFAULT_BACKEND_PORT, DEFAULT_BACKEND_PROGRAM, DEFAULT_VOICE_DIR,
};
use crate::readiness::ReadinessConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid log level `{0}`")]
    InvalidLogLevel(String),
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
    #[error("voice directory must not be empty")]
    EmptyVoiceDir,
    #[error("backend url `{0}` must start with http:// or https://")]
    InvalidBackendUrl(String),
}

#[derive(Parser, Debug)]
#[command(name = "tts-gate")]
#[command(about = "Serializes text-to-speech jobs onto a single local GPU backend")]
pub struct WorkerArgs {
    /// Host address to bind the job endpoint
    #[arg(long, env = "TTS_GATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port number to bind the job endpoint
    #[arg(long, env = "TTS_GATE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Backend executable
    #[arg(long, env = "FISH_BIN", default_value = DEFAULT_BACKEND_PROGRAM)]
    pub backend_program: String,

    /// Port the backend is told to listen on
    #[arg(long, env = "FISH_PORT", default_value_t = DEFAULT_BACKEND_PORT)]
    pub backend_port: u16,

    /// Reference voice directory handed to the backend
    #[arg(long, env = "VOICE_DIR", default_value = DEFAULT_VOICE_DIR)]
    pub voice_dir: PathBuf,

    /// Model checkpoint directory handed to the backend
    #[arg(long, env = "CHECKPOINT_DIR")]
    pub checkpoint_dir: Option<PathBuf>,

    /// Proxy to an already running backend instead of spawning one
    #[arg(long, env = "FISH_URL")]
    pub backend_url: Option<String>,

    /// Milliseconds between backend health checks during startup
    #[arg(long, default_value_t = 1000)]
    pub health_interval_ms: u64,

    /// Health checks before startup is abandoned
    #[arg(long, default_value_t = 60)]
    pub health_max_attempts: u32,

    /// Timeout of a single health check in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub health_timeout_ms: u64,

    /// Maximum job envelope size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    pub max_payload_size: usize,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Immutable worker configuration, fixed at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
    pub max_payload_size: usize,
    pub log_level: LevelFilter,
    pub backend: BackendConfig,
    pub readiness: ReadinessConfig,
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.readiness.max_attempts == 0 {
            return Err(ConfigError::MustBePositive("health_max_attempts"));
        }
        if self.readiness.attempt_timeout.is_zero() {
            return Err(ConfigError::MustBePositive("health_timeout_ms"));
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::MustBePositive("max_payload_size"));
        }
        if self.backend.external_url.is_none() {
            if self.backend.voice_dir.as_os_str().is_empty() {
                return Err(ConfigError::EmptyVoiceDir);
            }
            if self.backend.port == 0 {
                return Err(ConfigError::MustBePositive("backend_port"));
            }
        }
        if let Some(url) = &self.backend.external_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidBackendUrl(url.clone()));
            }
        }
        Ok(())
    }
}

impl TryFrom<WorkerArgs> for WorkerConfig {
    type Error = ConfigError;

    fn try_from(args: WorkerArgs) -> Result<Self, Self::Error> {
        let log_level = args
            .log_level
            .parse::<LevelFilter>()
            .map_err(|_| ConfigError::InvalidLogLevel(args.log_level.clone()))?;

        let config = WorkerConfig {
            host: args.host,
            port: args.port,
            max_payload_size: args.max_payload_size,
            log_level,
            backend: BackendConfig {
                program: args.backend_program,
                port: args.backend_port,
                voice_dir: args.voice_dir,
                checkpoint_dir: args.checkpoint_dir,
                external_url: args.backend_url,
            },
            readiness: ReadinessConfig {
                interval: Duration::from_millis(args.health_interval_ms),
                max_attempts: args.health_max_attempts,
                attempt_timeout: Duration::from_millis(args.health_timeout_ms),
            },
        };
        config.validate()?;
        Ok(config)
    }
}
