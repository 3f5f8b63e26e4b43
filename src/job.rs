//! Job envelope boundary
//!
//! Translates a queue job into a synthesis request and the result back into
//! the values the queue expects. Panics raised while handling a job are
//! caught here and reported like any other failure.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures::{FutureExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::WorkerContext;
use crate::error::{GateError, GateResult};
use crate::proxy::SynthesisResult;
use crate::request::SynthesisRequest;

pub type JobChunkStream = Pin<Box<dyn Stream<Item = Value> + Send>>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub input: Value,
}

impl JobEnvelope {
    pub fn new(input: Value) -> Self {
        Self { id: None, input }
    }
}

pub enum JobOutput {
    /// `{audio_format, audio_base64}`
    Audio(Value),
    /// `{chunk_base64}` values; a failure part way ends with `{error}`
    Chunks(JobChunkStream),
    Failed(GateError),
}

impl JobOutput {
    /// Drain the output into the list of values the caller would see.
    pub async fn collect_values(self) -> Vec<Value> {
        match self {
            JobOutput::Audio(value) => vec![value],
            JobOutput::Chunks(chunks) => chunks.collect().await,
            JobOutput::Failed(e) => vec![e.to_json()],
        }
    }
}

impl std::fmt::Debug for JobOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobOutput::Audio(value) => f.debug_tuple("Audio").field(value).finish(),
            JobOutput::Chunks(_) => f.write_str("Chunks(..)"),
            JobOutput::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

pub async fn handle_job(ctx: &WorkerContext, job: &JobEnvelope) -> JobOutput {
    let job_id = job.id.as_deref().unwrap_or("-");
    let outcome = AssertUnwindSafe(run(ctx, &job.input)).catch_unwind().await;
    let result = outcome.unwrap_or_else(|panic| Err(GateError::Unexpected(panic_message(&panic))));

    match result {
        Ok(SynthesisResult::Buffered {
            format,
            audio_base64,
        }) => {
            log::info!("Job {} completed with {} audio", job_id, format);
            JobOutput::Audio(json!({
                "audio_format": format.as_str(),
                "audio_base64": audio_base64,
            }))
        }
        Ok(SynthesisResult::Streaming(chunks)) => {
            log::info!("Job {} streaming audio", job_id);
            JobOutput::Chunks(Box::pin(chunks.map(|chunk| match chunk {
                Ok(chunk_base64) => json!({ "chunk_base64": chunk_base64 }),
                Err(e) => e.to_json(),
            })))
        }
        Err(e) => {
            match &e {
                GateError::InvalidInput(_) => log::warn!("Job {} rejected: {}", job_id, e),
                GateError::Unexpected(_) => log::error!("Job {} crashed: {:?}", job_id, e),
                _ => log::error!("Job {} failed: {}", job_id, e),
            }
            JobOutput::Failed(e)
        }
    }
}

async fn run(ctx: &WorkerContext, input: &Value) -> GateResult<SynthesisResult> {
    let request = SynthesisRequest::from_payload(input)?;
    ctx.synthesize(&request).await
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
