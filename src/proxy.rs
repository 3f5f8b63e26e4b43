//! Relay of synthesis calls to the backend
//!
//! `wav` responses are read to the end and returned as one base64 buffer.
//! `ogg` responses become an [`AudioChunkStream`] that owns the admission
//! permit: the slot is released when the body ends, when a read fails, or
//! when the stream is dropped part way.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use reqwest::Client;

use crate::admission::AdmissionPermit;
use crate::error::{GateError, GateResult};
use crate::request::{AudioFormat, SynthesisRequest};

/// Upper bound on the raw size of one relayed chunk.
pub const STREAM_CHUNK_SIZE: usize = 4096;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>;

#[derive(Debug)]
pub enum SynthesisResult {
    Buffered {
        format: AudioFormat,
        audio_base64: String,
    },
    Streaming(AudioChunkStream),
}

/// Send one request to the speech endpoint. No retries.
pub async fn forward(
    client: &Client,
    url: &str,
    request: &SynthesisRequest,
    permit: AdmissionPermit,
) -> GateResult<SynthesisResult> {
    let res = client
        .post(url)
        .json(request)
        .send()
        .await
        .map_err(|e| GateError::BackendUnavailable(e.to_string()))?;

    let status = res.status();
    if !status.is_success() {
        let body = match res.text().await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Failed to read backend error body: {}", e);
                String::new()
            }
        };
        log::warn!("Backend rejected synthesis with status {}: {}", status, body);
        return Err(GateError::BackendError {
            status: status.as_u16(),
            body,
        });
    }

    if request.response_format.is_streaming() {
        return Ok(SynthesisResult::Streaming(AudioChunkStream::new(
            res.bytes_stream(),
            permit,
        )));
    }

    let audio = res
        .bytes()
        .await
        .map_err(|e| GateError::BackendUnavailable(e.to_string()))?;
    drop(permit);
    log::debug!("Relaying {} bytes of {} audio", audio.len(), request.response_format);
    Ok(SynthesisResult::Buffered {
        format: request.response_format,
        audio_base64: STANDARD.encode(&audio),
    })
}

/// Base64 chunks of a backend body, read lazily.
///
/// Frames larger than [`STREAM_CHUNK_SIZE`] are split, empty frames are
/// skipped. After the body ends or fails the stream yields `None` forever.
pub struct AudioChunkStream {
    body: ByteStream,
    pending: Bytes,
    permit: Option<AdmissionPermit>,
}

impl AudioChunkStream {
    pub fn new<S, E>(body: S, permit: AdmissionPermit) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display,
    {
        Self {
            body: Box::pin(body.map(|frame| frame.map_err(|e| e.to_string()))),
            pending: Bytes::new(),
            permit: Some(permit),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.permit.is_none()
    }

    // Drops the backend connection before handing the slot back.
    fn finish(&mut self) {
        self.body = Box::pin(stream::empty());
        self.pending.clear();
        if self.permit.take().is_some() {
            log::debug!("Audio stream finished");
        }
    }
}

impl Stream for AudioChunkStream {
    type Item = GateResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if !this.pending.is_empty() {
                let len = this.pending.len().min(STREAM_CHUNK_SIZE);
                let chunk = this.pending.split_to(len);
                return Poll::Ready(Some(Ok(STANDARD.encode(&chunk))));
            }
            if this.is_finished() {
                return Poll::Ready(None);
            }
            match ready!(this.body.as_mut().poll_next(cx)) {
                Some(Ok(frame)) => this.pending = frame,
                Some(Err(e)) => {
                    log::warn!("Backend stream failed: {}", e);
                    this.finish();
                    return Poll::Ready(Some(Err(GateError::StreamError(e))));
                }
                None => {
                    this.finish();
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl fmt::Debug for AudioChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioChunkStream")
            .field("pending", &self.pending.len())
            .field("finished", &self.is_finished())
            .finish()
    }
}
