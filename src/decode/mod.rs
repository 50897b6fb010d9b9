//! CPU-bound body decoding, run off the I/O scheduler.
//!
//! [`DecoderPool::decode`] moves the parse onto tokio's blocking thread pool
//! so a multi-hundred-megabyte JSON document cannot delay readiness checks
//! for other in-flight fetches. A small permit pool caps how many parses run
//! at once, independently of the network concurrency gate.
//!
//! What "decode" means depends on the response's [`ContentKind`]:
//!
//! | Content type | Stored `content` |
//! |--------------|------------------|
//! | `application/json`, `*/*+json`, absent | parsed JSON value |
//! | `text/*`, XML, JavaScript | string (lossy UTF-8) |
//! | anything else | base64 string |
//!
//! An empty body decodes to `null` regardless of kind.

use std::fs::File;
use std::io::{BufReader, Read};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::fetch::{FetchError, SpillFile};

/// Read buffer used when parsing JSON straight from a spill file.
const SPILL_READ_BUFFER: usize = 64 * 1024;

/// How a response body should be turned into a JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Parse as a JSON document.
    Json,
    /// Keep as text.
    Text,
    /// Keep as base64-encoded bytes.
    Binary,
}

impl ContentKind {
    /// Classifies a `Content-Type` header value.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(raw) = content_type else {
            return Self::Json;
        };
        let essence = raw
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence.is_empty() || essence == "application/json" || essence.ends_with("+json") {
            Self::Json
        } else if essence.starts_with("text/")
            || essence == "application/xml"
            || essence.ends_with("+xml")
            || essence == "application/javascript"
        {
            Self::Text
        } else {
            Self::Binary
        }
    }
}

/// Body handed to the decoder: in memory, or spilled to disk.
#[derive(Debug)]
pub enum DecodeInput {
    /// Whole body held in memory.
    Buffer(Bytes),
    /// Body spilled to a temp file; the file is removed once decoded.
    Spill(SpillFile),
}

/// Bounded offload of decode work to the blocking thread pool.
#[derive(Debug, Clone)]
pub struct DecoderPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl DecoderPool {
    /// Creates a pool allowing `workers` concurrent decodes (at least 1).
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Maximum concurrent decodes.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Decodes `input` on a blocking thread.
    ///
    /// A spill file is removed after decoding whether or not it succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Decode`] for malformed payloads or a panicked
    /// decode task, and [`FetchError::Spill`] if the spill file cannot be read.
    #[instrument(level = "debug", skip(self, input), fields(url = %url))]
    pub async fn decode(
        &self,
        url: &str,
        input: DecodeInput,
        kind: ContentKind,
    ) -> Result<Value, FetchError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::decode(url, "decoder pool closed"))?;

        let task_url = url.to_string();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            decode_blocking(&task_url, input, kind)
        })
        .await
        .map_err(|e| FetchError::decode(url, format!("decode task failed: {e}")))?
    }
}

fn decode_blocking(url: &str, input: DecodeInput, kind: ContentKind) -> Result<Value, FetchError> {
    match input {
        DecodeInput::Buffer(bytes) => {
            debug!(bytes = bytes.len(), "decoding in-memory body");
            decode_bytes(url, &bytes, kind)
        }
        DecodeInput::Spill(spill) => {
            debug!(path = %spill.path().display(), bytes = spill.len(), "decoding spilled body");
            let result = decode_spill(url, &spill, kind);
            spill.remove();
            result
        }
    }
}

fn decode_bytes(url: &str, bytes: &[u8], kind: ContentKind) -> Result<Value, FetchError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    match kind {
        ContentKind::Json => serde_json::from_slice(bytes).map_err(|e| FetchError::decode(url, e)),
        ContentKind::Text => Ok(Value::String(String::from_utf8_lossy(bytes).into_owned())),
        ContentKind::Binary => Ok(Value::String(STANDARD.encode(bytes))),
    }
}

fn decode_spill(url: &str, spill: &SpillFile, kind: ContentKind) -> Result<Value, FetchError> {
    if spill.is_empty() {
        return Ok(Value::Null);
    }
    let file = File::open(spill.path()).map_err(|e| FetchError::spill(spill.path(), e))?;
    match kind {
        ContentKind::Json => {
            let reader = BufReader::with_capacity(SPILL_READ_BUFFER, file);
            serde_json::from_reader(reader).map_err(|e| FetchError::decode(url, e))
        }
        ContentKind::Text | ContentKind::Binary => {
            let mut raw = Vec::with_capacity(usize::try_from(spill.len()).unwrap_or(0));
            BufReader::with_capacity(SPILL_READ_BUFFER, file)
                .read_to_end(&mut raw)
                .map_err(|e| FetchError::spill(spill.path(), e))?;
            decode_bytes(url, &raw, kind)
        }
    }
}
