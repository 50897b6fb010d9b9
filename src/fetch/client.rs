//! HTTP client seam for issuing GET requests.
//!
//! The pipeline only needs "issue GET, get back status, headers and a byte
//! stream". That capability is the [`HttpFetch`] trait, so the orchestrator
//! can be driven by [`HttpClient`] (reqwest, connection-pooled) in production
//! and by instrumented doubles in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::{debug, instrument};
use url::Url;

use super::FetchError;
use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Boxed stream of body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Capability to issue a GET request.
///
/// Implementations must be safe to share across all workers of a run.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Sends a GET request and returns once the response head has arrived.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] for unusable URLs and
    /// [`FetchError::Transport`] / [`FetchError::Timeout`] for connection failures.
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// Response head plus a not-yet-consumed body.
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Declared `Content-Length`, when present and parseable.
    pub content_length: Option<u64>,
    /// Raw `Content-Type` header value, when present.
    pub content_type: Option<String>,
    /// The response body.
    pub body: ResponseBody,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Response body supporting both whole-body and chunk-by-chunk reads.
pub struct ResponseBody {
    stream: BodyStream,
}

impl ResponseBody {
    /// Wraps an arbitrary chunk stream.
    #[must_use]
    pub fn new(stream: BodyStream) -> Self {
        Self { stream }
    }

    /// A body consisting of a single in-memory chunk.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let chunk: Result<Bytes, FetchError> = Ok(bytes.into());
        Self::new(stream::iter([chunk]).boxed())
    }

    /// A body replaying the given chunks, errors included.
    #[must_use]
    pub fn from_chunks(chunks: Vec<Result<Bytes, FetchError>>) -> Self {
        Self::new(stream::iter(chunks).boxed())
    }

    /// Returns the next chunk, or `None` at end of body.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, FetchError>> {
        self.stream.next().await
    }

    /// Reads the remaining body into memory.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by the underlying stream.
    pub async fn read_all(mut self) -> Result<Bytes, FetchError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

/// reqwest-backed [`HttpFetch`] implementation.
///
/// Create once per run and share: clones reuse the same connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client from pipeline configuration.
    ///
    /// The reqwest total timeout is set to the per-attempt timeout so a stuck
    /// connection is torn down even outside the worker's own deadline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ClientBuild`] if reqwest rejects the settings.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(default_user_agent);
        Self::with_settings(config.connect_timeout(), config.request_timeout(), &user_agent)
            .map_err(|source| PipelineError::ClientBuild { source })
    }

    /// Builds a client with explicit timeouts and User-Agent.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error.
    pub fn with_settings(
        connect_timeout: Duration,
        total_timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(total_timeout)
            .gzip(true)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for HttpClient {
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let parsed = parse_http_url(url)?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let status = response.status().as_u16();
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        debug!(status, ?content_length, ?content_type, "response head received");

        let body_url = url.to_string();
        let stream = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| {
                    if e.is_timeout() {
                        FetchError::timeout(body_url.as_str())
                    } else {
                        FetchError::body(body_url.as_str(), e)
                    }
                })
            })
            .boxed();

        Ok(FetchResponse {
            status,
            content_length,
            content_type,
            body: ResponseBody::new(stream),
        })
    }
}

/// Parses `raw` and accepts only `http`/`https` URLs.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] otherwise.
pub fn parse_http_url(raw: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(raw).map_err(|_| FetchError::invalid_url(raw))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(FetchError::invalid_url(raw)),
    }
}

fn default_user_agent() -> String {
    format!("fetchline/{}", env!("CARGO_PKG_VERSION"))
}
