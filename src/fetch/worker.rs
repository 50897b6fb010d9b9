//! Per-URL worker: the attempt loop that ends in exactly one output record.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{
    ConcurrencyGate, FetchError, FetchResponse, HttpFetch, ResponseBody, RetryDecision,
    RetryPolicy, SpillFile, SpillWriter,
};
use crate::config::PipelineConfig;
use crate::decode::{ContentKind, DecodeInput, DecoderPool};
use crate::error::PipelineError;
use crate::output::{FetchOutcome, OutputLog};
use crate::pipeline::RunStats;

/// Shared state every worker of a run reads from.
///
/// One instance is built per run and shared behind an `Arc`; nothing in it
/// is mutated except through the internally synchronized gate, decoder pool,
/// output log and counters.
pub(crate) struct WorkerContext {
    client: Arc<dyn HttpFetch>,
    gate: ConcurrencyGate,
    retry_policy: RetryPolicy,
    decoder: DecoderPool,
    output: Arc<OutputLog>,
    stats: Arc<RunStats>,
    request_timeout: Duration,
    stream_threshold: u64,
    chunk_size: u64,
    spill_dir: Option<PathBuf>,
}

/// A received response, ready for decoding.
struct Received {
    status: u16,
    kind: ContentKind,
    input: DecodeInput,
}

impl WorkerContext {
    pub(crate) fn new(
        config: &PipelineConfig,
        client: Arc<dyn HttpFetch>,
        output: Arc<OutputLog>,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            client,
            gate: ConcurrencyGate::new(config.max_concurrent),
            retry_policy: config.retry_policy(),
            decoder: DecoderPool::new(config.decode_workers()),
            output,
            stats,
            request_timeout: config.request_timeout(),
            stream_threshold: config.stream_threshold_bytes,
            chunk_size: config.chunk_size(),
            spill_dir: config.spill_dir.clone(),
        }
    }

    /// The gate shared by this run's workers.
    pub(crate) fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Fetches `url` until it succeeds or runs out of attempts, then appends
    /// its single record.
    ///
    /// # Errors
    ///
    /// Only output-log failures are returned; fetch failures become records.
    pub(crate) async fn process(&self, url: String) -> Result<(), PipelineError> {
        let outcome = self.fetch_with_retry(&url).await;
        self.output.append(&outcome).await?;
        if outcome.is_success() {
            self.stats.increment_succeeded();
        } else {
            self.stats.increment_failed();
        }
        Ok(())
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_with_retry(&self, url: &str) -> FetchOutcome {
        let mut attempt = 1u32;

        loop {
            debug!(attempt, "attempting fetch");

            match self.attempt(url).await {
                Ok((status, content)) => {
                    info!(status, attempt, "fetch completed");
                    return FetchOutcome::success(url, status, content);
                }
                Err(e) => match self.retry_policy.should_retry(&e, attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        info!(
                            attempt = next_attempt,
                            max_attempts = self.retry_policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "retrying fetch"
                        );
                        self.stats.increment_retried();
                        tokio::time::sleep(delay).await;
                        attempt = next_attempt;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        warn!(error = %e, attempts = attempt, %reason, "fetch failed");
                        return FetchOutcome::failure(url, &e);
                    }
                },
            }
        }
    }

    /// One attempt: gated network phase under the timeout, then decode.
    async fn attempt(&self, url: &str) -> Result<(u16, Value), FetchError> {
        let received = {
            let _permit = self.gate.acquire().await?;
            tokio::time::timeout(self.request_timeout, self.receive(url))
                .await
                .map_err(|_| FetchError::timeout(url))??
        };

        let content = self
            .decoder
            .decode(url, received.input, received.kind)
            .await?;
        Ok((received.status, content))
    }

    async fn receive(&self, url: &str) -> Result<Received, FetchError> {
        let FetchResponse {
            status,
            content_length,
            content_type,
            body,
        } = self.client.get(url).await?;
        let kind = ContentKind::from_content_type(content_type.as_deref());

        let input = match content_length {
            Some(declared) if declared > self.stream_threshold => {
                debug!(declared, threshold = self.stream_threshold, "spilling large body");
                let writer = self.spill_writer()?;
                DecodeInput::Spill(self.stream_to_spill(writer, body).await?)
            }
            Some(_) => DecodeInput::Buffer(body.read_all().await?),
            None => self.buffer_or_spill(body).await?,
        };

        Ok(Received {
            status,
            kind,
            input,
        })
    }

    /// Buffers a body of unknown length, moving to a spill file once the
    /// buffer grows past the threshold.
    async fn buffer_or_spill(&self, mut body: ResponseBody) -> Result<DecodeInput, FetchError> {
        let mut buffer = BytesMut::new();

        while let Some(chunk) = body.next_chunk().await {
            buffer.extend_from_slice(&chunk?);

            if buffer.len() as u64 > self.stream_threshold {
                debug!(
                    buffered = buffer.len(),
                    threshold = self.stream_threshold,
                    "undeclared body crossed threshold, spilling"
                );
                let mut writer = self.spill_writer()?;
                writer.write(&buffer).await?;
                drop(buffer);
                return Ok(DecodeInput::Spill(self.stream_to_spill(writer, body).await?));
            }
        }

        Ok(DecodeInput::Buffer(buffer.freeze()))
    }

    async fn stream_to_spill(
        &self,
        mut writer: SpillWriter,
        mut body: ResponseBody,
    ) -> Result<SpillFile, FetchError> {
        while let Some(chunk) = body.next_chunk().await {
            writer.write(&chunk?).await?;
        }
        let spill = writer.finish().await?;
        self.stats.increment_spilled();
        Ok(spill)
    }

    fn spill_writer(&self) -> Result<SpillWriter, FetchError> {
        SpillWriter::create(self.spill_dir.as_deref(), self.chunk_size)
    }
}
