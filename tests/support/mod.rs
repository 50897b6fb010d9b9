//! Shared helpers for pipeline integration tests: instrumented `HttpFetch`
//! doubles and small file utilities.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use fetchline_core::{FetchError, FetchResponse, HttpFetch, PipelineConfig, ResponseBody};
use serde_json::Value;

/// Config with fast retries and a private spill directory.
pub fn test_config(spill_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        max_concurrent: 4,
        max_retries: 3,
        base_retry_delay_seconds: 0.01,
        request_timeout_seconds: 10.0,
        decode_workers: Some(2),
        spill_dir: Some(spill_dir.to_path_buf()),
        ..PipelineConfig::default()
    }
}

/// Writes one URL per line to `dir/urls.txt`.
pub fn write_input(dir: &Path, urls: &[&str]) -> PathBuf {
    let path = dir.join("urls.txt");
    let mut text = urls.join("\n");
    text.push('\n');
    std::fs::write(&path, text).expect("write input file");
    path
}

/// Parses every line of a JSON Lines file.
pub fn read_records(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .expect("read output file")
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid JSON line"))
        .collect()
}

/// Number of entries in a directory.
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).expect("read dir").count()
}

fn chunked(body: &Bytes, chunk: usize) -> ResponseBody {
    let chunks = body
        .chunks(chunk.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    ResponseBody::from_chunks(chunks)
}

/// Returns the same response for every URL.
pub struct StaticFetch {
    status: u16,
    body: Bytes,
    content_type: Option<String>,
    declare_length: bool,
    calls: AtomicUsize,
}

impl StaticFetch {
    pub fn json(body: &str) -> Self {
        Self {
            status: 200,
            body: Bytes::copy_from_slice(body.as_bytes()),
            content_type: Some("application/json".to_string()),
            declare_length: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Omit `Content-Length`, as a chunked response would.
    pub fn without_length(mut self) -> Self {
        self.declare_length = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetch for StaticFetch {
    async fn get(&self, _url: &str) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchResponse {
            status: self.status,
            content_length: self.declare_length.then_some(self.body.len() as u64),
            content_type: self.content_type.clone(),
            body: chunked(&self.body, 1024),
        })
    }
}

/// Tracks how many requests are inside `get` at once.
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl ConcurrencyTracker {
    pub fn new(delay: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetch for ConcurrencyTracker {
    async fn get(&self, _url: &str) -> Result<FetchResponse, FetchError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(FetchResponse {
            status: 200,
            content_length: Some(2),
            content_type: None,
            body: ResponseBody::from_bytes("{}"),
        })
    }
}

/// Fails the first `failures` calls with a transport error, then succeeds.
/// Records when each call happened.
pub struct FlakyFetch {
    failures: usize,
    calls: Mutex<Vec<Instant>>,
}

impl FlakyFetch {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A double that never succeeds.
    pub fn always() -> Self {
        Self::new(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    /// Gaps between consecutive calls.
    pub fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().expect("calls lock");
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl HttpFetch for FlakyFetch {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let call = {
            let mut calls = self.calls.lock().expect("calls lock");
            calls.push(Instant::now());
            calls.len()
        };
        if call <= self.failures {
            return Err(FetchError::transport(url, "connection refused"));
        }
        Ok(FetchResponse {
            status: 200,
            content_length: None,
            content_type: Some("application/json".to_string()),
            body: ResponseBody::from_bytes(r#"{"recovered":true}"#),
        })
    }
}

/// Declares a large body, sends one chunk, then never finishes.
/// Counts bodies that have been handed out and not yet dropped.
pub struct StallingFetch {
    declared: u64,
    open_bodies: Arc<AtomicUsize>,
}

struct OpenBody(Arc<AtomicUsize>);

impl Drop for OpenBody {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StallingFetch {
    pub fn new(declared: u64) -> Self {
        Self {
            declared,
            open_bodies: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn open_bodies(&self) -> usize {
        self.open_bodies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetch for StallingFetch {
    async fn get(&self, _url: &str) -> Result<FetchResponse, FetchError> {
        self.open_bodies.fetch_add(1, Ordering::SeqCst);
        let guard = OpenBody(Arc::clone(&self.open_bodies));
        let first = Bytes::from(vec![b'x'; 4096]);
        let body = stream::unfold((Some(first), guard), |(next, guard)| async move {
            match next {
                Some(chunk) => Some((Ok::<Bytes, FetchError>(chunk), (None, guard))),
                None => {
                    std::future::pending::<()>().await;
                    None
                }
            }
        });
        Ok(FetchResponse {
            status: 200,
            content_length: Some(self.declared),
            content_type: Some("application/json".to_string()),
            body: ResponseBody::new(body.boxed()),
        })
    }
}

/// Polls `condition` every few milliseconds until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}

/// Erases a concrete double into the pipeline's client handle.
pub fn shared<T: HttpFetch + 'static>(fetch: &Arc<T>) -> Arc<dyn HttpFetch> {
    Arc::clone(fetch) as Arc<dyn HttpFetch>
}
