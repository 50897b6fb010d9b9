//! Default values for the fetch pipeline (concurrency, retry, timeouts, sizes).

/// Default number of requests allowed in their network phase at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default number of attempts per URL, including the first.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (5 seconds: 5s, 10s, 20s, ...).
pub const DEFAULT_BASE_RETRY_DELAY_SECS: f64 = 5.0;

/// Default cap on a single backoff delay (1 hour).
pub const DEFAULT_MAX_RETRY_DELAY_SECS: f64 = 3600.0;

/// Default per-attempt timeout covering connect and full body read (1 hour).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 3600.0;

/// Default HTTP connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: f64 = 30.0;

/// Responses declaring more bytes than this are spilled to disk (100 MiB).
pub const DEFAULT_STREAM_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;
