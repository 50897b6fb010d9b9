//! Pipeline configuration.
//!
//! [`PipelineConfig`] can be built in code, loaded from a TOML file, or both:
//! the CLI loads an optional file first and then overrides individual fields
//! from flags. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! max_concurrent = 10
//! max_retries = 5
//! base_retry_delay_seconds = 2.5
//! stream_threshold_bytes = 52428800
//! clear_output_on_start = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;
use crate::fetch::RetryPolicy;
use crate::fetch::constants::{
    DEFAULT_BASE_RETRY_DELAY_SECS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT,
    DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_DELAY_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_STREAM_THRESHOLD_BYTES,
};

const MAX_CONCURRENT_LIMIT: usize = 1000;
const MAX_RETRIES_LIMIT: u32 = 20;

/// Options recognized by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Capacity of the concurrency gate.
    pub max_concurrent: usize,
    /// Attempts per URL, including the first.
    pub max_retries: u32,
    /// Base backoff delay in seconds, doubled per attempt.
    pub base_retry_delay_seconds: f64,
    /// Upper bound on a single backoff delay in seconds.
    pub max_retry_delay_seconds: f64,
    /// Per-attempt timeout over connect plus full body read.
    pub request_timeout_seconds: f64,
    /// TCP/TLS connect timeout.
    pub connect_timeout_seconds: f64,
    /// Declared lengths above this are spilled to a temporary file.
    pub stream_threshold_bytes: u64,
    /// Write batch size when spilling. Defaults to the threshold.
    pub chunk_size_bytes: Option<u64>,
    /// Truncate the output log at run start instead of appending.
    pub clear_output_on_start: bool,
    /// Maximum parses running at once. Defaults to available parallelism.
    pub decode_workers: Option<usize>,
    /// Directory for spill files. Defaults to the system temp directory.
    pub spill_dir: Option<PathBuf>,
    /// `fsync` the output log after every record, not just flush.
    pub fsync_each_record: bool,
    /// User-Agent header override.
    pub user_agent: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay_seconds: DEFAULT_BASE_RETRY_DELAY_SECS,
            max_retry_delay_seconds: DEFAULT_MAX_RETRY_DELAY_SECS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECS,
            stream_threshold_bytes: DEFAULT_STREAM_THRESHOLD_BYTES,
            chunk_size_bytes: None,
            clear_output_on_start: false,
            decode_workers: None,
            spill_dir: None,
            fsync_each_record: false,
            user_agent: None,
        }
    }
}

impl PipelineConfig {
    /// Parses a config from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed input or unknown keys.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Loads a config file. Values are not range-checked until
    /// [`validate`](Self::validate), so flags can still override them.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ConfigRead`] or [`PipelineError::ConfigParse`].
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw).map_err(|source| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), ?config, "loaded config file");
        Ok(config)
    }

    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(1..=MAX_CONCURRENT_LIMIT).contains(&self.max_concurrent) {
            return Err(PipelineError::invalid_config(
                "max_concurrent",
                self.max_concurrent,
                "range 1..=1000",
            ));
        }
        if !(1..=MAX_RETRIES_LIMIT).contains(&self.max_retries) {
            return Err(PipelineError::invalid_config(
                "max_retries",
                self.max_retries,
                "range 1..=20",
            ));
        }
        validate_seconds("base_retry_delay_seconds", self.base_retry_delay_seconds, true)?;
        validate_seconds("max_retry_delay_seconds", self.max_retry_delay_seconds, true)?;
        validate_seconds("request_timeout_seconds", self.request_timeout_seconds, false)?;
        validate_seconds("connect_timeout_seconds", self.connect_timeout_seconds, false)?;
        if self.stream_threshold_bytes == 0 {
            return Err(PipelineError::invalid_config(
                "stream_threshold_bytes",
                0,
                "a positive byte count",
            ));
        }
        if self.chunk_size_bytes == Some(0) {
            return Err(PipelineError::invalid_config(
                "chunk_size_bytes",
                0,
                "a positive byte count",
            ));
        }
        if self.decode_workers == Some(0) {
            return Err(PipelineError::invalid_config(
                "decode_workers",
                0,
                "at least 1",
            ));
        }
        Ok(())
    }

    /// Spill write batch size, falling back to the stream threshold.
    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size_bytes.unwrap_or(self.stream_threshold_bytes)
    }

    /// Number of decode permits, falling back to the machine's parallelism.
    #[must_use]
    pub fn decode_workers(&self) -> usize {
        self.decode_workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }

    /// Per-attempt network timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        seconds(self.request_timeout_seconds)
    }

    /// Connect timeout for the HTTP client.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        seconds(self.connect_timeout_seconds)
    }

    /// Builds the retry policy described by this config.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            seconds(self.base_retry_delay_seconds),
            seconds(self.max_retry_delay_seconds),
        )
    }
}

fn validate_seconds(field: &'static str, value: f64, allow_zero: bool) -> Result<(), PipelineError> {
    let lower_bound_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    let in_range = value.is_finite() && lower_bound_ok;
    if in_range && Duration::try_from_secs_f64(value).is_ok() {
        return Ok(());
    }
    let expected = if allow_zero {
        "a finite number of seconds >= 0"
    } else {
        "a finite number of seconds > 0"
    };
    Err(PipelineError::invalid_config(field, value, expected))
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
