//! Run-level errors.
//!
//! Everything in [`PipelineError`] is fatal for a run. Per-URL failures
//! (transport, timeout, decode) never appear here: they are retried by the
//! worker and, when the budget runs out, persisted as failure records.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort or invalidate a whole pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A configuration value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    InvalidConfig {
        /// Name of the offending option.
        field: &'static str,
        /// The rejected value, rendered for display.
        value: String,
        /// Human-readable description of the accepted range.
        expected: &'static str,
    },

    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// The URL input could not be opened. Raised before any worker starts.
    #[error("cannot open URL input {path}: {source}")]
    InputOpen {
        /// Path of the input file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The URL input failed part-way through reading.
    #[error("error reading URL input {path}: {source}")]
    InputRead {
        /// Path of the input file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The output log could not be created or opened.
    #[error("cannot open output log {path}: {source}")]
    OutputOpen {
        /// Path of the output log.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A record could not be appended to the output log.
    #[error("failed to append record for {url} to {path}: {source}")]
    OutputWrite {
        /// URL whose record was lost.
        url: String,
        /// Path of the output log.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A record could not be serialized to JSON.
    #[error("failed to serialize record for {url}: {source}")]
    Serialize {
        /// URL whose record was lost.
        url: String,
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// A worker task panicked or was aborted before writing its record.
    #[error("worker task did not complete: {reason}")]
    WorkerAborted {
        /// Panic message or abort description.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying reqwest builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl PipelineError {
    /// Creates an invalid-config error.
    pub fn invalid_config(
        field: &'static str,
        value: impl ToString,
        expected: &'static str,
    ) -> Self {
        Self::InvalidConfig {
            field,
            value: value.to_string(),
            expected,
        }
    }

    /// Creates an output write error.
    pub fn output_write(
        url: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::OutputWrite {
            url: url.into(),
            path: path.into(),
            source,
        }
    }
}
