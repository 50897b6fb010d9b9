//! Error types for a single fetch attempt.
//!
//! Every variant except [`FetchError::GateClosed`] is retryable, malformed
//! URLs included. When the attempt budget runs out, the final error's
//! display text becomes the `error` field of the URL's failure record.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching and decoding one URL.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The input line is not a usable HTTP/HTTPS URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL string.
        url: String,
    },

    /// Connection-level failure (DNS, refused connection, TLS, redirect loop).
    #[error("network error fetching {url}: {message}")]
    Transport {
        /// The URL being fetched.
        url: String,
        /// Description of the underlying failure.
        message: String,
    },

    /// The attempt did not finish within the per-attempt timeout.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The connection dropped or errored while the body was streaming.
    #[error("error reading response body from {url}: {message}")]
    Body {
        /// The URL being read.
        url: String,
        /// Description of the underlying failure.
        message: String,
    },

    /// Local IO failure while writing or reading a spill file.
    #[error("spill file error at {path}: {source}")]
    Spill {
        /// The spill file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The body could not be decoded (malformed JSON, unreadable payload).
    #[error("decode error for {url}: {message}")]
    Decode {
        /// The URL whose body failed to decode.
        url: String,
        /// Description of the decode failure.
        message: String,
    },

    /// The concurrency gate was closed while waiting for a slot.
    #[error("concurrency gate closed")]
    GateClosed,
}

impl FetchError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a transport error from any displayable cause.
    pub fn transport(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a body streaming error.
    pub fn body(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Body {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Creates a spill file IO error.
    pub fn spill(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Spill {
            path: path.into(),
            source,
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Maps a reqwest error onto the transport or timeout variant.
    pub fn from_reqwest(url: impl Into<String>, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(url)
        } else {
            Self::transport(url, error)
        }
    }

    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::GateClosed)
    }
}
