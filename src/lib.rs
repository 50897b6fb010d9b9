//! Fetchline Core Library
//!
//! This library provides a bounded-concurrency bulk URL retrieval pipeline:
//! it reads a list of URLs, fetches each one with retry-on-failure, decodes
//! the body according to its size and content type, and appends exactly one
//! JSON line per URL to an append-only output log.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`source`] - Line-oriented URL input, delivered over a closing channel
//! - [`fetch`] - HTTP client seam, concurrency gate, retry policy, per-URL worker
//! - [`decode`] - CPU-bound body decoding offloaded to the blocking pool
//! - [`output`] - Fetch outcomes and the shared JSON Lines writer
//! - [`pipeline`] - Orchestrator wiring everything together
//! - [`config`] - Pipeline configuration with TOML loading and validation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod decode;
mod error;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod source;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use decode::{ContentKind, DecodeInput, DecoderPool};
pub use error::PipelineError;
pub use fetch::{
    ConcurrencyGate, FetchError, FetchResponse, GatePermit, HttpClient, HttpFetch, ResponseBody,
    RetryDecision, RetryPolicy, SpillFile,
};
pub use output::{FetchOutcome, OutputLog};
pub use pipeline::{Pipeline, RunStats};
pub use source::{UrlSource, parse_url_lines};
