//! Fetching one URL: HTTP seam, concurrency gate, retries and spilling.
//!
//! # Overview
//!
//! Each URL is driven by a worker that loops over attempts:
//!
//! 1. take a [`GatePermit`] from the shared [`ConcurrencyGate`]
//! 2. issue the GET through an [`HttpFetch`] and read the body, in memory
//!    or into a [`SpillFile`] depending on its declared size
//! 3. release the permit and hand the body to the decoder
//! 4. on error, ask the [`RetryPolicy`] whether to back off and try again
//!
//! The network phase of step 2 runs under a single per-attempt timeout.
//!
//! # Example
//!
//! ```no_run
//! use fetchline_core::fetch::{HttpClient, HttpFetch};
//! use fetchline_core::PipelineConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::from_config(&PipelineConfig::default())?;
//! let response = client.get("https://example.com/data.json").await?;
//! println!("status {}", response.status);
//! let body = response.body.read_all().await?;
//! println!("{} bytes", body.len());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod gate;
mod retry;
mod spill;
mod worker;

pub use client::{BodyStream, FetchResponse, HttpClient, HttpFetch, ResponseBody, parse_http_url};
pub use error::FetchError;
pub use gate::{ConcurrencyGate, GatePermit};
pub use retry::{RetryDecision, RetryPolicy};
pub use spill::{SpillFile, SpillWriter};
pub(crate) use worker::WorkerContext;
