//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use fetchline_core::PipelineConfig;

/// Fetch every URL in a file and append one JSON line per URL to an output log.
///
/// Each URL is retried with exponential backoff until it succeeds or its
/// attempts run out. Successful responses are stored with their decoded body;
/// failures are stored with `status_code` 0 and the final error.
#[derive(Parser, Debug)]
#[command(name = "fetchline")]
#[command(author, version, about)]
pub struct Args {
    /// File with one URL per line
    pub input: PathBuf,

    /// JSON Lines output log (appended to unless --clear)
    pub output: PathBuf,

    /// TOML config file; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum requests in flight at once (1-1000)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u16).range(1..=1000))]
    pub concurrency: Option<u16>,

    /// Attempts per URL, including the first (1-20)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: Option<u32>,

    /// Base backoff delay in seconds, doubled after each failed attempt
    #[arg(long, value_name = "SECONDS")]
    pub retry_delay: Option<f64>,

    /// Per-attempt timeout in seconds, covering connect and full body read
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Bodies declaring more bytes than this are spilled to disk
    #[arg(long, value_name = "BYTES", value_parser = clap::value_parser!(u64).range(1..))]
    pub stream_threshold: Option<u64>,

    /// Write batch size for spill files (defaults to the stream threshold)
    #[arg(long, value_name = "BYTES", value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: Option<u64>,

    /// Maximum body decodes running at once
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub decode_workers: Option<u16>,

    /// Directory for spill files (defaults to the system temp directory)
    #[arg(long, value_name = "DIR")]
    pub spill_dir: Option<PathBuf>,

    /// Truncate the output log before the run instead of appending
    #[arg(long)]
    pub clear: bool,

    /// fsync the output log after every record
    #[arg(long)]
    pub fsync: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Overwrites `config` fields with every flag that was given.
    pub fn apply_to(&self, config: &mut PipelineConfig) {
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent = usize::from(concurrency);
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(delay) = self.retry_delay {
            config.base_retry_delay_seconds = delay;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_seconds = timeout;
        }
        if let Some(threshold) = self.stream_threshold {
            config.stream_threshold_bytes = threshold;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size_bytes = Some(chunk_size);
        }
        if let Some(workers) = self.decode_workers {
            config.decode_workers = Some(usize::from(workers));
        }
        if let Some(dir) = &self.spill_dir {
            config.spill_dir = Some(dir.clone());
        }
        if self.clear {
            config.clear_output_on_start = true;
        }
        if self.fsync {
            config.fsync_each_record = true;
        }
    }
}
