//! CLI entry point for the fetchline tool.

use anyhow::{Context, Result, bail};
use clap::Parser;
use fetchline_core::{Pipeline, PipelineConfig};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries only the run summary.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    args.apply_to(&mut config);

    let pipeline = Pipeline::with_http_client(config).context("invalid pipeline settings")?;
    info!(input = %args.input.display(), output = %args.output.display(), "fetchline starting");

    let stats = tokio::select! {
        result = pipeline.run(&args.input, &args.output) => {
            result.with_context(|| format!("run over {} failed", args.input.display()))?
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling in-flight fetches");
            bail!("run interrupted");
        }
    };

    println!("{stats}");
    Ok(())
}
