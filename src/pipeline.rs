//! Orchestrator for a bulk fetch run.
//!
//! # Overview
//!
//! [`Pipeline::run`] reads URLs from the input file and spawns one worker
//! task per URL into a [`JoinSet`] as they arrive. Tasks are not bounded;
//! only their network phase is, by the shared concurrency gate. When every
//! task has finished, the run reports [`RunStats`].
//!
//! A failed output write or a panicked worker fails the run, but only after
//! the remaining workers have finished and written their records. Dropping
//! the future returned by `run` aborts every worker; their gate permits and
//! spill files are released as the tasks unwind.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use fetchline_core::{HttpClient, Pipeline, PipelineConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let client = Arc::new(HttpClient::from_config(&config)?);
//! let pipeline = Pipeline::new(config, client)?;
//! let stats = pipeline.run(Path::new("urls.txt"), Path::new("out.jsonl")).await?;
//! println!("{stats}");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::fetch::{HttpClient, HttpFetch, WorkerContext};
use crate::output::OutputLog;
use crate::source::UrlSource;

/// URLs read ahead of the spawning loop.
const SOURCE_BUFFER: usize = 256;

/// Counters for one run.
#[derive(Debug, Default)]
pub struct RunStats {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    spilled: AtomicUsize,
}

impl RunStats {
    /// Creates a stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs recorded as successes.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// URLs recorded as failures.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Records written (succeeded + failed).
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded() + self.failed()
    }

    /// Retry attempts made across all URLs.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Response bodies that were spilled to disk.
    #[must_use]
    pub fn spilled(&self) -> usize {
        self.spilled.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_spilled(&self) {
        self.spilled.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Self {
        Self {
            succeeded: AtomicUsize::new(self.succeeded()),
            failed: AtomicUsize::new(self.failed()),
            retried: AtomicUsize::new(self.retried()),
            spilled: AtomicUsize::new(self.spilled()),
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded={} failed={} retried={} spilled={}",
            self.succeeded(),
            self.failed(),
            self.retried(),
            self.spilled()
        )
    }
}

/// A configured pipeline, reusable across runs.
pub struct Pipeline {
    config: PipelineConfig,
    client: Arc<dyn HttpFetch>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline over an explicit HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: PipelineConfig, client: Arc<dyn HttpFetch>) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config, client })
    }

    /// Creates a pipeline with a reqwest client built from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] or [`PipelineError::ClientBuild`].
    pub fn with_http_client(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let client: Arc<dyn HttpFetch> = Arc::new(HttpClient::from_config(&config)?);
        Ok(Self { config, client })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetches every URL in `input` and appends one record per URL to `output`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InputOpen`] / [`PipelineError::OutputOpen`] before any fetch
    /// - [`PipelineError::InputRead`] if the input stops mid-way
    /// - [`PipelineError::OutputWrite`] / [`PipelineError::Serialize`] if a record is lost
    /// - [`PipelineError::WorkerAborted`] if a worker task panicked
    #[instrument(skip(self), fields(input = %input.display(), output = %output.display()))]
    pub async fn run(&self, input: &Path, output: &Path) -> Result<RunStats, PipelineError> {
        let mut source = UrlSource::open(input, SOURCE_BUFFER).await?;
        let log = OutputLog::open(output, self.config.clear_output_on_start)
            .await?
            .with_fsync(self.config.fsync_each_record);

        let stats = Arc::new(RunStats::new());
        let context = Arc::new(WorkerContext::new(
            &self.config,
            Arc::clone(&self.client),
            Arc::new(log),
            Arc::clone(&stats),
        ));

        info!(
            max_concurrent = context.gate().capacity(),
            max_retries = self.config.max_retries,
            "starting run"
        );

        let mut tasks = JoinSet::new();
        let mut first_error = None;
        let mut spawned = 0usize;

        while let Some(url) = source.recv().await {
            let context = Arc::clone(&context);
            tasks.spawn(async move { context.process(url).await });
            spawned += 1;

            while let Some(joined) = tasks.try_join_next() {
                note_joined(joined, &mut first_error);
            }
        }

        let read_result = source.finish().await;

        debug!(task_count = spawned, "waiting for workers to complete");
        while let Some(joined) = tasks.join_next().await {
            note_joined(joined, &mut first_error);
        }

        read_result?;
        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            succeeded = stats.succeeded(),
            failed = stats.failed(),
            retried = stats.retried(),
            spilled = stats.spilled(),
            total = stats.total(),
            "run complete"
        );
        Ok(stats.snapshot())
    }
}

fn note_joined(
    joined: Result<Result<(), PipelineError>, JoinError>,
    first_error: &mut Option<PipelineError>,
) {
    let e = match joined {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e,
        Err(join_error) => PipelineError::WorkerAborted {
            reason: join_error.to_string(),
        },
    };
    error!(error = %e, "worker failed");
    first_error.get_or_insert(e);
}
