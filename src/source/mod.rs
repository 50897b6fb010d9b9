//! URL input: one URL per line, delivered over a channel that closes at EOF.
//!
//! [`UrlSource::open`] opens the file eagerly, so a missing input fails the
//! run before any output is touched, then reads it on a background task.
//! Lines are trimmed and blank lines skipped; duplicates are passed through
//! and each one gets its own record.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::error::PipelineError;

/// Splits text into URLs, trimming whitespace and dropping blank lines.
///
/// Applies the same rule [`UrlSource`] uses for each line of a file.
#[must_use]
pub fn parse_url_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(url_from_line)
        .map(ToString::to_string)
        .collect()
}

fn url_from_line(line: &str) -> Option<&str> {
    let url = line.trim();
    (!url.is_empty()).then_some(url)
}

/// Streaming reader over an input file of URLs.
#[derive(Debug)]
pub struct UrlSource {
    receiver: mpsc::Receiver<String>,
    reader: JoinHandle<Result<usize, PipelineError>>,
}

impl UrlSource {
    /// Opens `path` and starts reading it. At most `buffer` URLs are queued
    /// ahead of the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InputOpen`] if the file cannot be opened.
    #[instrument(level = "debug", fields(path = %path.display()))]
    pub async fn open(path: &Path, buffer: usize) -> Result<Self, PipelineError> {
        let file = File::open(path)
            .await
            .map_err(|source| PipelineError::InputOpen {
                path: path.to_path_buf(),
                source,
            })?;

        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let reader = tokio::spawn(read_lines(file, path.to_path_buf(), sender));
        Ok(Self { receiver, reader })
    }

    /// Next URL, or `None` once the input is exhausted (or failed).
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Waits for the reader to finish and returns how many URLs it produced.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InputRead`] if reading stopped on an IO or
    /// encoding error.
    pub async fn finish(self) -> Result<usize, PipelineError> {
        drop(self.receiver);
        self.reader
            .await
            .map_err(|e| PipelineError::WorkerAborted {
                reason: format!("input reader: {e}"),
            })?
    }
}

async fn read_lines(
    file: File,
    path: PathBuf,
    sender: mpsc::Sender<String>,
) -> Result<usize, PipelineError> {
    let mut lines = BufReader::new(file).lines();
    let mut produced = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(source) => return Err(PipelineError::InputRead { path, source }),
        };
        let Some(url) = url_from_line(&line) else {
            continue;
        };
        if sender.send(url.to_string()).await.is_err() {
            debug!("url consumer went away, stopping input reader");
            break;
        }
        produced += 1;
    }

    debug!(produced, "input exhausted");
    Ok(produced)
}
