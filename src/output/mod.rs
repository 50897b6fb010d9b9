//! Fetch outcomes and the shared JSON Lines output log.
//!
//! Every URL that enters the pipeline ends as exactly one [`FetchOutcome`],
//! appended as one line to the [`OutputLog`]:
//!
//! ```text
//! {"url":"https://a.example/x.json","status_code":200,"content":{"k":1}}
//! {"url":"https://b.example/y.json","status_code":0,"error":"timeout fetching https://b.example/y.json"}
//! ```
//!
//! Lines appear in completion order, not input order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::PipelineError;

/// Terminal result for one URL.
///
/// A record deserializes as `Failure` when it carries an `error` field and as
/// `Success` otherwise; a missing `content` reads back as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FetchOutcome {
    /// All attempts failed.
    Failure {
        /// The URL as read from the input.
        url: String,
        /// Always 0.
        status_code: u16,
        /// Display text of the final attempt's error.
        error: String,
    },
    /// A response was received and decoded.
    Success {
        /// The URL as read from the input.
        url: String,
        /// HTTP status of the response, error statuses included.
        status_code: u16,
        /// Decoded body.
        content: Value,
    },
}

impl FetchOutcome {
    /// Builds a success record.
    pub fn success(url: impl Into<String>, status_code: u16, content: Value) -> Self {
        Self::Success {
            url: url.into(),
            status_code,
            content,
        }
    }

    /// Builds a failure record with `status_code` 0.
    pub fn failure(url: impl Into<String>, error: impl ToString) -> Self {
        Self::Failure {
            url: url.into(),
            status_code: 0,
            error: error.to_string(),
        }
    }

    /// The URL this record describes.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Success { url, .. } | Self::Failure { url, .. } => url,
        }
    }

    /// Recorded status code (0 for failures).
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Success { status_code, .. } | Self::Failure { status_code, .. } => *status_code,
        }
    }

    /// Whether this is a success record.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Flat form of a record on disk.
///
/// Untagged enums buffer their input before matching a variant, which loses
/// arbitrary-precision numbers, so records are read through this struct.
#[derive(Deserialize)]
struct OutcomeRecord {
    url: String,
    status_code: u16,
    content: Option<Value>,
    error: Option<String>,
}

impl From<OutcomeRecord> for FetchOutcome {
    fn from(record: OutcomeRecord) -> Self {
        match record.error {
            Some(error) => Self::Failure {
                url: record.url,
                status_code: record.status_code,
                error,
            },
            None => Self::Success {
                url: record.url,
                status_code: record.status_code,
                content: record.content.unwrap_or(Value::Null),
            },
        }
    }
}

impl<'de> Deserialize<'de> for FetchOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        OutcomeRecord::deserialize(deserializer).map(Self::from)
    }
}

/// Append-only JSON Lines writer shared by all workers.
///
/// Appends are serialized through a mutex, so concurrent callers never
/// interleave bytes within a line. Each append is flushed before it returns.
#[derive(Debug)]
pub struct OutputLog {
    path: PathBuf,
    file: Mutex<File>,
    fsync_each_record: bool,
}

impl OutputLog {
    /// Opens the log at `path`, truncating it when `clear` is set and
    /// appending to it otherwise. The file is created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::OutputOpen`] if the file cannot be opened.
    #[instrument(level = "debug", fields(path = %path.display()))]
    pub async fn open(path: &Path, clear: bool) -> Result<Self, PipelineError> {
        let mut options = OpenOptions::new();
        options.create(true);
        if clear {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }

        let file = options
            .open(path)
            .await
            .map_err(|source| PipelineError::OutputOpen {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(clear, "output log opened");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            fsync_each_record: false,
        })
    }

    /// Also `sync_data` the file after every record.
    #[must_use]
    pub fn with_fsync(mut self, fsync_each_record: bool) -> Self {
        self.fsync_each_record = fsync_each_record;
        self
    }

    /// Serializes `outcome` as one line and appends it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialize`] or [`PipelineError::OutputWrite`].
    /// Either is fatal for the run.
    pub async fn append(&self, outcome: &FetchOutcome) -> Result<(), PipelineError> {
        let mut line = serde_json::to_vec(outcome).map_err(|source| PipelineError::Serialize {
            url: outcome.url().to_string(),
            source,
        })?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        let write_error =
            |source: std::io::Error| PipelineError::output_write(outcome.url(), &self.path, source);
        file.write_all(&line).await.map_err(write_error)?;
        file.flush().await.map_err(write_error)?;
        if self.fsync_each_record {
            file.sync_data().await.map_err(write_error)?;
        }
        drop(file);

        debug!(url = %outcome.url(), success = outcome.is_success(), "record appended");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    // ==================== Record Format Tests ====================

    #[test]
    fn test_success_record_shape() {
        let outcome = FetchOutcome::success("https://a.example/x", 200, json!({"k": 1}));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({"url": "https://a.example/x", "status_code": 200, "content": {"k": 1}})
        );
    }

    #[test]
    fn test_failure_record_shape() {
        let outcome = FetchOutcome::failure("https://a.example/x", "timeout fetching x");
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({"url": "https://a.example/x", "status_code": 0, "error": "timeout fetching x"})
        );
        assert!(!outcome.is_success());
        assert_eq!(outcome.status_code(), 0);
    }

    #[test]
    fn test_records_deserialize_to_matching_variant() {
        let failure: FetchOutcome =
            serde_json::from_str(r#"{"url":"u","status_code":0,"error":"boom"}"#).unwrap();
        assert_eq!(failure, FetchOutcome::failure("u", "boom"));

        let success: FetchOutcome =
            serde_json::from_str(r#"{"url":"u","status_code":404,"content":null}"#).unwrap();
        assert_eq!(success, FetchOutcome::success("u", 404, Value::Null));
    }

    #[test]
    fn test_large_integers_survive_write_and_read_back() {
        let line = r#"{"url":"u","status_code":200,"content":{"id":123456789012345678901234567890}}"#;
        let outcome: FetchOutcome = serde_json::from_str(line).unwrap();
        assert!(outcome.is_success());
        assert_eq!(serde_json::to_string(&outcome).unwrap(), line);
    }

    // ==================== Output Log Tests ====================

    #[tokio::test]
    async fn test_append_writes_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let log = OutputLog::open(&path, false).await.unwrap();

        log.append(&FetchOutcome::success("a", 200, json!([1])))
            .await
            .unwrap();
        log.append(&FetchOutcome::failure("b", "nope")).await.unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["url"], "a");
        assert_eq!(lines[1]["status_code"], 0);
    }

    #[tokio::test]
    async fn test_open_without_clear_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        std::fs::write(&path, "{\"url\":\"old\",\"status_code\":200,\"content\":1}\n").unwrap();

        let log = OutputLog::open(&path, false).await.unwrap();
        log.append(&FetchOutcome::success("new", 200, json!(2)))
            .await
            .unwrap();

        let urls: Vec<_> = read_lines(&path)
            .into_iter()
            .map(|v| v["url"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(urls, vec!["old", "new"]);
    }

    #[tokio::test]
    async fn test_open_with_clear_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        std::fs::write(&path, "stale line\n").unwrap();

        let log = OutputLog::open(&path, true).await.unwrap().with_fsync(true);
        log.append(&FetchOutcome::success("fresh", 200, json!(null)))
            .await
            .unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["url"], "fresh");
    }

    #[tokio::test]
    async fn test_open_in_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.jsonl");
        let result = OutputLog::open(&path, false).await;
        assert!(matches!(result, Err(PipelineError::OutputOpen { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let log = Arc::new(OutputLog::open(&path, true).await.unwrap());

        let big = "x".repeat(64 * 1024);
        let mut handles = Vec::new();
        for i in 0..20 {
            let log = Arc::clone(&log);
            let body = big.clone();
            handles.push(tokio::spawn(async move {
                log.append(&FetchOutcome::success(format!("u{i}"), 200, json!(body)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 20);
        assert!(lines.iter().all(|v| v["content"].as_str().unwrap().len() == big.len()));
    }
}
