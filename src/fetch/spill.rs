//! Temporary on-disk buffers for oversized response bodies.
//!
//! A [`SpillWriter`] streams body chunks to a fresh temp file in batches of
//! `chunk_size` bytes; [`SpillWriter::finish`] closes the handle and yields a
//! [`SpillFile`] for the decoder. The file is removed when the [`SpillFile`]
//! (or an unfinished writer) is dropped, so an error, a panic or a cancelled
//! task cannot leave it behind.

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::FetchError;

const SPILL_PREFIX: &str = "fetchline-";
const SPILL_SUFFIX: &str = ".spill";

/// Incrementally written spill file.
#[derive(Debug)]
pub struct SpillWriter {
    file: File,
    path: TempPath,
    pending: BytesMut,
    chunk_size: usize,
    bytes_written: u64,
}

/// A fully written spill file, deleted on drop.
#[derive(Debug)]
pub struct SpillFile {
    path: TempPath,
    len: u64,
}

impl SpillWriter {
    /// Creates a new spill file in `dir`, or the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Spill`] if the file cannot be created.
    pub fn create(dir: Option<&Path>, chunk_size: u64) -> Result<Self, FetchError> {
        let dir: PathBuf = dir.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let named = tempfile::Builder::new()
            .prefix(SPILL_PREFIX)
            .suffix(SPILL_SUFFIX)
            .tempfile_in(&dir)
            .map_err(|e| FetchError::spill(&dir, e))?;
        let (file, path) = named.into_parts();
        debug!(path = %path.display(), "created spill file");
        Ok(Self {
            file: File::from_std(file),
            path,
            pending: BytesMut::new(),
            chunk_size: usize::try_from(chunk_size).unwrap_or(usize::MAX).max(1),
            bytes_written: 0,
        })
    }

    /// Path of the file being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a body chunk, writing to disk whenever a full batch is pending.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Spill`] on write failure.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), FetchError> {
        self.pending.extend_from_slice(chunk);
        if self.pending.len() >= self.chunk_size {
            self.flush_pending().await?;
        }
        Ok(())
    }

    /// Writes any pending bytes, flushes, and closes the handle.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Spill`] on write or flush failure.
    pub async fn finish(mut self) -> Result<SpillFile, FetchError> {
        self.flush_pending().await?;
        self.file
            .flush()
            .await
            .map_err(|e| FetchError::spill(self.path.to_path_buf(), e))?;
        debug!(path = %self.path.display(), bytes = self.bytes_written, "spill file complete");
        Ok(SpillFile {
            path: self.path,
            len: self.bytes_written,
        })
    }

    async fn flush_pending(&mut self) -> Result<(), FetchError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch: Bytes = self.pending.split().freeze();
        self.file
            .write_all(&batch)
            .await
            .map_err(|e| FetchError::spill(self.path.to_path_buf(), e))?;
        self.bytes_written += batch.len() as u64;
        Ok(())
    }
}

impl SpillFile {
    /// Path of the spilled body.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of body bytes in the file.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the spilled body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Deletes the file now, logging rather than failing if removal errors.
    pub fn remove(self) {
        let path = self.path.to_path_buf();
        if let Err(error) = self.path.close() {
            warn!(path = %path.display(), %error, "failed to remove spill file");
        } else {
            debug!(path = %path.display(), "removed spill file");
        }
    }
}
