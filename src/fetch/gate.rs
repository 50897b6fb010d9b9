//! Concurrency gate bounding simultaneous network phases.
//!
//! Workers hold a [`GatePermit`] only while an attempt is on the wire
//! (request sent, body being read). Decoding, writing and backoff sleeps
//! happen without a permit, and every retry acquires a fresh one.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use super::FetchError;

/// Counting permit pool shared by all workers of a run.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held gate slot. The slot is returned when this value is dropped,
/// including when the owning task is cancelled.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Creates a gate with `capacity` slots (clamped to at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits until a slot is free and takes it.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::GateClosed`] if the underlying semaphore was closed.
    pub async fn acquire(&self) -> Result<GatePermit, FetchError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::GateClosed)?;
        trace!(in_flight = self.in_flight(), "gate slot acquired");
        Ok(GatePermit { _permit: permit })
    }

    /// Configured number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}
