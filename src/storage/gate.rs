//! Mutual-Exclusion Gate
//!
//! A gate serializes a set of operations on shared on-disk state. Only one
//! holder proceeds at a time; waiters are queued by the underlying tokio
//! mutex, which grants the lock in FIFO order.
//!
//! Two acquisition modes are offered:
//!
//! - [`Gate::acquire`] waits until the gate is free.
//! - [`Gate::acquire_or_cancel`] waits until the gate is free or the given
//!   token fires, whichever comes first. A cancelled wait leaves no trace.

use crate::error::{QueueError, Result};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Held while an operation owns the gate. Dropping it releases the gate.
pub type GateGuard<'a> = MutexGuard<'a, ()>;

#[derive(Debug, Default)]
pub struct Gate {
    lock: Mutex<()>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the gate is free.
    pub async fn acquire(&self) -> GateGuard<'_> {
        self.lock.lock().await
    }

    /// Waits until the gate is free, giving up if `token` is cancelled first.
    ///
    /// An already-cancelled token fails immediately, even when the gate is
    /// free.
    pub async fn acquire_or_cancel(&self, token: &CancellationToken) -> Result<GateGuard<'_>> {
        if token.is_cancelled() {
            return Err(QueueError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(QueueError::Cancelled),
            guard = self.lock.lock() => Ok(guard),
        }
    }

    /// Acquires in whichever mode the caller asked for.
    pub(crate) async fn enter(&self, cancel: Option<&CancellationToken>) -> Result<GateGuard<'_>> {
        match cancel {
            Some(token) => self.acquire_or_cancel(token).await,
            None => Ok(self.acquire().await),
        }
    }
}
