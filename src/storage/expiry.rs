//! Background Expiry Sweeper
//!
//! Entries enqueued with an expiration instant are not removed by any
//! foreground call once that instant passes. This module runs a background
//! task per queue that periodically walks the expiration index and expires
//! every record whose instant is in the past.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps for the configured interval (default: 500ms)
//! 2. Makes sure the index file exists
//! 3. Expires every record strictly before "now"
//! 4. Reports failures as diagnostics and carries on
//!
//! The task only holds a weak reference to its queue, so dropping the last
//! queue handle also ends the task. Stopping is fire-and-forget: the handle
//! signals the task and returns without waiting for it.

use crate::error::{QueueError, Result};
use crate::storage::queue::PersistentQueue;
use chrono::Utc;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Default delay between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Smallest accepted delay between sweeps.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Delay between sweeps (default: 500ms)
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl SweeperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval < MIN_SWEEP_INTERVAL {
            return Err(QueueError::invalid(format!(
                "sweep interval must be at least {}ms, got {:?}",
                MIN_SWEEP_INTERVAL.as_millis(),
                self.interval
            )));
        }
        Ok(())
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(queue: Weak<PersistentQueue>, config: SweeperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        debug!(interval_ms = config.interval.as_millis(), "Starting expiry sweeper");
        tokio::spawn(sweeper_loop(queue, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Signals the sweeper to stop. Does not wait for the task to exit.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Background expiry sweeper stopped");
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    queue: Weak<PersistentQueue>,
    config: SweeperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        if *shutdown_rx.borrow() {
            return;
        }

        let Some(queue) = queue.upgrade() else {
            debug!("Queue dropped, expiry sweeper exiting");
            return;
        };

        if queue.is_closed() {
            return;
        }

        let expired = sweep_once(&queue, &shutdown_rx).await;

        if expired > 0 {
            debug!(
                expired = expired,
                dir = %queue.directory().display(),
                "Expired entries cleaned up"
            );
        }
    }
}

/// Runs one sweep pass and returns how many due records were processed.
///
/// Failures never escape: each is reported through the queue's diagnostic
/// notification and the pass moves on to the next record.
pub(crate) async fn sweep_once(queue: &PersistentQueue, shutdown_rx: &watch::Receiver<bool>) -> u64 {
    if let Err(e) = queue.expiration_index().ensure_exists().await {
        warn!(error = %e, "Could not create expiration index");
        queue.report(e);
        return 0;
    }

    let records = match queue.expirations().await {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "Could not load expiration index");
            queue.report(e);
            return 0;
        }
    };

    trace!(records = records.len(), "Sweeping expiration index");

    let now = Utc::now();
    let mut expired = 0u64;

    for (key, at) in records {
        if *shutdown_rx.borrow() {
            break;
        }
        if at >= now {
            continue;
        }

        match queue.expire(&key).await {
            Ok(_) => expired += 1,
            Err(QueueError::InvalidArgument(reason)) => {
                // Not a usable entry key; drop the record so it stops recurring.
                warn!(key = %key, reason = %reason, "Dropping unusable expiration record");
                if let Err(e) = queue.expiration_index().remove(&key).await {
                    queue.report(e);
                }
                queue.report(QueueError::InvalidArgument(reason));
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to expire entry");
                queue.report(e);
            }
        }
    }

    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::events::QueueEvent;
    use crate::storage::queue::QueueConfig;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fast_config() -> QueueConfig {
        QueueConfig::default().with_sweep_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_interval_validation() {
        assert!(SweeperConfig::default().validate().is_ok());
        assert!(SweeperConfig {
            interval: Duration::from_millis(1)
        }
        .validate()
        .is_ok());
        assert!(SweeperConfig {
            interval: Duration::from_micros(999)
        }
        .validate()
        .is_err());
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_entries() {
        let dir = TempDir::new().unwrap();
        let queue = PersistentQueue::open(dir.path(), fast_config()).await.unwrap();

        let expired_events = Arc::new(AtomicUsize::new(0));
        {
            let expired_events = Arc::clone(&expired_events);
            queue.subscribe(move |event| {
                if matches!(event, QueueEvent::Expired { .. }) {
                    expired_events.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let past = Utc::now() - chrono::Duration::seconds(5);
        for _ in 0..5 {
            queue
                .enqueue(Bytes::from("short-lived"), Some(past))
                .await
                .unwrap();
        }
        let keeper = queue.enqueue(Bytes::from("persistent"), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        // Only the persistent entry should remain
        assert_eq!(queue.depth().await.unwrap(), 1);
        assert!(queue.dequeue(Some(keeper.as_str()), false).await.unwrap().is_some());
        assert_eq!(expired_events.load(Ordering::SeqCst), 5);
        assert!(queue.expirations().await.unwrap().is_empty());
        assert_eq!(queue.stats().expired, 5);
    }

    #[tokio::test]
    async fn test_sweeper_leaves_future_expirations() {
        let dir = TempDir::new().unwrap();
        let queue = PersistentQueue::open(dir.path(), fast_config()).await.unwrap();

        let future = Utc::now() + chrono::Duration::hours(1);
        let key = queue.enqueue(Bytes::from("later"), Some(future)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(queue.depth().await.unwrap(), 1);
        assert_eq!(queue.get_expiration(&key).await.unwrap(), Some(future));
    }

    #[tokio::test]
    async fn test_sweeper_recreates_index_after_clear() {
        let dir = TempDir::new().unwrap();
        let queue = PersistentQueue::open(dir.path(), fast_config()).await.unwrap();

        queue.clear().await.unwrap();
        assert!(!queue.expiration_index().path().exists());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(queue.expiration_index().path().exists());
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_tolerates_stale_and_unusable_records() {
        let dir = TempDir::new().unwrap();
        let queue = PersistentQueue::open(dir.path(), fast_config()).await.unwrap();

        let diagnostics = Arc::new(AtomicUsize::new(0));
        {
            let diagnostics = Arc::clone(&diagnostics);
            queue.subscribe(move |event| {
                if matches!(event, QueueEvent::Diagnostic(_)) {
                    diagnostics.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let past = Utc::now() - chrono::Duration::seconds(1);
        // Stale: the entry never existed
        queue
            .expiration_index()
            .add("0f0f0f0f-dead-beef-0000-000000000000", past)
            .await
            .unwrap();
        // Unusable: not a valid entry file name
        queue.expiration_index().add("../escape", past).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(queue.expirations().await.unwrap().is_empty());
        assert_eq!(diagnostics.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_corrupt_index_line_reported_once_across_sweeps() {
        let dir = TempDir::new().unwrap();
        let queue = PersistentQueue::open(dir.path(), fast_config()).await.unwrap();

        let diagnostics = Arc::new(AtomicUsize::new(0));
        {
            let diagnostics = Arc::clone(&diagnostics);
            queue.subscribe(move |event| {
                if matches!(event, QueueEvent::Diagnostic(_)) {
                    diagnostics.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        std::fs::write(queue.expiration_index().path(), "garbage\n").unwrap();

        // Many sweep intervals
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(diagnostics.load(Ordering::SeqCst), 1);
        assert!(queue.expirations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let dir = TempDir::new().unwrap();
        let queue = PersistentQueue::open(dir.path(), fast_config()).await.unwrap();
        let weak = Arc::downgrade(&queue);

        drop(queue);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_stopped_sweeper_leaves_entries() {
        let dir = TempDir::new().unwrap();
        let queue = PersistentQueue::open(dir.path(), fast_config()).await.unwrap();
        queue.stop_sweeper();

        let past = Utc::now() - chrono::Duration::seconds(1);
        queue.enqueue(Bytes::from("value"), Some(past)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.depth().await.unwrap(), 1);
    }
}
