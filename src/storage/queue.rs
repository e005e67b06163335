//! Directory-Backed Persistent Queue
//!
//! This module implements the entry store: every enqueued payload becomes one
//! file in the queue directory, named by a freshly generated UUID key.
//!
//! ## Layout
//!
//! ```text
//! <queue dir>/
//! ├── 3c8e1f2a-5f5c-4b86-8b9d-0b8f5f0d2a44   raw payload bytes
//! ├── 9d532a8f-8a0b-4a52-6f1c-0e524c4f0b7e   raw payload bytes
//! └── .expire                                 expiration index (reserved)
//! ```
//!
//! ## Concurrency Model
//!
//! All entry-file operations, including the read-only `depth` and `length`
//! scans, go through one [`Gate`] per queue. The expiration index has its
//! own gate, so removing an expiration record and deleting the entry file
//! (as `expire` does) are two separate steps: another caller can observe the
//! record gone while the file is still present, or the reverse. `clear` is
//! the only operation that holds both gates at once, always entry gate first.
//!
//! ## Recency
//!
//! Dequeue without a key returns the entry whose file was modified most
//! recently, i.e. the newest entry. This is LIFO order, not FIFO.

use crate::error::{QueueError, Result};
use crate::storage::events::{EventBus, QueueEvent};
use crate::storage::expiry::{ExpirySweeper, SweeperConfig, DEFAULT_SWEEP_INTERVAL};
use crate::storage::gate::Gate;
use crate::storage::index::{ExpirationIndex, ExpirationRecord};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default file name of the expiration index inside the queue directory.
pub const DEFAULT_EXPIRY_FILE: &str = ".expire";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Name of the reserved expiration index file (default: `.expire`)
    pub expiry_file_name: String,
    /// Delay between expiry sweeps (default: 500ms, minimum 1ms)
    pub sweep_interval: Duration,
    /// Delete all content and the directory itself on [`PersistentQueue::close`]
    pub clear_on_close: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            expiry_file_name: DEFAULT_EXPIRY_FILE.to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            clear_on_close: false,
        }
    }
}

impl QueueConfig {
    pub fn with_expiry_file_name(mut self, name: impl Into<String>) -> Self {
        self.expiry_file_name = name.into();
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_clear_on_close(mut self, clear: bool) -> Self {
        self.clear_on_close = clear;
        self
    }

    /// Checks that the index file name is a plain file name and the sweep
    /// interval is at least 1ms.
    pub fn validate(&self) -> Result<()> {
        check_file_name(&self.expiry_file_name)
            .map_err(|reason| QueueError::invalid(format!("expiry file name {}", reason)))?;
        self.sweeper_config().validate()
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            interval: self.sweep_interval,
        }
    }
}

/// An entry read back from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DequeuedEntry {
    /// Key the entry was stored under
    pub key: String,
    /// The payload, byte-for-byte as enqueued
    pub payload: Bytes,
}

/// Cumulative operation counters for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Entries written
    pub enqueued: u64,
    /// Entries read
    pub dequeued: u64,
    /// Entry files removed by purge or dequeue-with-purge
    pub deleted: u64,
    /// Expiration records consumed by expire
    pub expired: u64,
    /// Clear operations
    pub clears: u64,
}

/// A durable queue of byte payloads, one file per entry.
///
/// Opened through [`PersistentQueue::open`], which also starts the
/// background expiry sweeper. Handles are shared as `Arc<PersistentQueue>`;
/// dropping the last one stops the sweeper.
///
/// # Example
///
/// ```no_run
/// use pqueue::storage::{PersistentQueue, QueueConfig};
///
/// # async fn demo() -> pqueue::Result<()> {
/// let queue = PersistentQueue::open("./queue", QueueConfig::default()).await?;
///
/// let key = queue.enqueue("hello", None).await?;
/// let entry = queue.dequeue(Some(key.as_str()), true).await?;
/// assert_eq!(entry.unwrap().payload, "hello");
///
/// queue.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct PersistentQueue {
    /// Directory holding the entry files
    dir: PathBuf,

    config: QueueConfig,

    /// Serializes every entry-file operation
    gate: Gate,

    /// Side index of expiring keys, with its own gate
    index: ExpirationIndex,

    /// Registered notification listeners
    events: Arc<EventBus>,

    /// Background sweeper handle; `None` once stopped
    sweeper: Mutex<Option<ExpirySweeper>>,

    closed: AtomicBool,

    /// Set once `close` has finished its release work; held while doing it
    released: tokio::sync::Mutex<bool>,

    enqueue_count: AtomicU64,
    dequeue_count: AtomicU64,
    delete_count: AtomicU64,
    expired_count: AtomicU64,
    clear_count: AtomicU64,
}

impl std::fmt::Debug for PersistentQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentQueue")
            .field("dir", &self.dir)
            .field("expiry_file", &self.config.expiry_file_name)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("enqueued", &self.enqueue_count.load(Ordering::Relaxed))
            .field("dequeued", &self.dequeue_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl PersistentQueue {
    /// Opens (creating if needed) the queue rooted at `dir` and starts its
    /// expiry sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open(dir: impl AsRef<Path>, config: QueueConfig) -> Result<Arc<Self>> {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err(QueueError::invalid("queue directory must not be empty"));
        }
        config.validate()?;

        tokio::fs::create_dir_all(dir).await?;

        let events = Arc::new(EventBus::new());
        let index = ExpirationIndex::new(dir.join(&config.expiry_file_name), Arc::clone(&events));

        let queue = Arc::new(Self {
            dir: dir.to_path_buf(),
            config,
            gate: Gate::new(),
            index,
            events,
            sweeper: Mutex::new(None),
            closed: AtomicBool::new(false),
            released: tokio::sync::Mutex::new(false),
            enqueue_count: AtomicU64::new(0),
            dequeue_count: AtomicU64::new(0),
            delete_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
            clear_count: AtomicU64::new(0),
        });

        let sweeper = ExpirySweeper::start(Arc::downgrade(&queue), queue.config.sweeper_config());
        *queue.sweeper.lock().unwrap_or_else(PoisonError::into_inner) = Some(sweeper);

        info!(
            dir = %queue.dir.display(),
            sweep_interval_ms = queue.config.sweep_interval.as_millis(),
            "Persistent queue opened"
        );

        Ok(queue)
    }

    /// The queue's directory.
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// The expiration side index backing this queue.
    pub fn expiration_index(&self) -> &ExpirationIndex {
        &self.index
    }

    /// Registers a notification listener.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns cumulative operation counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueue_count.load(Ordering::Relaxed),
            dequeued: self.dequeue_count.load(Ordering::Relaxed),
            deleted: self.delete_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
            clears: self.clear_count.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // ENQUEUE / DEQUEUE
    // ========================================================================

    /// Writes `payload` as a new entry and returns its key.
    ///
    /// With `expiry` set, the entry is also recorded in the expiration index
    /// and the sweeper removes it once that instant has passed. Zero-length
    /// payloads are allowed.
    pub async fn enqueue(
        &self,
        payload: impl Into<Bytes>,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<String> {
        self.enqueue_inner(payload.into(), expiry, None).await
    }

    /// Like [`enqueue`](Self::enqueue), but gives up without writing anything
    /// if `token` fires while waiting for the gate.
    pub async fn enqueue_cancellable(
        &self,
        payload: impl Into<Bytes>,
        expiry: Option<DateTime<Utc>>,
        token: &CancellationToken,
    ) -> Result<String> {
        self.enqueue_inner(payload.into(), expiry, Some(token)).await
    }

    async fn enqueue_inner(
        &self,
        payload: Bytes,
        expiry: Option<DateTime<Utc>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        self.ensure_open()?;

        let key = self.generate_key();
        let path = self.entry_path(&key);

        {
            let _guard = self.gate.enter(cancel).await?;
            write_entry(&path, &payload).await?;
        }

        if let Some(at) = expiry {
            if let Err(e) = self.index.add(&key, at).await {
                warn!(key = %key, error = %e, "Could not record expiration, rolling back entry");
                let _guard = self.gate.acquire().await;
                if let Err(rollback) = remove_entry_file(&path).await {
                    warn!(key = %key, error = %rollback, "Rollback failed, entry left behind");
                    self.report(rollback);
                }
                return Err(e);
            }
        }

        self.enqueue_count.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, bytes = payload.len(), expires = expiry.is_some(), "Entry queued");
        self.events.emit(QueueEvent::Queued { key: key.clone() });

        Ok(key)
    }

    /// Reads an entry.
    ///
    /// With `key` set, reads that entry and fails with
    /// [`QueueError::KeyNotFound`] if it does not exist. Without a key, reads
    /// the most recently modified entry and returns `Ok(None)` when the queue
    /// is empty.
    ///
    /// With `purge` set, the entry file and its expiration record are removed
    /// after the read.
    pub async fn dequeue(&self, key: Option<&str>, purge: bool) -> Result<Option<DequeuedEntry>> {
        self.dequeue_inner(key, purge, None).await
    }

    /// Like [`dequeue`](Self::dequeue), but gives up without reading or
    /// removing anything if `token` fires while waiting for the gate.
    pub async fn dequeue_cancellable(
        &self,
        key: Option<&str>,
        purge: bool,
        token: &CancellationToken,
    ) -> Result<Option<DequeuedEntry>> {
        self.dequeue_inner(key, purge, Some(token)).await
    }

    async fn dequeue_inner(
        &self,
        key: Option<&str>,
        purge: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<DequeuedEntry>> {
        self.ensure_open()?;
        if let Some(key) = key {
            self.validate_key(key)?;
        }

        let entry = {
            let _guard = self.gate.enter(cancel).await?;

            let key = match key {
                Some(key) => key.to_string(),
                None => match self.latest_key().await? {
                    Some(latest) => latest,
                    None => return Ok(None),
                },
            };

            let path = self.entry_path(&key);
            let payload = match tokio::fs::read(&path).await {
                Ok(data) => Bytes::from(data),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(QueueError::KeyNotFound(key));
                }
                Err(e) => return Err(e.into()),
            };

            if purge {
                tokio::fs::remove_file(&path).await?;
            }

            DequeuedEntry { key, payload }
        };

        if purge {
            self.drop_expiration_quietly(&entry.key).await;
        }

        self.dequeue_count.fetch_add(1, Ordering::Relaxed);
        debug!(key = %entry.key, bytes = entry.payload.len(), purge = purge, "Entry dequeued");
        self.events.emit(QueueEvent::Dequeued {
            key: entry.key.clone(),
        });

        if purge {
            self.delete_count.fetch_add(1, Ordering::Relaxed);
            self.events.emit(QueueEvent::Deleted {
                key: entry.key.clone(),
            });
        }

        Ok(Some(entry))
    }

    // ========================================================================
    // PURGE / EXPIRE
    // ========================================================================

    /// Removes an entry and its expiration record.
    ///
    /// Idempotent: purging an absent key succeeds and returns `false`.
    /// Returns `true` when an entry file was actually removed.
    pub async fn purge(&self, key: &str) -> Result<bool> {
        self.purge_inner(key, None).await
    }

    /// Like [`purge`](Self::purge), but gives up without removing anything
    /// if `token` fires while waiting for the gate.
    pub async fn purge_cancellable(&self, key: &str, token: &CancellationToken) -> Result<bool> {
        self.purge_inner(key, Some(token)).await
    }

    async fn purge_inner(&self, key: &str, cancel: Option<&CancellationToken>) -> Result<bool> {
        self.ensure_open()?;
        self.validate_key(key)?;

        let removed = self.purge_entry(key, cancel).await?;
        self.drop_expiration_quietly(key).await;
        Ok(removed)
    }

    /// Removes `key`'s expiration record, then purges the entry.
    ///
    /// Emits an expired notification when a record existed. Returns `true`
    /// when an entry file was removed. This is what the sweeper calls for
    /// each record that has come due.
    pub async fn expire(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        self.validate_key(key)?;

        let had_record = self.index.remove(key).await?;
        let removed = self.purge_entry(key, None).await?;

        if had_record {
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, removed = removed, "Entry expired");
            self.events.emit(QueueEvent::Expired {
                key: key.to_string(),
            });
        }

        Ok(removed)
    }

    /// Returns the expiration instant recorded for `key`, if any.
    ///
    /// The entry itself does not need to exist.
    pub async fn get_expiration(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        self.ensure_open()?;
        if key.is_empty() {
            return Err(QueueError::invalid("key must not be empty"));
        }
        self.index.lookup(key).await
    }

    /// Drops `key`'s expiration record without touching the entry.
    ///
    /// Returns `true` if a record existed. No expired notification is sent.
    pub async fn remove_expiration(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        if key.is_empty() {
            return Err(QueueError::invalid("key must not be empty"));
        }
        self.index.remove(key).await
    }

    /// Lists every outstanding expiration record.
    pub async fn expirations(&self) -> Result<Vec<ExpirationRecord>> {
        self.ensure_open()?;
        self.index.entries().await
    }

    // ========================================================================
    // QUEUE-WIDE OPERATIONS
    // ========================================================================

    /// Destructively empties the queue: every file and subdirectory in the
    /// queue directory is deleted, the expiration index included.
    pub async fn clear(&self) -> Result<()> {
        self.clear_inner(None).await
    }

    /// Like [`clear`](Self::clear), but gives up without deleting anything
    /// if `token` fires while waiting for the gate.
    pub async fn clear_cancellable(&self, token: &CancellationToken) -> Result<()> {
        self.clear_inner(Some(token)).await
    }

    async fn clear_inner(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        self.ensure_open()?;
        self.wipe(cancel).await
    }

    /// Number of entries in the queue.
    pub async fn depth(&self) -> Result<u64> {
        self.ensure_open()?;
        let _guard = self.gate.acquire().await;
        Ok(self.scan().await?.0)
    }

    /// Total payload bytes across all entries.
    pub async fn length(&self) -> Result<u64> {
        self.ensure_open()?;
        let _guard = self.gate.acquire().await;
        Ok(self.scan().await?.1)
    }

    /// Stops the background sweeper without closing the queue.
    ///
    /// Expirations stay recorded but nothing enforces them until the queue
    /// is reopened.
    pub fn stop_sweeper(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.stop();
        }
    }

    /// Releases the queue.
    ///
    /// Stops the sweeper and, if `clear_on_close` is configured, deletes all
    /// content and the queue directory itself. Every later operation fails
    /// with [`QueueError::Closed`]. Once a close has succeeded, closing again
    /// is a no-op; after a failed one, the next call retries the deletion.
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.stop_sweeper();

        let mut released = self.released.lock().await;
        if *released {
            return Ok(());
        }

        if self.config.clear_on_close {
            self.wipe(None).await?;
            match tokio::fs::remove_dir_all(&self.dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        *released = true;
        info!(
            dir = %self.dir.display(),
            cleared = self.config.clear_on_close,
            "Persistent queue closed"
        );
        Ok(())
    }

    /// Sends a diagnostic notification.
    pub(crate) fn report(&self, err: QueueError) {
        self.events.emit(QueueEvent::Diagnostic(err));
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }

    /// Rejects keys that cannot name an entry file in this directory.
    fn validate_key(&self, key: &str) -> Result<()> {
        if key == self.config.expiry_file_name {
            return Err(QueueError::invalid(format!(
                "key '{}' is reserved for the expiration index",
                key
            )));
        }
        check_file_name(key).map_err(|reason| QueueError::invalid(format!("key {}", reason)))
    }

    fn generate_key(&self) -> String {
        loop {
            let key = Uuid::new_v4().to_string();
            if key != self.config.expiry_file_name {
                return key;
            }
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn is_reserved(&self, name: &OsStr) -> bool {
        name == OsStr::new(&self.config.expiry_file_name)
    }

    /// Removes the entry file under the gate and notifies on removal.
    async fn purge_entry(&self, key: &str, cancel: Option<&CancellationToken>) -> Result<bool> {
        let removed = {
            let _guard = self.gate.enter(cancel).await?;
            remove_entry_file(&self.entry_path(key)).await?
        };

        if removed {
            self.delete_count.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Entry deleted");
            self.events.emit(QueueEvent::Deleted {
                key: key.to_string(),
            });
        }

        Ok(removed)
    }

    /// Drops an expiration record after its entry is gone. A failure only
    /// leaves a stale record behind, so it is reported instead of returned.
    async fn drop_expiration_quietly(&self, key: &str) {
        if let Err(e) = self.index.remove(key).await {
            warn!(key = %key, error = %e, "Could not remove expiration record");
            self.report(e);
        }
    }

    /// Deletes everything in the directory while holding both gates.
    async fn wipe(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        {
            let _guard = self.gate.enter(cancel).await?;
            let _index_guard = self.index.hold().await;

            let mut entries = tokio::fs::read_dir(&self.dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let result = if entry.file_type().await?.is_dir() {
                    tokio::fs::remove_dir_all(&path).await
                } else {
                    tokio::fs::remove_file(&path).await
                };
                match result {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.clear_count.fetch_add(1, Ordering::Relaxed);
        debug!(dir = %self.dir.display(), "Queue cleared");
        self.events.emit(QueueEvent::Cleared);
        Ok(())
    }

    /// Returns `(entry count, total bytes)`. Caller must hold the gate.
    async fn scan(&self) -> Result<(u64, u64)> {
        let mut count = 0u64;
        let mut bytes = 0u64;

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if self.is_reserved(&entry.file_name()) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if metadata.is_file() {
                count += 1;
                bytes += metadata.len();
            }
        }

        Ok((count, bytes))
    }

    /// Key of the most recently modified entry. Ties on modification time
    /// go to the lexicographically greatest key. Caller must hold the gate.
    async fn latest_key(&self) -> Result<Option<String>> {
        let mut latest: Option<(SystemTime, String)> = None;

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if self.is_reserved(&name) {
                continue;
            }
            // Still counted by depth, but never a valid key to hand out
            let Ok(name) = name.into_string() else {
                continue;
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified()?;
            let candidate = (modified, name);
            if latest.as_ref().map_or(true, |best| candidate > *best) {
                latest = Some(candidate);
            }
        }

        Ok(latest.map(|(_, name)| name))
    }
}

/// Checks that `name` is usable as a single file name inside a directory.
fn check_file_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("must not be empty");
    }
    if name == "." || name == ".." {
        return Err("must not be a relative directory reference");
    }
    if name.contains(['/', '\\', '\0']) {
        return Err("must not contain path separators or NUL");
    }
    if name.chars().any(char::is_whitespace) {
        return Err("must not contain whitespace");
    }
    Ok(())
}

/// Creates a brand-new entry file; an existing file is never overwritten.
async fn write_entry(path: &Path, payload: &[u8]) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let written = match file.write_all(payload).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        // Don't leave a truncated entry behind
        drop(file);
        let _ = tokio::fs::remove_file(path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Removes an entry file. A missing file is not an error.
async fn remove_entry_file(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
