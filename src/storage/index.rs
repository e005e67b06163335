//! Expiration Index
//!
//! A small flat file, colocated with the queue's entry files, that maps entry
//! keys to the instant they expire. One record per line:
//!
//! ```text
//! 6f1c0e52-8a0b-4a52-9d53-2a8f4c4f0b7e 2026-10-17T12:00:00.000000000Z
//! 0b8f5f0d-5f5c-4b86-8b9d-3c1c8e1f2a44 2026-10-17T12:05:30.250000000Z
//! ```
//!
//! Timestamps are RFC 3339 in UTC, so the file reads the same regardless of
//! the host's locale or timezone.
//!
//! Every operation loads the whole file, changes it in memory and writes it
//! back, all under the index's own gate. This keeps the format trivial and is
//! fine for the number of outstanding expirations a queue is expected to
//! carry.
//!
//! Records may outlive their entries (e.g. an entry purged directly). Such
//! stale records are harmless: expiring them purges nothing.
//!
//! A line that cannot be parsed is reported once as a
//! [`QueueError::Corrupt`] diagnostic and dropped from the file; the rest of
//! the file still loads.

use crate::error::{QueueError, Result};
use crate::storage::events::{EventBus, QueueEvent};
use crate::storage::gate::{Gate, GateGuard};
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A single expiration record.
pub type ExpirationRecord = (String, DateTime<Utc>);

/// The durable key -> expiration instant mapping for one queue.
#[derive(Debug)]
pub struct ExpirationIndex {
    /// Location of the index file
    path: PathBuf,
    /// Serializes all read-modify-write cycles on the file
    gate: Gate,
    /// Where corrupt-line diagnostics go
    events: Arc<EventBus>,
}

impl ExpirationIndex {
    pub fn new(path: impl Into<PathBuf>, events: Arc<EventBus>) -> Self {
        Self {
            path: path.into(),
            gate: Gate::new(),
            events,
        }
    }

    /// Path of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records that `key` expires at `at`, replacing any earlier record.
    pub async fn add(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.gate.acquire().await;

        let mut records = self.load().await?;
        records.retain(|(k, _)| k != key);
        records.push((key.to_string(), at));
        self.store(&records).await?;

        debug!(key = %key, expires_at = %format_instant(&at), "Expiration recorded");
        Ok(())
    }

    /// Drops the record for `key`.
    ///
    /// Returns `true` if a record existed. The file is only rewritten when
    /// something changed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.gate.acquire().await;

        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|(k, _)| k != key);

        if records.len() == before {
            return Ok(false);
        }

        self.store(&records).await?;
        debug!(key = %key, "Expiration removed");
        Ok(true)
    }

    /// Returns the expiration instant recorded for `key`, if any.
    pub async fn lookup(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let _guard = self.gate.acquire().await;

        let records = self.load().await?;
        Ok(records
            .into_iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, at)| at))
    }

    /// Returns every record in the index, in file order.
    pub async fn entries(&self) -> Result<Vec<ExpirationRecord>> {
        let _guard = self.gate.acquire().await;
        self.load().await
    }

    /// Creates an empty index file if none exists.
    ///
    /// Returns `true` if the file was created.
    pub async fn ensure_exists(&self) -> Result<bool> {
        let _guard = self.gate.acquire().await;

        let created = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await;

        match created {
            Ok(_) => {
                debug!(path = %self.path.display(), "Created empty expiration index");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Takes the index gate without doing anything else.
    ///
    /// Used by queue-wide operations that delete the index file out from
    /// under it.
    pub(crate) async fn hold(&self) -> GateGuard<'_> {
        self.gate.acquire().await
    }

    /// Reads and parses the whole file. A missing file is an empty index.
    /// Caller must hold the gate.
    async fn load(&self) -> Result<Vec<ExpirationRecord>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let text = String::from_utf8_lossy(&raw);
        let mut corrupt = 0usize;
        let records = parse_records(&text, |err| {
            corrupt += 1;
            warn!(path = %self.path.display(), error = %err, "Dropping corrupt expiration record");
            self.events.emit(QueueEvent::Diagnostic(err));
        });

        // Reported lines are gone from the file, so each is reported once.
        if corrupt > 0 {
            self.store(&records).await?;
            debug!(path = %self.path.display(), dropped = corrupt, "Rewrote expiration index");
        }

        Ok(records)
    }

    async fn store(&self, records: &[ExpirationRecord]) -> Result<()> {
        tokio::fs::write(&self.path, render_records(records)).await?;
        Ok(())
    }
}

/// Renders an instant the way the index file stores it.
pub fn format_instant(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses an instant as stored in the index file.
pub fn parse_instant(text: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc))
}

/// Parses index file contents, handing each malformed line to `on_corrupt`.
///
/// Blank lines are ignored. Line numbers in diagnostics are 1-based.
fn parse_records<F>(text: &str, mut on_corrupt: F) -> Vec<ExpirationRecord>
where
    F: FnMut(QueueError),
{
    let mut records = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 2 {
            on_corrupt(QueueError::Corrupt {
                line: idx + 1,
                reason: format!("expected 2 tokens, found {}", tokens.len()),
            });
            continue;
        }

        match parse_instant(tokens[1]) {
            Ok(at) => records.push((tokens[0].to_string(), at)),
            Err(e) => on_corrupt(QueueError::Corrupt {
                line: idx + 1,
                reason: format!("unparsable timestamp '{}': {}", tokens[1], e),
            }),
        }
    }

    records
}

fn render_records(records: &[ExpirationRecord]) -> String {
    let mut out = String::with_capacity(records.len() * 64);
    for (key, at) in records {
        out.push_str(key);
        out.push(' ');
        out.push_str(&format_instant(at));
        out.push('\n');
    }
    out
}
