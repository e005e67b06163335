//! Storage Engine Module
//!
//! This module provides the persistence core of pqueue: a directory-backed
//! entry store, its side index of expiring entries, and the background
//! sweeper that enforces those expirations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PersistentQueue                         │
//! │  ┌──────────────────────────┐   ┌────────────────────────┐  │
//! │  │  Entry files (one/key)   │   │  ExpirationIndex       │  │
//! │  │  Gate                    │   │  Gate  (.expire file)  │  │
//! │  └──────────────────────────┘   └────────────────────────┘  │
//! │                  │ EventBus (listeners)                     │
//! └──────────────────┼──────────────────────────────────────────┘
//!                    ▲
//!                    │ expire(key)
//!      ┌─────────────┴─────────────┐
//!      │     ExpirySweeper         │
//!      │  (Background Tokio Task)  │
//!      └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **One file per entry**: payloads survive process restarts
//! - **Two gates**: entry files and the expiration index are serialized
//!   independently
//! - **Expiry**: entries can carry an absolute expiration instant
//! - **Active Expiry**: a background sweeper purges entries once due
//! - **Notifications**: synchronous listeners fire after each committed change
//!
//! ## Example
//!
//! ```no_run
//! use pqueue::storage::{PersistentQueue, QueueConfig};
//! use chrono::{Duration, Utc};
//!
//! # async fn demo() -> pqueue::Result<()> {
//! let queue = PersistentQueue::open("./data/jobs", QueueConfig::default()).await?;
//!
//! // Basic operations
//! let key = queue.enqueue("payload", None).await?;
//! assert_eq!(queue.depth().await?, 1);
//!
//! // Enqueue with expiry
//! let at = Utc::now() + Duration::minutes(5);
//! queue.enqueue("session", Some(at)).await?;
//!
//! // Read the newest entry and remove it
//! let newest = queue.dequeue(None, true).await?;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod expiry;
pub mod gate;
pub mod index;
pub mod queue;

// Re-export commonly used types
pub use events::{EventBus, Listener, QueueEvent};
pub use expiry::{ExpirySweeper, SweeperConfig, DEFAULT_SWEEP_INTERVAL, MIN_SWEEP_INTERVAL};
pub use gate::{Gate, GateGuard};
pub use index::{ExpirationIndex, ExpirationRecord};
pub use queue::{DequeuedEntry, PersistentQueue, QueueConfig, QueueStats, DEFAULT_EXPIRY_FILE};
