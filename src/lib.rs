//! # pqueue - A Disk-Backed Persistent Queue
//!
//! pqueue stores discrete byte payloads as individual files under a
//! directory. Entries survive process restarts, can be read with or without
//! removal, and can carry an expiration instant after which a background
//! sweeper discards them.
//!
//! It is meant to be embedded in a single process that needs durable
//! buffering without running a database.
//!
//! ## Features
//!
//! - **Durable**: one file per entry, named by a random UUID key
//! - **Expiry**: optional absolute expiration per entry, enforced by a
//!   background Tokio task
//! - **Concurrent**: operations on one queue are serialized through a gate,
//!   with cancellable waits
//! - **Notifications**: synchronous listeners for queued, dequeued, deleted,
//!   expired, cleared, and diagnostic events
//! - **Registry**: address several queues by name
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               pqueue                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────────┐ │
//! │  │   Shell     │───>│  Command    │───>│       PersistentQueue        │ │
//! │  │ (main.rs)   │    │  Handler    │    │  ┌──────────┐ ┌───────────┐  │ │
//! │  └─────────────┘    └─────────────┘    │  │ entries  │ │ .expire   │  │ │
//! │                                        │  │ (Gate)   │ │ (Gate)    │  │ │
//! │  ┌─────────────┐                       │  └──────────┘ └───────────┘  │ │
//! │  │ Queue       │── name ──> Arc<...> ─>│                              │ │
//! │  │ Registry    │                       └──────────────▲───────────────┘ │
//! │  └─────────────┘                                      │                 │
//! │                     ┌─────────────────────────────────┴───────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use pqueue::{PersistentQueue, QueueConfig, QueueEvent, QueueRegistry};
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> pqueue::Result<()> {
//!     let queue = PersistentQueue::open("./data/outbox", QueueConfig::default()).await?;
//!
//!     queue.subscribe(|event| {
//!         if let QueueEvent::Expired { key } = event {
//!             println!("expired: {}", key);
//!         }
//!     });
//!
//!     let key = queue.enqueue("hello", Some(Utc::now() + Duration::seconds(30))).await?;
//!     let entry = queue.dequeue(Some(key.as_str()), false).await?;
//!     assert_eq!(entry.map(|e| e.payload), Some("hello".into()));
//!
//!     let registry = QueueRegistry::new();
//!     registry.add("outbox", Arc::clone(&queue))?;
//!
//!     queue.close().await
//! }
//! ```
//!
//! ## Design Highlights
//!
//! ### Most-Recent Dequeue
//!
//! Dequeue without a key returns the entry with the newest file modification
//! time. Despite the name, this is LIFO, not FIFO.
//!
//! ### Two Gates
//!
//! Entry files and the expiration index are guarded separately. Expiring an
//! entry removes its record and then its file as two steps, so a concurrent
//! reader may briefly see one without the other.
//!
//! ## Module Overview
//!
//! - [`storage`]: the queue, expiration index, sweeper, gate and events
//! - [`registry`]: named queue directory
//! - [`shell`]: command handler for the interactive binary
//! - [`error`]: error taxonomy

pub mod error;
pub mod registry;
pub mod shell;
pub mod storage;

// Re-export commonly used types for convenience
pub use error::{QueueError, Result};
pub use registry::QueueRegistry;
pub use shell::{CommandHandler, Reply};
pub use storage::{
    DequeuedEntry, ExpirySweeper, PersistentQueue, QueueConfig, QueueEvent, QueueStats,
    SweeperConfig,
};

/// Default directory used by the shell binary
pub const DEFAULT_DIRECTORY: &str = "./temp/";

/// Version of pqueue
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
