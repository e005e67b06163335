//! Command Shell Module
//!
//! A thin line-oriented front end for exercising a queue by hand. Each input
//! line is split into words, dispatched to a queue operation, and answered
//! with a [`Reply`].
//!
//! ```text
//!   stdin line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  split_args()   │
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  dispatch / validate / execute
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ PersistentQueue │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `ENQUEUE <data> [ttl-seconds]`
//! - `DEQUEUE [key] [PURGE]`
//! - `PURGE <key>`, `EXPIRE <key>`
//! - `EXPIRATION <key>`, `PERSIST <key>`
//! - `DEPTH`, `LENGTH`, `CLEAR`, `STATS`, `HELP`

pub mod handler;
pub mod reply;

pub use handler::{is_quit, split_args, CommandHandler};
pub use reply::Reply;
