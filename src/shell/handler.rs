//! Command Handler
//!
//! Maps shell commands onto [`PersistentQueue`] operations.
//!
//! ## Commands
//!
//! - `ENQUEUE <data> [ttl-seconds]` - Add an entry, optionally expiring
//! - `DEQUEUE [key] [PURGE]` - Read the newest (or a specific) entry
//! - `PURGE <key>` - Remove an entry
//! - `EXPIRE <key>` - Force-expire an entry
//! - `EXPIRATION <key>` - Show an entry's expiration instant
//! - `PERSIST <key>` - Drop an entry's expiration
//! - `DEPTH` - Number of entries
//! - `LENGTH` - Total payload bytes
//! - `CLEAR` - Empty the queue
//! - `STATS` - Operation counters
//! - `HELP` / `?` - This list

use crate::error::QueueError;
use crate::shell::reply::Reply;
use crate::storage::index::format_instant;
use crate::storage::PersistentQueue;
use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;

const HELP: &[&str] = &[
    "Available commands:",
    "   ENQUEUE <data> [ttl]   add to the queue, optionally expiring after ttl seconds",
    "   DEQUEUE [key] [PURGE]  read from the queue (newest entry if no key)",
    "   PURGE <key>            purge an entry from the queue",
    "   EXPIRE <key>           expire an entry now",
    "   EXPIRATION <key>       show when an entry expires",
    "   PERSIST <key>          remove an entry's expiration",
    "   DEPTH                  show the queue depth",
    "   LENGTH                 show the total bytes queued",
    "   CLEAR                  empty the queue",
    "   STATS                  show operation counters",
    "   CLS                    clear the screen",
    "   Q | QUIT               quit",
];

/// Returns true if `line` asks the shell to exit.
pub fn is_quit(line: &str) -> bool {
    matches!(line.trim().to_ascii_uppercase().as_str(), "Q" | "QUIT" | "EXIT")
}

/// Splits a command line into words.
///
/// Words are separated by whitespace. Double quotes group words and support
/// `\"`, `\\`, `\n` and `\t` escapes.
pub fn split_args(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut word = String::new();
        if first == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some('n') => word.push('\n'),
                        Some('t') => word.push('\t'),
                        Some(other) => word.push(other),
                        None => return Err("unbalanced quotes".to_string()),
                    },
                    c => word.push(c),
                }
            }
            if !closed {
                return Err("unbalanced quotes".to_string());
            }
            if chars.peek().is_some_and(|c| !c.is_whitespace()) {
                return Err("closing quote must be followed by a space".to_string());
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
        }
        args.push(word);
    }

    Ok(args)
}

/// Executes shell commands against one queue.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    queue: Arc<PersistentQueue>,
}

impl CommandHandler {
    pub fn new(queue: Arc<PersistentQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<PersistentQueue> {
        &self.queue
    }

    /// Executes one command line and returns the reply.
    pub async fn execute(&self, line: &str) -> Reply {
        let args = match split_args(line) {
            Ok(args) => args,
            Err(e) => return Reply::error(format!("ERR {}", e)),
        };

        let Some((cmd, rest)) = args.split_first() else {
            return Reply::error("ERR empty command");
        };

        self.dispatch(&cmd.to_ascii_uppercase(), rest).await
    }

    /// Dispatches a command to its handler.
    async fn dispatch(&self, cmd: &str, args: &[String]) -> Reply {
        match cmd {
            "ENQUEUE" => self.cmd_enqueue(args).await,
            "DEQUEUE" => self.cmd_dequeue(args).await,
            "PURGE" => self.cmd_purge(args).await,
            "EXPIRE" => self.cmd_expire(args).await,
            "EXPIRATION" => self.cmd_expiration(args).await,
            "PERSIST" => self.cmd_persist(args).await,
            "DEPTH" => self.cmd_depth(args).await,
            "LENGTH" => self.cmd_length(args).await,
            "CLEAR" => self.cmd_clear(args).await,
            "STATS" => self.cmd_stats(args),
            "HELP" | "?" => Reply::Lines(HELP.iter().map(|s| s.to_string()).collect()),

            // Unknown command
            _ => Reply::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Entry Commands
    // ========================================================================

    /// ENQUEUE data [ttl-seconds]
    async fn cmd_enqueue(&self, args: &[String]) -> Reply {
        if args.is_empty() || args.len() > 2 {
            return wrong_args("ENQUEUE");
        }

        let expiry = match args.get(1) {
            Some(ttl) => {
                let at = ttl
                    .parse::<i64>()
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl));
                match at {
                    Some(at) => Some(at),
                    None => return Reply::error("ERR invalid expire time"),
                }
            }
            None => None,
        };

        match self.queue.enqueue(Bytes::from(args[0].clone()), expiry).await {
            Ok(key) => Reply::Status(key),
            Err(e) => error_reply(e),
        }
    }

    /// DEQUEUE [key] [PURGE]
    async fn cmd_dequeue(&self, args: &[String]) -> Reply {
        let (key, purge) = match args {
            [] => (None, false),
            [flag] if flag.eq_ignore_ascii_case("PURGE") => (None, true),
            [key] => (Some(key.as_str()), false),
            [key, flag] if flag.eq_ignore_ascii_case("PURGE") => (Some(key.as_str()), true),
            [_, _] => return Reply::error("ERR syntax error"),
            _ => return wrong_args("DEQUEUE"),
        };

        match self.queue.dequeue(key, purge).await {
            Ok(Some(entry)) => Reply::Entry {
                key: entry.key,
                payload: entry.payload,
            },
            Ok(None) => Reply::nil(),
            Err(e) => error_reply(e),
        }
    }

    /// PURGE key
    async fn cmd_purge(&self, args: &[String]) -> Reply {
        let [key] = args else {
            return wrong_args("PURGE");
        };

        match self.queue.purge(key).await {
            Ok(removed) => Reply::integer(removed as u64),
            Err(e) => error_reply(e),
        }
    }

    /// EXPIRE key
    async fn cmd_expire(&self, args: &[String]) -> Reply {
        let [key] = args else {
            return wrong_args("EXPIRE");
        };

        match self.queue.expire(key).await {
            Ok(removed) => Reply::integer(removed as u64),
            Err(e) => error_reply(e),
        }
    }

    /// EXPIRATION key
    async fn cmd_expiration(&self, args: &[String]) -> Reply {
        let [key] = args else {
            return wrong_args("EXPIRATION");
        };

        match self.queue.get_expiration(key).await {
            Ok(Some(at)) => Reply::Status(format_instant(&at)),
            Ok(None) => Reply::nil(),
            Err(e) => error_reply(e),
        }
    }

    /// PERSIST key
    async fn cmd_persist(&self, args: &[String]) -> Reply {
        let [key] = args else {
            return wrong_args("PERSIST");
        };

        match self.queue.remove_expiration(key).await {
            Ok(removed) => Reply::integer(removed as u64),
            Err(e) => error_reply(e),
        }
    }

    // ========================================================================
    // Queue Commands
    // ========================================================================

    async fn cmd_depth(&self, args: &[String]) -> Reply {
        if !args.is_empty() {
            return wrong_args("DEPTH");
        }
        match self.queue.depth().await {
            Ok(n) => Reply::integer(n),
            Err(e) => error_reply(e),
        }
    }

    async fn cmd_length(&self, args: &[String]) -> Reply {
        if !args.is_empty() {
            return wrong_args("LENGTH");
        }
        match self.queue.length().await {
            Ok(n) => Reply::integer(n),
            Err(e) => error_reply(e),
        }
    }

    async fn cmd_clear(&self, args: &[String]) -> Reply {
        if !args.is_empty() {
            return wrong_args("CLEAR");
        }
        match self.queue.clear().await {
            Ok(()) => Reply::ok(),
            Err(e) => error_reply(e),
        }
    }

    fn cmd_stats(&self, args: &[String]) -> Reply {
        if !args.is_empty() {
            return wrong_args("STATS");
        }
        let stats = self.queue.stats();
        Reply::Lines(vec![
            format!("directory:{}", self.queue.directory().display()),
            format!("enqueued:{}", stats.enqueued),
            format!("dequeued:{}", stats.dequeued),
            format!("deleted:{}", stats.deleted),
            format!("expired:{}", stats.expired),
            format!("clears:{}", stats.clears),
        ])
    }
}

fn wrong_args(cmd: &str) -> Reply {
    Reply::error(format!("ERR wrong number of arguments for '{}' command", cmd))
}

fn error_reply(err: QueueError) -> Reply {
    Reply::error(format!("ERR {}", err))
}
