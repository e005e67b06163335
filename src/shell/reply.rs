//! Shell Reply Types
//!
//! Every shell command produces one [`Reply`]. Replies render to the
//! terminal through `Display`, loosely following redis-cli conventions:
//!
//! ```text
//! OK
//! (integer) 3
//! (nil)
//! (error) ERR the specified key 'abc' does not exist
//! ```

use bytes::Bytes;
use std::fmt;

/// The result of executing one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A short single-line status, e.g. `OK` or a generated key
    Status(String),

    /// A failure, already prefixed with an error class such as `ERR`
    Error(String),

    /// A count or size
    Integer(u64),

    /// An entry read from the queue
    Entry { key: String, payload: Bytes },

    /// Nothing to show (empty queue, no expiration)
    Nil,

    /// Multi-line text (help, stats)
    Lines(Vec<String>),
}

impl Reply {
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: u64) -> Self {
        Reply::Integer(n)
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn nil() -> Self {
        Reply::Nil
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Entry { key, payload } => {
                write!(f, "key: {}\n{}", key, String::from_utf8_lossy(payload))
            }
            Reply::Nil => write!(f, "(nil)"),
            Reply::Lines(lines) => write!(f, "{}", lines.join("\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Reply::ok().to_string(), "OK");
        assert_eq!(Reply::integer(7).to_string(), "(integer) 7");
        assert_eq!(Reply::nil().to_string(), "(nil)");
        assert_eq!(Reply::error("ERR boom").to_string(), "(error) ERR boom");
        assert_eq!(
            Reply::Entry {
                key: "k".into(),
                payload: Bytes::from("hello")
            }
            .to_string(),
            "key: k\nhello"
        );
        assert_eq!(
            Reply::Lines(vec!["a".into(), "b".into()]).to_string(),
            "a\nb"
        );
    }

    #[test]
    fn test_predicates() {
        assert!(Reply::error("x").is_error());
        assert!(!Reply::ok().is_error());
        assert!(Reply::nil().is_nil());
    }
}
