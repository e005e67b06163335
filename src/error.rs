//! Error Types
//!
//! Every fallible operation in pqueue returns [`QueueError`]. Foreground
//! calls surface these directly; the background sweeper reports them through
//! the diagnostic notification instead.

use thiserror::Error;

/// Errors produced by the queue, its expiration index, and the registry.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A required input was missing, empty, or otherwise unusable
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested entry key does not exist in the queue directory
    #[error("the specified key '{0}' does not exist")]
    KeyNotFound(String),

    /// No queue is registered under the given name
    #[error("a queue with name '{0}' could not be found")]
    QueueNotFound(String),

    /// A queue is already registered under the given name
    #[error("a queue already exists with name '{0}'")]
    QueueExists(String),

    /// A line of the expiration index could not be parsed
    #[error("corrupt expiration record at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cancellation token fired before the gate was acquired
    #[error("operation cancelled")]
    Cancelled,

    /// The queue has been closed
    #[error("queue is closed")]
    Closed,
}

impl QueueError {
    /// Returns true for the recoverable "identifier is absent" failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::KeyNotFound(_) | QueueError::QueueNotFound(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        QueueError::InvalidArgument(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(QueueError::KeyNotFound("k".into()).is_not_found());
        assert!(QueueError::QueueNotFound("q".into()).is_not_found());
        assert!(!QueueError::QueueExists("q".into()).is_not_found());
        assert!(!QueueError::Cancelled.is_not_found());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            QueueError::KeyNotFound("abc".into()).to_string(),
            "the specified key 'abc' does not exist"
        );
        assert_eq!(
            QueueError::Corrupt {
                line: 3,
                reason: "bad timestamp".into()
            }
            .to_string(),
            "corrupt expiration record at line 3: bad timestamp"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: QueueError = io.into();
        assert!(matches!(err, QueueError::Io(_)));
    }
}
