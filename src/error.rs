//! Error taxonomy.
//!
//! Backends classify every failure into a closed [`ErrorKind`]. Collection
//! encoders absorb [`ErrorKind::ConditionFailed`] into semantic results
//! (`false`, exclusion from an added-set, a skipped push); everything else is
//! surfaced unchanged. No store call is retried.

use crate::value::Value;

/// Result type for all store and command operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by backends and commands.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Conditional check failed")]
    ConditionFailed,

    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Key is inside the reserved namespace: {0}")]
    ReservedKey(String),

    #[error("Malformed stored item: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A non-atomic multi-step command stopped part way.
    ///
    /// `completed` steps took effect before `source` was hit; cleanup is the
    /// caller's responsibility. `pending` holds a value a completed step
    /// removed from the store and the failed step never wrote back.
    #[error("Stopped after {completed} completed step(s): {source}")]
    Partial {
        completed: usize,
        pending: Option<Value>,
        #[source]
        source: Box<Error>,
    },
}

/// Closed classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A conditional write's precondition did not hold.
    ConditionFailed,
    /// Concurrent transaction interference. Safe to retry.
    TransactionConflict,
    /// Network or service failure.
    Transport,
    /// The request itself was invalid (bad value, argument, key or config).
    InvalidRequest,
    /// A stored item could not be decoded.
    Corrupt,
}

impl Error {
    /// Classify this error. `Partial` reports the kind of its first failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConditionFailed => ErrorKind::ConditionFailed,
            Error::TransactionConflict(_) => ErrorKind::TransactionConflict,
            Error::Transport(_) => ErrorKind::Transport,
            Error::UnsupportedValue(_)
            | Error::InvalidArgument(_)
            | Error::ReservedKey(_)
            | Error::Config(_) => ErrorKind::InvalidRequest,
            Error::Decode(_) => ErrorKind::Corrupt,
            Error::Partial { source, .. } => source.kind(),
        }
    }

    /// True when the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransactionConflict
    }

    /// True when a conditional write was rejected.
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, Error::ConditionFailed)
    }

    /// Wrap `self` as the failure of a multi-step command after `completed` steps.
    ///
    /// An existing `Partial` absorbs the count instead of nesting, and a
    /// failure before any step completed stays a plain error.
    pub fn after(self, completed: usize) -> Error {
        match self {
            Error::Partial {
                completed: inner,
                pending,
                source,
            } => Error::Partial {
                completed: completed + inner,
                pending,
                source,
            },
            other if completed == 0 => other,
            other => Error::Partial {
                completed,
                pending: None,
                source: Box::new(other),
            },
        }
    }

    /// Like [`Error::after`], also recording `value` as removed but not
    /// written back.
    pub fn stranding(self, completed: usize, value: Value) -> Error {
        let (completed, source) = match self.after(completed) {
            Error::Partial {
                completed, source, ..
            } => (completed, source),
            other => (0, Box::new(other)),
        };
        Error::Partial {
            completed,
            pending: Some(value),
            source,
        }
    }

    /// The value a partially applied command removed and did not restore.
    pub fn pending(&self) -> Option<&Value> {
        match self {
            Error::Partial { pending, .. } => pending.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::ConditionFailed.kind(), ErrorKind::ConditionFailed);
        assert_eq!(
            Error::TransactionConflict("busy".into()).kind(),
            ErrorKind::TransactionConflict
        );
        assert_eq!(Error::Transport("reset".into()).kind(), ErrorKind::Transport);
        assert_eq!(
            Error::ReservedKey("k".into()).kind(),
            ErrorKind::InvalidRequest
        );
        assert_eq!(Error::Decode("bad".into()).kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn test_only_transaction_conflicts_are_retryable() {
        assert!(Error::TransactionConflict("x".into()).is_retryable());
        assert!(!Error::ConditionFailed.is_retryable());
        assert!(!Error::Transport("x".into()).is_retryable());
    }

    #[test]
    fn test_partial_reports_inner_kind() {
        let err = Error::Transport("timeout".into()).after(3);
        assert_eq!(err.kind(), ErrorKind::Transport);
        match err {
            Error::Partial { completed, .. } => assert_eq!(completed, 3),
            other => panic!("expected Partial, got {other:?}"),
        }
    }

    #[test]
    fn test_after_zero_keeps_existing_partial() {
        let inner = Error::Transport("x".into()).after(2);
        match inner.after(0) {
            Error::Partial { completed, .. } => assert_eq!(completed, 2),
            other => panic!("expected Partial, got {other:?}"),
        }
    }

    #[test]
    fn test_after_zero_leaves_plain_error() {
        assert!(matches!(
            Error::Transport("x".into()).after(0),
            Error::Transport(_)
        ));
    }

    #[test]
    fn test_after_merges_nested_partial() {
        let err = Error::Transport("down".into()).after(2).after(1);
        match err {
            Error::Partial {
                completed, source, ..
            } => {
                assert_eq!(completed, 3);
                assert!(matches!(*source, Error::Transport(_)));
            }
            other => panic!("expected Partial, got {other:?}"),
        }
    }

    #[test]
    fn test_stranding_keeps_the_removed_value() {
        let err = Error::Transport("down".into()).stranding(1, Value::from("b"));
        assert_eq!(err.pending(), Some(&Value::from("b")));
        assert_eq!(err.kind(), ErrorKind::Transport);
        match err {
            Error::Partial {
                completed, source, ..
            } => {
                assert_eq!(completed, 1);
                assert!(matches!(*source, Error::Transport(_)));
            }
            other => panic!("expected Partial, got {other:?}"),
        }
        assert_eq!(Error::ConditionFailed.pending(), None);
    }
}
