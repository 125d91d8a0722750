//! Error types for the Tasklane engine.

use crate::TaskId;
use thiserror::Error;

/// All possible errors from the Tasklane engine.
///
/// The engine never performs I/O, so every variant describes either a
/// reference to state that does not exist or input that cannot be read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("invalid category: {0}")]
    InvalidCategory(String),

    // Input errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid backup format: {0}")]
    InvalidBackupFormat(String),
}

impl Error {
    /// Whether the error only reports an unknown task id.
    ///
    /// Callers resolve ids from a rendered list, so a task that vanished in
    /// between (for example removed by a merge) is expected and ignorable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::TaskNotFound(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::TaskNotFound("task-1".into());
        assert_eq!(err.to_string(), "task not found: task-1");

        let err = Error::InvalidCategory("later".into());
        assert_eq!(err.to_string(), "invalid category: later");

        let err = Error::InvalidBackupFormat("missing 'categories' key".into());
        assert_eq!(
            err.to_string(),
            "invalid backup format: missing 'categories' key"
        );
    }

    #[test]
    fn not_found_is_ignorable() {
        assert!(Error::TaskNotFound("x".into()).is_not_found());
        assert!(!Error::InvalidSnapshot("x".into()).is_not_found());
    }
}
