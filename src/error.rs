// Error taxonomy for the posting core
//
// Three failure classes, kept deliberately narrow:
// - Validation: bad input (zero amount, unmapped category) - never retried
// - Storage: SQLite failure - caller may retry the whole operation
// - Consistency: the double-entry invariant broke after generation; this
//   indicates a bug and is fatal to that transaction's operation

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Input rejected before anything was written.
    #[error("validation error: {0}")]
    Validation(String),

    /// Underlying SQLite failure; the unit of work was rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Debits and credits did not balance after generation. Must never
    /// happen under a correct implementation; surfaced, never swallowed.
    #[error("consistency error: {0}")]
    Consistency(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        CoreError::Consistency(msg.into())
    }

    /// True when retrying the same unit of work could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Storage(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = CoreError::validation("zero-amount transaction");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("zero-amount"));
    }

    #[test]
    fn storage_errors_are_retryable() {
        let err = CoreError::from(rusqlite::Error::InvalidQuery);
        assert!(err.is_retryable());
    }
}
