//! Error types for the store and notifier capabilities.

use thiserror::Error;

/// Errors raised by a `Store` implementation.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// A write or read against the backing store failed.
    #[error("Persistence failed during {operation}: {reason}")]
    PersistenceFailed { operation: String, reason: String },

    /// A row could not be decoded into its domain type.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl StoreError {
    /// Build a persistence failure for the named operation.
    pub fn persistence(operation: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::PersistenceFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Get error code for logs and telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::PersistenceFailed { .. } => "PERSISTENCE_FAILED",
            StoreError::Decode(_) => "DECODE_ERROR",
        }
    }
}

/// Errors raised by a `Notifier` implementation.
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_error_message() {
        let err = StoreError::persistence("upsert_rate", "connection reset");
        assert_eq!(
            err.to_string(),
            "Persistence failed during upsert_rate: connection reset"
        );
        assert_eq!(err.error_code(), "PERSISTENCE_FAILED");
    }
}
