//! Collaborator error type

use docflow_record::RecordError;

/// Result alias for collaborator calls
pub type PortResult<T> = Result<T, PortError>;

/// Errors reported by collaborators
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// Requested object does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Collaborator rejected or failed the call
    #[error("{operation} failed: {message}")]
    Failed {
        operation: &'static str,
        message: String,
    },

    /// Transaction was already finished or could not be used
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Stored data could not be interpreted
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

impl PortError {
    #[inline]
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn failed(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            operation,
            message: message.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<RecordError> for PortError {
    fn from(err: RecordError) -> Self {
        Self::Corrupt(err.to_string())
    }
}
