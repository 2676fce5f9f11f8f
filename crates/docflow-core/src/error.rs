//! Error types for the workflow engine
//!
//! Every terminal error maps to one HTTP status and one short public
//! message:
//! - Validation, authorization and conflict errors are raised before any
//!   state is mutated
//! - Collaborator and persistence errors may follow external side effects
//!   and can require saga compensation
//!
//! Consistency warnings are not errors; see [`crate::reconcile`].

use docflow_ports::PortError;
use docflow_record::RecordError;
use http::StatusCode;
use std::fmt;

/// Why an actor may not perform an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationKind {
    /// Only the document owner may do this
    NotOwner,
    /// Caller is not an approver of the document
    NotApprover,
    /// Caller may not apply this patch
    PatchForbidden,
}

impl fmt::Display for AuthorizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotOwner => "only the document owner can do this",
            Self::NotApprover => "only approvers can do this",
            Self::PatchForbidden => "only owners can patch documents; approvers may only remove themselves",
        })
    }
}

/// Document state that prevents an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Operation requires a draft
    NotWip,
    /// Operation requires a published document
    NotPublished,
    /// Document is not accepting reviews
    NotInReview,
    /// Storage provider reports the document as locked
    Locked,
    AlreadyApproved,
    AlreadyRequestedChanges,
    /// State machine rejected the requested status
    IllegalTransition,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotWip => "document is not a draft",
            Self::NotPublished => "document is a draft",
            Self::NotInReview => "document is not in review",
            Self::Locked => "document is locked",
            Self::AlreadyApproved => "document already approved by user",
            Self::AlreadyRequestedChanges => "document already has changes requested by user",
            Self::IllegalTransition => "status change not allowed",
        })
    }
}

/// Main workflow error type
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Malformed or disallowed request
    #[error("validation failed: {0}")]
    Validation(String),

    /// Wrong actor for the requested change
    #[error("not authorized: {kind}")]
    Authorization { kind: AuthorizationKind },

    /// Document state does not permit the operation
    #[error("conflict: {kind}")]
    Conflict { kind: ConflictKind },

    /// Document missing or lock check failed
    #[error("not found: {0}")]
    NotFound(String),

    /// A collaborator call failed
    #[error("{step} failed: {source}")]
    Collaborator {
        step: &'static str,
        #[source]
        source: PortError,
    },

    /// A datastore read, write or commit failed
    #[error("{step} failed: {source}")]
    Persistence {
        step: &'static str,
        #[source]
        source: PortError,
    },

    /// Stored data could not be turned into a document
    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    #[inline]
    #[must_use]
    pub fn authorization(kind: AuthorizationKind) -> Self {
        Self::Authorization { kind }
    }

    #[inline]
    #[must_use]
    pub fn conflict(kind: ConflictKind) -> Self {
        Self::Conflict { kind }
    }

    /// Adapter for `map_err` on collaborator calls
    #[inline]
    pub fn collaborator(step: &'static str) -> impl FnOnce(PortError) -> Self {
        move |source| Self::Collaborator { step, source }
    }

    /// Adapter for `map_err` on datastore calls
    #[inline]
    pub fn persistence(step: &'static str) -> impl FnOnce(PortError) -> Self {
        move |source| Self::Persistence { step, source }
    }

    /// HTTP status surfaced to the caller
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authorization { kind } => match kind {
                AuthorizationKind::PatchForbidden => StatusCode::FORBIDDEN,
                AuthorizationKind::NotOwner | AuthorizationKind::NotApprover => {
                    StatusCode::UNAUTHORIZED
                }
            },
            Self::Conflict { kind } => match kind {
                ConflictKind::Locked => StatusCode::LOCKED,
                _ => StatusCode::BAD_REQUEST,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Collaborator { .. } | Self::Persistence { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short message safe to return to the client
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => format!("Bad request: {msg}"),
            Self::Authorization { kind } => format!("Unauthorized: {kind}"),
            Self::Conflict { kind } => capitalize(&kind.to_string()),
            Self::NotFound(_) => "Document not found".to_string(),
            Self::Collaborator { .. } | Self::Persistence { .. } | Self::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }

    /// Raised before any state was mutated
    #[inline]
    #[must_use]
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Authorization { .. }
                | Self::Conflict { .. }
                | Self::NotFound(_)
        )
    }

    /// Log at `warn` for pre-mutation errors and `error` otherwise
    pub fn log(&self, operation: &'static str) {
        if self.is_pre_mutation() {
            tracing::warn!(error = %self, operation, "request rejected");
        } else {
            tracing::error!(error = %self, operation, "request failed");
        }
    }

    /// May follow external side effects that need undoing
    #[inline]
    #[must_use]
    pub fn requires_compensation(&self) -> bool {
        matches!(self, Self::Collaborator { .. } | Self::Persistence { .. })
    }
}

impl From<RecordError> for WorkflowError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::AlreadyApproved(_) => Self::conflict(ConflictKind::AlreadyApproved),
            RecordError::AlreadyRequestedChanges(_) => {
                Self::conflict(ConflictKind::AlreadyRequestedChanges)
            }
            RecordError::IllegalTransition { .. } => {
                Self::conflict(ConflictKind::IllegalTransition)
            }
            RecordError::EmptyId
            | RecordError::UnknownStatus(_)
            | RecordError::InvalidPatchTarget(_)
            | RecordError::InvalidDocNumber(_)
            | RecordError::UnknownCustomField { .. }
            | RecordError::CustomFieldDisplayName { .. }
            | RecordError::CustomFieldType(_)
            | RecordError::CustomFieldValue(_) => Self::Validation(err.to_string()),
            RecordError::CorruptCustomField { .. }
            | RecordError::UnknownDocType(_)
            | RecordError::ForeignReview { .. } => Self::Internal(err.to_string()),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_record::DocumentStatus;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            WorkflowError::Validation("owners".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WorkflowError::authorization(AuthorizationKind::PatchForbidden).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            WorkflowError::authorization(AuthorizationKind::NotApprover).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            WorkflowError::conflict(ConflictKind::Locked).status_code(),
            StatusCode::LOCKED
        );
        assert_eq!(
            WorkflowError::conflict(ConflictKind::NotWip).status_code(),
            StatusCode::BAD_REQUEST
        );
        let err = WorkflowError::collaborator("move file")(PortError::failed("move_file", "boom"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.requires_compensation());
    }

    #[test]
    fn public_message_hides_internal_detail() {
        let err = WorkflowError::persistence("commit")(PortError::Transaction(
            "deadlock on documents_pkey".into(),
        ));
        assert_eq!(err.public_message(), "Internal server error");
        assert!(err.to_string().contains("deadlock"));
    }

    #[test]
    fn record_errors_map_to_taxonomy() {
        let err: WorkflowError = RecordError::AlreadyApproved("a@x".into()).into();
        assert!(matches!(
            err,
            WorkflowError::Conflict {
                kind: ConflictKind::AlreadyApproved
            }
        ));
        let err: WorkflowError = RecordError::InvalidPatchTarget(DocumentStatus::Wip).into();
        assert!(err.is_pre_mutation());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
