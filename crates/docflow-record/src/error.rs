//! Error types for document records
//!
//! Every error here is raised before any external state is touched:
//! records are plain values and never perform I/O.

use crate::status::DocumentStatus;

/// Errors raised while building, validating or mutating records
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Document identifier was empty
    #[error("document id must not be empty")]
    EmptyId,

    /// Status string is not a known status
    #[error("unknown document status: {0:?}")]
    UnknownStatus(String),

    /// Status may not be used as a patch target
    #[error("status {0} is not a valid patch target")]
    InvalidPatchTarget(DocumentStatus),

    /// State machine rejected the transition
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// Document number could not be parsed
    #[error("invalid document number: {0:?}")]
    InvalidDocNumber(String),

    /// Custom field is not declared for the document type
    #[error("custom field {field:?} is not declared for document type {doc_type:?}")]
    UnknownCustomField { doc_type: String, field: String },

    /// Custom field display name does not match its declaration
    #[error("invalid display name {actual:?} for custom field {field:?} (expected {expected:?})")]
    CustomFieldDisplayName {
        field: String,
        expected: String,
        actual: String,
    },

    /// Custom field type does not match its declaration
    #[error("invalid type for custom field {0:?}")]
    CustomFieldType(String),

    /// Custom field value does not match its declared type
    #[error("invalid value type for custom field {0:?}")]
    CustomFieldValue(String),

    /// Persisted custom field value could not be decoded
    #[error("corrupt persisted value for custom field {field:?}: {message}")]
    CorruptCustomField { field: String, message: String },

    /// Document type is not configured
    #[error("unknown document type: {0:?}")]
    UnknownDocType(String),

    /// User already approved the document
    #[error("document already approved by {0}")]
    AlreadyApproved(String),

    /// User already requested changes of the document
    #[error("document already has changes requested by {0}")]
    AlreadyRequestedChanges(String),

    /// Ledger entry belongs to another document
    #[error("review entry for {entry} does not belong to document {document}")]
    ForeignReview { document: String, entry: String },
}
