//! Docflow Record - document model of the workflow engine
//!
//! Plain values with no I/O:
//! - [`DocumentRecord`] and the normalized [`DocumentRow`]
//! - The status state machine ([`validate_transition`])
//! - Document numbers (`TST-001`, `TST-???`)
//! - Per-reviewer [`ReviewLedger`]
//! - Document types and their custom fields

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod custom_field;
pub mod document;
pub mod error;
pub mod ledger;
pub mod number;
pub mod status;

pub use custom_field::{
    find_doc_type, lower_camel, upsert_persisted, CustomField, CustomFieldDef, CustomFieldType,
    CustomFieldValue, DocumentTypeDef, PersistedCustomField,
};
pub use document::{
    DocumentId, DocumentRecord, DocumentRow, DocumentSnapshot, FileRevision, Product, SearchObject,
};
pub use error::RecordError;
pub use ledger::{GroupReviewEntry, ReviewEntry, ReviewLedger, ReviewStatus};
pub use number::{index_number_matches, normalize_index_number, DocNumber};
pub use status::{allowed_transitions, validate_transition, DocumentStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
