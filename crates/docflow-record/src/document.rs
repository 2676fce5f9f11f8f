//! Document records
//!
//! [`DocumentRecord`] is the denormalized view shared by the workflow and
//! the search index. [`DocumentRow`] is the normalized datastore row it is
//! rebuilt from, together with the review ledger and file revisions.

use crate::custom_field::{
    find_doc_type, CustomField, CustomFieldValue, DocumentTypeDef, PersistedCustomField,
};
use crate::error::RecordError;
use crate::ledger::ReviewLedger;
use crate::number::DocNumber;
use crate::status::DocumentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Flat object stored in the search index
pub type SearchObject = Map<String, Value>;

/// Storage file identifier of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a document id
    ///
    /// # Errors
    /// Returns [`RecordError::EmptyId`] for an empty or blank id.
    pub fn parse(id: impl Into<String>) -> Result<Self, RecordError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RecordError::EmptyId);
        }
        Ok(Self(id))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A storage revision pinned with a human label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRevision {
    pub document_id: DocumentId,
    pub revision_id: String,
    pub label: String,
}

/// Product (area) a document belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub abbreviation: String,
    /// Users notified when a document of this product is published
    #[serde(default)]
    pub subscribers: Vec<String>,
}

impl Product {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, abbreviation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            abbreviation: abbreviation.into(),
            subscribers: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_subscriber(mut self, email: impl Into<String>) -> Self {
        self.subscribers.push(email.into());
        self
    }
}

/// Denormalized document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    #[serde(rename = "objectID")]
    pub id: DocumentId,
    pub title: String,
    pub doc_type: String,
    pub doc_number: DocNumber,
    pub status: DocumentStatus,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub approvers: Vec<String>,
    #[serde(default)]
    pub approver_groups: Vec<String>,
    #[serde(default)]
    pub approved_by: Vec<String>,
    #[serde(default)]
    pub changes_requested_by: Vec<String>,
    #[serde(default)]
    pub contributors: Vec<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
    #[serde(default)]
    pub file_revisions: BTreeMap<String, String>,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub modified_time: i64,
    #[serde(default)]
    pub summary: String,
    pub product: String,
    #[serde(default)]
    pub app_created: bool,
}

impl DocumentRecord {
    /// New application-created draft
    #[must_use]
    pub fn draft(
        id: DocumentId,
        title: impl Into<String>,
        doc_type: impl Into<String>,
        product: &Product,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            doc_type: doc_type.into(),
            doc_number: DocNumber::unassigned(product.abbreviation.clone()),
            status: DocumentStatus::Wip,
            owners: vec![owner.into()],
            approvers: Vec::new(),
            approver_groups: Vec::new(),
            approved_by: Vec::new(),
            changes_requested_by: Vec::new(),
            contributors: Vec::new(),
            custom_fields: Vec::new(),
            file_revisions: BTreeMap::new(),
            created: String::new(),
            created_time: 0,
            modified_time: 0,
            summary: String::new(),
            product: product.name.clone(),
            app_created: true,
        }
    }

    /// Primary owner
    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owners.first().map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn is_owner(&self, email: &str) -> bool {
        self.owner() == Some(email)
    }

    #[inline]
    #[must_use]
    pub fn is_approver(&self, email: &str) -> bool {
        self.approvers.iter().any(|a| a == email)
    }

    #[inline]
    #[must_use]
    pub fn has_approved(&self, email: &str) -> bool {
        self.approved_by.iter().any(|a| a == email)
    }

    #[inline]
    #[must_use]
    pub fn has_requested_changes(&self, email: &str) -> bool {
        self.changes_requested_by.iter().any(|a| a == email)
    }

    /// Record an approval: add to `approved_by`, drop from `changes_requested_by`
    pub fn mark_approved_by(&mut self, email: &str) {
        self.changes_requested_by.retain(|e| e != email);
        if !self.has_approved(email) {
            self.approved_by.push(email.to_string());
        }
    }

    /// Record a change request: add to `changes_requested_by`, drop from `approved_by`
    pub fn mark_changes_requested_by(&mut self, email: &str) {
        self.approved_by.retain(|e| e != email);
        if !self.has_requested_changes(email) {
            self.changes_requested_by.push(email.to_string());
        }
    }

    pub fn set_file_revision(&mut self, revision_id: impl Into<String>, label: impl Into<String>) {
        self.file_revisions.insert(revision_id.into(), label.into());
    }

    /// Stamp creation time as `Jan 2, 2006` and Unix seconds
    pub fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created = at.format("%b %-d, %Y").to_string();
        self.created_time = at.timestamp();
    }

    /// Storage file name: `[{doc number}] {title}`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("[{}] {}", self.doc_number, self.title)
    }

    /// Upsert a custom field; an empty value removes it
    ///
    /// # Errors
    /// Returns an error if a field with the same key exists under a
    /// different display name.
    pub fn upsert_custom_field(&mut self, field: CustomField) -> Result<(), RecordError> {
        match self.custom_fields.iter().position(|cf| cf.name == field.name) {
            Some(idx) => {
                if self.custom_fields[idx].display_name != field.display_name {
                    return Err(RecordError::CustomFieldDisplayName {
                        field: field.name.clone(),
                        expected: self.custom_fields[idx].display_name.clone(),
                        actual: field.display_name,
                    });
                }
                if field.value.is_empty() {
                    self.custom_fields.remove(idx);
                } else {
                    self.custom_fields[idx] = field;
                }
            }
            None if field.value.is_empty() => {}
            None => self.custom_fields.push(field),
        }
        Ok(())
    }

    /// Custom field value by key
    #[must_use]
    pub fn custom_field(&self, key: &str) -> Option<&CustomFieldValue> {
        self.custom_fields
            .iter()
            .find(|cf| cf.name == key)
            .map(|cf| &cf.value)
    }

    /// Flat object stored in the search index
    ///
    /// Custom fields are lifted to top-level keys and empty collections
    /// are omitted.
    #[must_use]
    pub fn to_search_object(&self) -> SearchObject {
        let mut obj = match serde_json::to_value(self) {
            Ok(Value::Object(obj)) => obj,
            _ => Map::new(),
        };
        obj.remove("customFields");
        obj.retain(|_, v| match v {
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        });
        for cf in &self.custom_fields {
            let value = match &cf.value {
                CustomFieldValue::Text(s) => Value::String(s.clone()),
                CustomFieldValue::People(p) => {
                    Value::Array(p.iter().cloned().map(Value::String).collect())
                }
            };
            obj.insert(cf.name.clone(), value);
        }
        obj
    }

    /// Rebuild a record from its persisted parts
    ///
    /// # Errors
    /// Returns an error if the document type is unknown or a persisted
    /// custom field cannot be decoded.
    pub fn from_snapshot(
        snapshot: &DocumentSnapshot,
        doc_types: &[DocumentTypeDef],
    ) -> Result<Self, RecordError> {
        let row = &snapshot.row;
        let doc_type = find_doc_type(doc_types, &row.doc_type)
            .ok_or_else(|| RecordError::UnknownDocType(row.doc_type.clone()))?;

        let mut custom_fields = Vec::with_capacity(row.custom_fields.len());
        for persisted in &row.custom_fields {
            // Fields whose declaration was removed from configuration are dropped.
            if let Some(def) = doc_type.field_by_display_name(&persisted.display_name) {
                custom_fields.push(persisted.decode(def)?);
            }
        }

        let mut record = Self {
            id: row.id.clone(),
            title: row.title.clone(),
            doc_type: row.doc_type.clone(),
            doc_number: DocNumber::from_persisted(
                snapshot.product.abbreviation.clone(),
                row.document_number,
            ),
            status: row.status,
            owners: row.owner.iter().cloned().collect(),
            approvers: row.approvers.clone(),
            approver_groups: row.approver_groups.clone(),
            approved_by: current_approvers(snapshot.ledger.approved_by(), &row.approvers),
            changes_requested_by: current_approvers(
                snapshot.ledger.changes_requested_by(),
                &row.approvers,
            ),
            contributors: row.contributors.clone(),
            custom_fields,
            file_revisions: snapshot
                .file_revisions
                .iter()
                .map(|r| (r.revision_id.clone(), r.label.clone()))
                .collect(),
            created: String::new(),
            created_time: 0,
            modified_time: row.modified_at.timestamp(),
            summary: row.summary.clone().unwrap_or_default(),
            product: snapshot.product.name.clone(),
            app_created: !row.imported,
        };
        record.set_created_at(row.created_at);
        Ok(record)
    }
}

// Decisions of users removed from the approver list are kept in the
// ledger but no longer shown.
fn current_approvers(mut users: Vec<String>, approvers: &[String]) -> Vec<String> {
    users.retain(|u| approvers.contains(u));
    users
}

/// Normalized document row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: DocumentId,
    pub title: String,
    pub doc_type: String,
    pub product: String,
    /// `0` while unassigned
    pub document_number: u32,
    pub status: DocumentStatus,
    pub owner: Option<String>,
    pub approvers: Vec<String>,
    pub approver_groups: Vec<String>,
    pub contributors: Vec<String>,
    pub custom_fields: Vec<PersistedCustomField>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub imported: bool,
}

impl DocumentRow {
    /// Row mirroring a record's persisted columns
    #[must_use]
    pub fn from_record(record: &DocumentRecord, created_at: DateTime<Utc>) -> Self {
        let mut custom_fields = Vec::new();
        for cf in &record.custom_fields {
            crate::custom_field::upsert_persisted(
                &mut custom_fields,
                &record.doc_type,
                &cf.display_name,
                &cf.value,
            );
        }
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            doc_type: record.doc_type.clone(),
            product: record.product.clone(),
            document_number: record.doc_number.persisted_sequence(),
            status: record.status,
            owner: record.owner().map(str::to_string),
            approvers: record.approvers.clone(),
            approver_groups: record.approver_groups.clone(),
            contributors: record.contributors.clone(),
            custom_fields,
            created_at,
            modified_at: DateTime::from_timestamp(record.modified_time, 0).unwrap_or(created_at),
            summary: (!record.summary.is_empty()).then(|| record.summary.clone()),
            imported: !record.app_created,
        }
    }
}

/// Everything the datastore holds about one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub row: DocumentRow,
    pub product: Product,
    pub ledger: ReviewLedger,
    pub file_revisions: Vec<FileRevision>,
}
