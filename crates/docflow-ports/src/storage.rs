//! Storage and collaboration provider
//!
//! The provider owns the document files: revisions, folders, sharing,
//! group membership, the advisory lock and the visible header block.
//! Adapters that cannot edit document content report it through
//! [`StorageCapabilities`] rather than failing at call time.

use crate::error::PortResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_record::{CustomField, DocumentId, DocumentRecord};
use serde::{Deserialize, Serialize};

/// File metadata reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: DocumentId,
    pub name: String,
    pub folder: String,
    pub modified_time: DateTime<Utc>,
}

/// A stored revision of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub modified_time: DateTime<Utc>,
}

/// Access role granted on a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareRole {
    Reader,
    Commenter,
    Writer,
}

/// An access grant on a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub email: String,
    pub role: ShareRole,
}

/// Optional provider features
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageCapabilities {
    /// Provider can rewrite the header block inside the document
    pub header_rewrite: bool,
}

impl Default for StorageCapabilities {
    fn default() -> Self {
        Self {
            header_rewrite: true,
        }
    }
}

/// Metadata rendered into the document's visible header block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMetadata {
    pub title: String,
    pub doc_number: String,
    pub doc_type: String,
    pub status: String,
    pub owners: Vec<String>,
    pub approvers: Vec<String>,
    pub approved_by: Vec<String>,
    pub changes_requested_by: Vec<String>,
    pub contributors: Vec<String>,
    pub product: String,
    pub created: String,
    pub summary: String,
    pub custom_fields: Vec<CustomField>,
    pub document_url: String,
    /// Drafts render without review state
    pub draft: bool,
}

impl HeaderMetadata {
    #[must_use]
    pub fn from_record(record: &DocumentRecord, document_url: impl Into<String>, draft: bool) -> Self {
        Self {
            title: record.title.clone(),
            doc_number: record.doc_number.to_string(),
            doc_type: record.doc_type.clone(),
            status: record.status.to_string(),
            owners: record.owners.clone(),
            approvers: record.approvers.clone(),
            approved_by: record.approved_by.clone(),
            changes_requested_by: record.changes_requested_by.clone(),
            contributors: record.contributors.clone(),
            product: record.product.clone(),
            created: record.created.clone(),
            summary: record.summary.clone(),
            custom_fields: record.custom_fields.clone(),
            document_url: document_url.into(),
            draft,
        }
    }
}

/// Storage/collaboration provider
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait StorageProvider: Send + Sync + 'static {
    /// Optional features supported by this provider
    fn capabilities(&self) -> StorageCapabilities;

    async fn get_file(&self, id: &DocumentId) -> PortResult<FileMetadata>;

    /// Create a file named `name` in `folder`, copied from `template` when given
    async fn create_file(
        &self,
        name: &str,
        folder: &str,
        template: Option<String>,
    ) -> PortResult<FileMetadata>;

    async fn get_latest_revision(&self, id: &DocumentId) -> PortResult<Revision>;

    /// Pin a revision so the provider never prunes it
    async fn keep_revision_forever(&self, id: &DocumentId, revision_id: &str) -> PortResult<()>;

    async fn unmark_keep_forever(&self, id: &DocumentId, revision_id: &str) -> PortResult<()>;

    async fn move_file(&self, id: &DocumentId, dest_folder: &str) -> PortResult<()>;

    /// Create a shortcut to the file in `folder`, returning the shortcut id
    async fn create_shortcut(&self, id: &DocumentId, folder: &str) -> PortResult<String>;

    /// Find `name` under `parent`, creating it when absent; returns the folder id
    async fn get_or_create_subfolder(&self, parent: &str, name: &str) -> PortResult<String>;

    async fn share_file(&self, id: &DocumentId, email: &str, role: ShareRole) -> PortResult<()>;

    async fn list_permissions(&self, id: &DocumentId) -> PortResult<Vec<Permission>>;

    async fn delete_permission(&self, id: &DocumentId, permission_id: &str) -> PortResult<()>;

    async fn rename_file(&self, id: &DocumentId, name: &str) -> PortResult<()>;

    async fn delete_file(&self, id: &DocumentId) -> PortResult<()>;

    /// Groups `email` belongs to
    async fn list_user_groups(&self, email: &str) -> PortResult<Vec<String>>;

    /// Advisory lock owned by the provider
    async fn is_locked(&self, id: &DocumentId) -> PortResult<bool>;

    async fn rewrite_header(&self, id: &DocumentId, metadata: &HeaderMetadata) -> PortResult<()>;
}
