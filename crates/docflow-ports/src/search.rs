//! Search index provider
//!
//! Two logical indexes hold flat document objects: one for drafts and one
//! for published documents. Redirect links live in their own store.

use crate::error::PortResult;
use async_trait::async_trait;
use docflow_record::DocumentId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Logical index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Drafts,
    Documents,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drafts => f.write_str("drafts"),
            Self::Documents => f.write_str("documents"),
        }
    }
}

/// Search index client
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync + 'static {
    /// Save an object; `objectID` is taken from the object itself
    async fn index(&self, kind: IndexKind, object: Map<String, Value>) -> PortResult<()>;

    async fn get_object(&self, kind: IndexKind, id: &DocumentId) -> PortResult<Map<String, Value>>;

    async fn delete(&self, kind: IndexKind, id: &DocumentId) -> PortResult<()>;
}

/// Short-link redirect store
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait RedirectStore: Send + Sync + 'static {
    async fn save_link(&self, key: &str, id: &DocumentId) -> PortResult<()>;

    async fn delete_link(&self, key: &str) -> PortResult<()>;
}

/// Redirect key for a document: `{doctype}/{docnumber}`, lowercase
#[must_use]
pub fn redirect_key(doc_type: &str, doc_number: &str) -> String {
    format!("{doc_type}/{doc_number}").to_lowercase()
}
