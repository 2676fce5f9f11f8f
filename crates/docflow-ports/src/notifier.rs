//! Notification channel

use crate::error::PortResult;
use async_trait::async_trait;
use docflow_record::{DocumentId, DocumentRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Email template to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    ReviewRequested,
    DocumentApproved,
    NewOwner,
    SubscriberDocumentPublished,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReviewRequested => "review_requested",
            Self::DocumentApproved => "document_approved",
            Self::NewOwner => "new_owner",
            Self::SubscriberDocumentPublished => "subscriber_document_published",
        };
        f.write_str(name)
    }
}

/// Values available to templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub document_id: DocumentId,
    pub document_title: String,
    pub document_number: String,
    pub document_type: String,
    pub document_url: String,
    pub product: String,
    pub owner: String,
    /// User whose action triggered the notification
    pub actor: Option<String>,
    pub from_address: String,
}

impl NotificationData {
    #[must_use]
    pub fn for_record(
        record: &DocumentRecord,
        document_url: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            document_id: record.id.clone(),
            document_title: record.title.clone(),
            document_number: record.doc_number.to_string(),
            document_type: record.doc_type.clone(),
            document_url: document_url.into(),
            product: record.product.clone(),
            owner: record.owner().unwrap_or_default().to_string(),
            actor: None,
            from_address: from_address.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Sends templated notifications
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(
        &self,
        template: TemplateKind,
        recipients: &[String],
        data: &NotificationData,
    ) -> PortResult<()>;
}
