//! Request review
//!
//! Moves a draft into review. The datastore changes happen inside one
//! transaction; every external side effect registers a compensation on a
//! [`Saga`] as soon as it succeeds. On failure, including a failed commit,
//! the compensations run in reverse order and then the transaction is
//! rolled back.

use crate::context::RequestContext;
use crate::engine::{traced, EngineInner, WorkflowEngine};
use crate::error::{ConflictKind, WorkflowError};
use crate::saga::Saga;
use crate::tasks::BackgroundTask;
use chrono::Utc;
use docflow_ports::{redirect_key, ShareRole, TemplateKind, Transaction};
use docflow_record::{DocNumber, DocumentId, DocumentRecord, DocumentStatus, FileRevision};
use std::sync::Arc;

/// Label of the revision pinned when review is requested
pub const REQUESTED_REVIEW_LABEL: &str = "Requested review";

/// Review was requested and committed
struct Requested {
    record: DocumentRecord,
    subscribers: Vec<String>,
}

impl WorkflowEngine {
    /// Move a draft into review and assign its document number
    ///
    /// # Errors
    /// - [`WorkflowError::NotFound`] if the document or its lock state
    ///   cannot be read
    /// - [`ConflictKind::Locked`] or [`ConflictKind::NotWip`] conflicts
    /// - collaborator or persistence errors after compensation
    pub async fn request_review(
        &self,
        ctx: &RequestContext,
        id: &DocumentId,
    ) -> Result<DocumentRecord, WorkflowError> {
        traced(ctx, id, "request review", self.request_review_in_span(id)).await
    }

    async fn request_review_in_span(&self, id: &DocumentId) -> Result<DocumentRecord, WorkflowError> {
        self.inner.check_lock(id).await?;

        let mut tx = self.inner.begin().await?;
        let mut saga = Saga::new("request_review");
        let outcome = Arc::clone(&self.inner)
            .run_request_review(tx.as_mut(), id, &mut saga)
            .await;

        let requested = match outcome {
            Ok(requested) => requested,
            Err(err) => {
                let failure = saga.fail(err).await;
                self.inner.rollback(tx).await;
                return Err(failure.into_error());
            }
        };

        if let Err(source) = tx.commit().await {
            let failure = saga.fail(WorkflowError::persistence("commit")(source)).await;
            return Err(failure.into_error());
        }
        saga.complete();

        let Requested {
            record,
            subscribers,
        } = requested;
        tracing::info!(doc_number = %record.doc_number, "review requested");
        self.submit(BackgroundTask::PublishDocument {
            record: record.clone(),
            subscribers,
        });
        Ok(record)
    }
}

impl EngineInner {
    async fn run_request_review(
        self: Arc<Self>,
        tx: &mut dyn Transaction,
        id: &DocumentId,
        saga: &mut Saga,
    ) -> Result<Requested, WorkflowError> {
        let (mut record, snapshot) = self.load(tx, id).await?;
        if record.status != DocumentStatus::Wip {
            tracing::warn!(status = %record.status, "document is not in WIP status");
            return Err(WorkflowError::conflict(ConflictKind::NotWip));
        }
        let mut row = snapshot.row;
        let mut ledger = snapshot.ledger;
        let product = snapshot.product;

        // Read inside the transaction so concurrent requests cannot share a number.
        let latest = tx
            .latest_document_number(&product.name, &record.doc_type)
            .await
            .map_err(WorkflowError::persistence("get latest document number"))?;
        let now = Utc::now();
        record.set_created_at(now);
        record.doc_number = DocNumber::next_after(product.abbreviation.clone(), latest);
        record.status = DocumentStatus::InReview;

        self.rewrite_header(&record, false)
            .await
            .map_err(WorkflowError::collaborator("rewrite header"))?;
        {
            let inner = Arc::clone(&self);
            let mut reverted = record.clone();
            reverted.doc_number = DocNumber::unassigned(product.abbreviation.clone());
            reverted.status = DocumentStatus::Wip;
            saga.register("rewrite header", move || async move {
                inner.rewrite_header(&reverted, true).await
            });
        }

        let file = self
            .storage
            .get_file(id)
            .await
            .map_err(WorkflowError::collaborator("get file"))?;
        record.modified_time = file.modified_time.timestamp();

        let revision = self
            .storage
            .get_latest_revision(id)
            .await
            .map_err(WorkflowError::collaborator("get latest revision"))?;
        self.storage
            .keep_revision_forever(id, &revision.id)
            .await
            .map_err(WorkflowError::collaborator("keep revision forever"))?;
        {
            let storage = Arc::clone(&self.storage);
            let (id, rev_id) = (id.clone(), revision.id.clone());
            saga.register("keep revision forever", move || async move {
                storage.unmark_keep_forever(&id, &rev_id).await
            });
        }
        tracing::debug!(rev_id = %revision.id, "pinned latest revision");

        let file_revision = FileRevision {
            document_id: id.clone(),
            revision_id: revision.id.clone(),
            label: REQUESTED_REVIEW_LABEL.to_string(),
        };
        tx.create_file_revision(&file_revision)
            .await
            .map_err(WorkflowError::persistence("create file revision"))?;
        record.set_file_revision(revision.id, REQUESTED_REVIEW_LABEL);

        self.storage
            .move_file(id, &self.config.folders.documents)
            .await
            .map_err(WorkflowError::collaborator("move file"))?;
        {
            let storage = Arc::clone(&self.storage);
            let id = id.clone();
            let drafts = self.config.folders.drafts.clone();
            saga.register("move file", move || async move {
                storage.move_file(&id, &drafts).await
            });
        }

        // Left in place on failure; folders and shortcuts are harmless.
        let type_folder = self
            .storage
            .get_or_create_subfolder(&self.config.folders.shortcuts, &record.doc_type)
            .await
            .map_err(WorkflowError::collaborator("get or create doc type shortcut folder"))?;
        let product_folder = self
            .storage
            .get_or_create_subfolder(&type_folder, &product.name)
            .await
            .map_err(WorkflowError::collaborator("get or create product shortcut folder"))?;
        self.storage
            .create_shortcut(id, &product_folder)
            .await
            .map_err(WorkflowError::collaborator("create shortcut"))?;

        let link = redirect_key(&record.doc_type, &record.doc_number.to_string());
        self.redirects
            .save_link(&link, id)
            .await
            .map_err(WorkflowError::collaborator("save redirect link"))?;
        {
            let redirects = Arc::clone(&self.redirects);
            saga.register("save redirect link", move || async move {
                redirects.delete_link(&link).await
            });
        }

        row.status = record.status;
        row.document_number = record.doc_number.persisted_sequence();
        row.created_at = now;
        row.modified_at = file.modified_time;
        tx.upsert_document(&row)
            .await
            .map_err(WorkflowError::persistence("update document"))?;

        ledger.ensure_requested(&record.approvers, now);
        for group in &record.approver_groups {
            ledger.record_group(group, now);
        }
        tx.save_ledger(&ledger)
            .await
            .map_err(WorkflowError::persistence("save review ledger"))?;

        for email in record.approvers.iter().chain(&record.approver_groups) {
            self.storage
                .share_file(id, email, ShareRole::Writer)
                .await
                .map_err(WorkflowError::collaborator("share file"))?;
            tracing::debug!(approver = %email, "shared document with approver");
        }

        let data = self.notification(&record);
        for approver in record.approvers.iter().chain(&record.approver_groups) {
            self.notify(TemplateKind::ReviewRequested, approver, &data)
                .await
                .map_err(WorkflowError::collaborator("send review requested email"))?;
            tracing::info!(approver = %approver, "doc approver email sent");
        }

        Ok(Requested {
            record,
            subscribers: product.subscribers,
        })
    }
}
