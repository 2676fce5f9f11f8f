//! Draft create, patch and delete, document patches
//!
//! A new draft's file is created first; if anything after it fails the
//! file is deleted again through a [`Saga`] and the row is rolled back.
//!
//! Patches are validated in full before anything changes. Sharing,
//! header rewrites and notifications then run against the merged record
//! while the datastore transaction is still open; any failure there rolls
//! the transaction back and nothing is committed. Renames are logged only.

use crate::context::RequestContext;
use crate::engine::{traced, traced_in, EngineInner, WorkflowEngine};
use crate::error::{ConflictKind, WorkflowError};
use crate::patch::{
    authorize_document_patch, authorize_draft_owner, validate_new_draft, DocumentPatch,
    DraftPatch, NewDraft, PatchActor, PatchPlan,
};
use crate::saga::Saga;
use crate::tasks::BackgroundTask;
use chrono::Utc;
use docflow_ports::{IndexKind, ShareRole, TemplateKind, Transaction};
use docflow_record::{
    DocNumber, DocumentId, DocumentRecord, DocumentRow, DocumentSnapshot, DocumentStatus,
    DocumentTypeDef, Product,
};
use std::sync::Arc;
use tracing::Span;

impl WorkflowEngine {
    /// Author a new draft owned by the caller
    ///
    /// # Errors
    /// - validation errors for the title, document type, product or
    ///   custom fields, before anything is created
    /// - collaborator or persistence errors, after the new file is deleted
    pub async fn create_draft(
        &self,
        ctx: &RequestContext,
        request: NewDraft,
    ) -> Result<DocumentRecord, WorkflowError> {
        traced_in(ctx.creation_span(), "create draft", async {
            let doc_type = validate_new_draft(&request, &self.inner.config.document_types)?;

            let mut tx = self.inner.begin().await?;
            let mut saga = Saga::new("create_draft");
            let outcome = Arc::clone(&self.inner)
                .run_create_draft(tx.as_mut(), ctx.user(), doc_type, request, &mut saga)
                .await;

            let record = match outcome {
                Ok(record) => record,
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

            tracing::info!("created draft");
            self.submit(BackgroundTask::IndexDocument {
                record: record.clone(),
                kind: IndexKind::Drafts,
                reconcile: false,
            });
            Ok(record)
        })
        .await
    }

    /// Patch a published document
    ///
    /// # Errors
    /// - [`ConflictKind::NotPublished`] for drafts
    /// - authorization errors from [`authorize_document_patch`]
    /// - validation and transition errors before any change
    /// - [`ConflictKind::Locked`] once the patch is known to be valid
    /// - collaborator or persistence errors, with nothing committed
    pub async fn patch_document(
        &self,
        ctx: &RequestContext,
        id: &DocumentId,
        patch: DocumentPatch,
    ) -> Result<DocumentRecord, WorkflowError> {
        traced(ctx, id, "patch document", async {
            let mut tx = self.inner.begin().await?;
            let result = self
                .inner
                .run_patch_document(tx.as_mut(), id, ctx.user(), patch)
                .await;
            let record = self.inner.finish(tx, result).await?;

            self.submit(BackgroundTask::IndexDocument {
                record: record.clone(),
                kind: IndexKind::Documents,
                reconcile: true,
            });
            Ok(record)
        })
        .await
    }

    /// Patch a draft as its owner
    ///
    /// # Errors
    /// - [`ConflictKind::NotWip`] unless the document is a draft
    /// - [`crate::AuthorizationKind::NotOwner`] for anyone but the owner
    /// - validation errors, including an unknown product
    /// - [`ConflictKind::Locked`], collaborator and persistence errors
    pub async fn patch_draft(
        &self,
        ctx: &RequestContext,
        id: &DocumentId,
        patch: DraftPatch,
    ) -> Result<DocumentRecord, WorkflowError> {
        traced(ctx, id, "patch draft", async {
            let mut tx = self.inner.begin().await?;
            let result = self
                .inner
                .run_patch_draft(tx.as_mut(), id, ctx.user(), patch)
                .await;
            let record = self.inner.finish(tx, result).await?;

            self.submit(BackgroundTask::IndexDocument {
                record: record.clone(),
                kind: IndexKind::Drafts,
                reconcile: false,
            });
            Ok(record)
        })
        .await
    }

    /// Delete a draft, its file and its ledger entries
    ///
    /// # Errors
    /// Same preconditions as [`WorkflowEngine::patch_draft`]; a failed
    /// file delete rolls the datastore back.
    pub async fn delete_draft(
        &self,
        ctx: &RequestContext,
        id: &DocumentId,
    ) -> Result<DocumentId, WorkflowError> {
        traced(ctx, id, "delete draft", async {
            let mut tx = self.inner.begin().await?;
            let result = self.inner.run_delete_draft(tx.as_mut(), id, ctx.user()).await;
            self.inner.finish(tx, result).await?;

            self.submit(BackgroundTask::RemoveDraft { id: id.clone() });
            Ok(id.clone())
        })
        .await
    }
}

impl EngineInner {
    fn doc_type(&self, record: &DocumentRecord) -> Result<&DocumentTypeDef, WorkflowError> {
        self.config
            .doc_type(&record.doc_type)
            .ok_or_else(|| WorkflowError::Internal(format!("unknown document type {}", record.doc_type)))
    }

    async fn share_with(
        &self,
        id: &DocumentId,
        emails: &[String],
        role: &'static str,
    ) -> Result<(), WorkflowError> {
        for email in emails {
            self.storage
                .share_file(id, email, ShareRole::Writer)
                .await
                .map_err(WorkflowError::collaborator("share file"))?;
            tracing::debug!(email = %email, role, "shared document");
        }
        if !emails.is_empty() {
            tracing::info!(count = emails.len(), role, "shared document");
        }
        Ok(())
    }

    /// Revoke every permission `email` holds on the file
    async fn remove_sharing(&self, id: &DocumentId, email: &str) -> Result<(), WorkflowError> {
        let permissions = self
            .storage
            .list_permissions(id)
            .await
            .map_err(WorkflowError::collaborator("list permissions"))?;
        for permission in permissions.iter().filter(|p| p.email == email) {
            self.storage
                .delete_permission(id, &permission.id)
                .await
                .map_err(WorkflowError::collaborator("delete permission"))?;
        }
        Ok(())
    }

    async fn rename(&self, record: &DocumentRecord) {
        let name = record.file_name();
        if let Err(error) = self.storage.rename_file(&record.id, &name).await {
            tracing::error!(%error, name = %name, "error renaming file");
        }
    }

    async fn notify_new_owner(&self, record: &DocumentRecord, owner: &str) -> Result<(), WorkflowError> {
        let data = self.notification(record);
        self.notify(TemplateKind::NewOwner, owner, &data)
            .await
            .map_err(WorkflowError::collaborator("send new owner email"))?;
        tracing::info!(new_owner = owner, "new owner email sent");
        Ok(())
    }

    async fn run_patch_document(
        &self,
        tx: &mut dyn Transaction,
        id: &DocumentId,
        user: &str,
        patch: DocumentPatch,
    ) -> Result<DocumentRecord, WorkflowError> {
        let (mut record, snapshot) = self.load(tx, id).await?;
        if record.status == DocumentStatus::Wip {
            return Err(WorkflowError::conflict(ConflictKind::NotPublished));
        }
        let actor = authorize_document_patch(user, &record, &patch)?;
        if actor == PatchActor::SelfRemovingApprover {
            tracing::info!(approver = user, "approver removing themselves");
        }
        let plan = PatchPlan::for_document(&record, self.doc_type(&record)?, patch)?;
        self.check_lock(id).await?;

        let mut row = snapshot.row;
        let mut ledger = snapshot.ledger;
        let now = Utc::now();
        plan.apply(&mut record, &mut row, now)?;
        if let Some(status) = plan.status() {
            tracing::info!(status = %status, "document status changed");
        }

        if let Some(owner) = &plan.new_owner {
            self.share_with(id, std::slice::from_ref(owner), "owner").await?;
        }
        self.share_with(id, &plan.new_approvers, "approver").await?;
        self.share_with(id, &plan.new_approver_groups, "approver group")
            .await?;

        self.rewrite_header(&record, false)
            .await
            .map_err(WorkflowError::collaborator("rewrite header"))?;
        self.rename(&record).await;

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

        if let Some(owner) = &plan.new_owner {
            self.notify_new_owner(&record, owner).await?;
        }
        let data = self.notification(&record);
        for approver in plan.new_approvers.iter().chain(&plan.new_approver_groups) {
            self.notify(TemplateKind::ReviewRequested, approver, &data)
                .await
                .map_err(WorkflowError::collaborator("send review requested email"))?;
            tracing::info!(approver = %approver, "doc approver email sent");
        }
        Ok(record)
    }

    async fn run_create_draft(
        self: Arc<Self>,
        tx: &mut dyn Transaction,
        user: &str,
        doc_type: &DocumentTypeDef,
        request: NewDraft,
        saga: &mut Saga,
    ) -> Result<DocumentRecord, WorkflowError> {
        let product = self
            .resolve_product(tx, Some(request.product.as_str()))
            .await?
            .ok_or_else(|| WorkflowError::Validation("product is required".to_string()))?;

        let name = format!(
            "[{}] {}",
            DocNumber::unassigned(product.abbreviation.clone()),
            request.title
        );
        let file = self
            .storage
            .create_file(&name, &self.config.folders.drafts, doc_type.template.clone())
            .await
            .map_err(WorkflowError::collaborator("create draft file"))?;
        {
            let storage = Arc::clone(&self.storage);
            let id = file.id.clone();
            saga.register("create draft file", move || async move {
                storage.delete_file(&id).await
            });
        }
        Span::current().record("doc_id", file.id.as_str());

        let mut record =
            DocumentRecord::draft(file.id.clone(), request.title, &doc_type.name, &product, user);
        record.contributors = request.contributors;
        record.summary = request.summary;
        for field in request.custom_fields {
            record.upsert_custom_field(field)?;
        }
        record.set_created_at(file.modified_time);
        record.modified_time = file.modified_time.timestamp();

        self.rewrite_header(&record, true)
            .await
            .map_err(WorkflowError::collaborator("rewrite header"))?;

        tx.upsert_document(&DocumentRow::from_record(&record, file.modified_time))
            .await
            .map_err(WorkflowError::persistence("create document"))?;

        let owners = [user.to_string()];
        self.share_with(&record.id, &owners, "owner").await?;
        self.share_with(&record.id, &record.contributors, "contributor")
            .await?;
        Ok(record)
    }

    /// Resolve a requested product; an empty name means no change
    async fn resolve_product(
        &self,
        tx: &mut dyn Transaction,
        name: Option<&str>,
    ) -> Result<Option<Product>, WorkflowError> {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        let product = tx
            .get_product(name)
            .await
            .map_err(WorkflowError::persistence("get product"))?;
        match product {
            Some(product) => Ok(Some(product)),
            None => {
                tracing::warn!(product = name, "invalid product");
                Err(WorkflowError::Validation("invalid product".to_string()))
            }
        }
    }

    /// Draft must exist, be WIP and belong to `user`
    async fn load_own_draft(
        &self,
        tx: &mut dyn Transaction,
        id: &DocumentId,
        user: &str,
    ) -> Result<(DocumentRecord, DocumentSnapshot), WorkflowError> {
        let (record, snapshot) = self.load(tx, id).await?;
        if record.status != DocumentStatus::Wip {
            return Err(WorkflowError::conflict(ConflictKind::NotWip));
        }
        authorize_draft_owner(user, &record)?;
        Ok((record, snapshot))
    }

    async fn run_patch_draft(
        &self,
        tx: &mut dyn Transaction,
        id: &DocumentId,
        user: &str,
        mut patch: DraftPatch,
    ) -> Result<DocumentRecord, WorkflowError> {
        let (mut record, snapshot) = self.load_own_draft(tx, id, user).await?;
        let product = self.resolve_product(tx, patch.product.take().as_deref()).await?;
        let plan = PatchPlan::for_draft(&record, self.doc_type(&record)?, patch, product)?;
        self.check_lock(id).await?;

        let previous_owners = record.owners.clone();
        let mut row = snapshot.row;
        plan.apply(&mut record, &mut row, Utc::now())?;
        if let Some(product) = plan.product() {
            tracing::info!(product = %product.name, "draft moved to another product");
        }

        if let Some(owner) = &plan.new_owner {
            self.share_with(id, std::slice::from_ref(owner), "owner").await?;
        }
        self.share_with(id, &plan.added_contributors, "contributor")
            .await?;
        for contributor in &plan.removed_contributors {
            if previous_owners.contains(contributor) || record.is_owner(contributor) {
                continue;
            }
            self.remove_sharing(id, contributor).await?;
            tracing::debug!(contributor = %contributor, "removed contributor access");
        }

        tx.upsert_document(&row)
            .await
            .map_err(WorkflowError::persistence("update document"))?;
        self.rewrite_header(&record, true)
            .await
            .map_err(WorkflowError::collaborator("rewrite header"))?;
        self.rename(&record).await;

        if let Some(owner) = &plan.new_owner {
            self.notify_new_owner(&record, owner).await?;
        }
        Ok(record)
    }

    async fn run_delete_draft(
        &self,
        tx: &mut dyn Transaction,
        id: &DocumentId,
        user: &str,
    ) -> Result<(), WorkflowError> {
        self.load_own_draft(tx, id, user).await?;
        self.check_lock(id).await?;
        tx.delete_document(id)
            .await
            .map_err(WorkflowError::persistence("delete document"))?;
        self.storage
            .delete_file(id)
            .await
            .map_err(WorkflowError::collaborator("delete file"))?;
        tracing::info!("draft deleted");
        Ok(())
    }
}
