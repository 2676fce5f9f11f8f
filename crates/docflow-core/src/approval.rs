//! Approvals and change requests
//!
//! Both decisions pin the latest storage revision with a label naming the
//! reviewer, upsert the reviewer's ledger entry and rewrite the header in
//! one transaction. No saga is needed: until the commit only the pinned
//! revision exists outside the datastore.

use crate::context::RequestContext;
use crate::engine::{traced, EngineInner, WorkflowEngine};
use crate::error::{AuthorizationKind, ConflictKind, WorkflowError};
use crate::tasks::BackgroundTask;
use chrono::Utc;
use docflow_ports::{IndexKind, TemplateKind, Transaction};
use docflow_record::{
    validate_transition, DocumentId, DocumentRecord, DocumentRow, DocumentStatus, FileRevision,
    ReviewLedger,
};
use http::Method;

/// Check whether `user` may approve `record` now
///
/// `groups` are the groups `user` belongs to.
///
/// # Errors
/// - [`ConflictKind::NotInReview`] unless the document accepts reviews
/// - [`AuthorizationKind::NotApprover`] unless `user` is an approver or a
///   member of an approver group
/// - [`ConflictKind::AlreadyApproved`] if `user` already approved
pub fn approval_permitted(
    record: &DocumentRecord,
    user: &str,
    groups: &[String],
) -> Result<(), WorkflowError> {
    if !record.status.accepts_reviews() {
        return Err(WorkflowError::conflict(ConflictKind::NotInReview));
    }
    let in_group = groups.iter().any(|g| record.approver_groups.contains(g));
    if !record.is_approver(user) && !in_group {
        return Err(WorkflowError::authorization(AuthorizationKind::NotApprover));
    }
    if record.has_approved(user) {
        return Err(WorkflowError::conflict(ConflictKind::AlreadyApproved));
    }
    Ok(())
}

/// Check whether `user` may request changes on `record` now
///
/// # Errors
/// As [`approval_permitted`], for individual approvers only.
pub fn change_request_permitted(record: &DocumentRecord, user: &str) -> Result<(), WorkflowError> {
    if !record.status.accepts_reviews() {
        return Err(WorkflowError::conflict(ConflictKind::NotInReview));
    }
    if !record.is_approver(user) {
        return Err(WorkflowError::authorization(AuthorizationKind::NotApprover));
    }
    if record.has_requested_changes(user) {
        return Err(WorkflowError::conflict(ConflictKind::AlreadyRequestedChanges));
    }
    Ok(())
}

impl WorkflowEngine {
    /// Request changes as the calling approver
    ///
    /// An approved document goes back into review.
    ///
    /// # Errors
    /// See [`change_request_permitted`]; also lock, not-found, collaborator
    /// and persistence errors.
    pub async fn request_changes(
        &self,
        ctx: &RequestContext,
        id: &DocumentId,
    ) -> Result<DocumentRecord, WorkflowError> {
        traced(ctx, id, "request changes", async {
            self.inner.check_lock(id).await?;
            let mut tx = self.inner.begin().await?;
            let result = self
                .inner
                .run_request_changes(tx.as_mut(), id, ctx.user())
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

    /// Approve as the calling approver or approver-group member
    ///
    /// A group member approving for the first time is added to the
    /// individual approvers.
    ///
    /// # Errors
    /// See [`approval_permitted`]; a failed group lookup is a collaborator
    /// error.
    pub async fn approve(
        &self,
        ctx: &RequestContext,
        id: &DocumentId,
    ) -> Result<DocumentRecord, WorkflowError> {
        traced(ctx, id, "approve", async {
            self.inner.check_lock(id).await?;
            let mut tx = self.inner.begin().await?;
            let result = self.inner.run_approve(tx.as_mut(), id, ctx.user()).await;
            let record = self.inner.finish(tx, result).await?;

            if let Some(owner) = record.owner() {
                let data = self.inner.notification(&record).with_actor(ctx.user());
                match self
                    .inner
                    .notify(TemplateKind::DocumentApproved, owner, &data)
                    .await
                {
                    Ok(()) => tracing::info!(owner, "doc approved email sent to owner"),
                    Err(error) => tracing::error!(%error, owner, "error sending approved email"),
                }
            }

            self.submit(BackgroundTask::IndexDocument {
                record: record.clone(),
                kind: IndexKind::Documents,
                reconcile: true,
            });
            Ok(record)
        })
        .await
    }

    /// Verbs the caller may use on the approvals resource right now
    ///
    /// Mirrors the approval preconditions without the lock check and
    /// without side effects. A failed group lookup yields no verbs.
    ///
    /// # Errors
    /// Returns [`WorkflowError::NotFound`] or a persistence error if the
    /// document cannot be loaded.
    pub async fn approval_options(
        &self,
        ctx: &RequestContext,
        id: &DocumentId,
    ) -> Result<Vec<Method>, WorkflowError> {
        traced(ctx, id, "approval options", async {
            let mut tx = self.inner.begin().await?;
            let loaded = self.inner.load(tx.as_mut(), id).await;
            self.inner.rollback(tx).await;
            let (record, _) = loaded?;

            let groups = match self.inner.groups_for(&record, ctx.user()).await {
                Ok(groups) => groups,
                Err(err) => {
                    tracing::warn!(error = %err, "group lookup failed, approval not offered");
                    return Ok(Vec::new());
                }
            };
            Ok(match approval_permitted(&record, ctx.user(), &groups) {
                Ok(()) => vec![Method::POST],
                Err(_) => Vec::new(),
            })
        })
        .await
    }
}

impl EngineInner {
    /// Groups of `user`, looked up only when group membership could matter
    async fn groups_for(
        &self,
        record: &DocumentRecord,
        user: &str,
    ) -> Result<Vec<String>, WorkflowError> {
        if record.is_approver(user) || record.approver_groups.is_empty() {
            return Ok(Vec::new());
        }
        self.storage
            .list_user_groups(user)
            .await
            .map_err(WorkflowError::collaborator("list user groups"))
    }

    /// Pin the latest revision under `label` and record it
    async fn pin_latest_revision(
        &self,
        tx: &mut dyn Transaction,
        record: &mut DocumentRecord,
        label: String,
    ) -> Result<(), WorkflowError> {
        let revision = self
            .storage
            .get_latest_revision(&record.id)
            .await
            .map_err(WorkflowError::collaborator("get latest revision"))?;
        self.storage
            .keep_revision_forever(&record.id, &revision.id)
            .await
            .map_err(WorkflowError::collaborator("keep revision forever"))?;
        tx.create_file_revision(&FileRevision {
            document_id: record.id.clone(),
            revision_id: revision.id.clone(),
            label: label.clone(),
        })
        .await
        .map_err(WorkflowError::persistence("create file revision"))?;
        tracing::debug!(rev_id = %revision.id, label = %label, "pinned revision");
        record.set_file_revision(revision.id, label);
        Ok(())
    }

    async fn save_decision(
        &self,
        tx: &mut dyn Transaction,
        record: &DocumentRecord,
        row: &DocumentRow,
        ledger: &ReviewLedger,
    ) -> Result<(), WorkflowError> {
        tx.save_ledger(ledger)
            .await
            .map_err(WorkflowError::persistence("save review ledger"))?;
        tx.upsert_document(row)
            .await
            .map_err(WorkflowError::persistence("update document"))?;
        self.rewrite_header(record, false)
            .await
            .map_err(WorkflowError::collaborator("rewrite header"))
    }

    async fn run_request_changes(
        &self,
        tx: &mut dyn Transaction,
        id: &DocumentId,
        user: &str,
    ) -> Result<DocumentRecord, WorkflowError> {
        let (mut record, snapshot) = self.load(tx, id).await?;
        change_request_permitted(&record, user)?;
        let mut row = snapshot.row;
        let mut ledger = snapshot.ledger;
        let now = Utc::now();

        ledger.record_change_request(user, now)?;
        record.mark_changes_requested_by(user);
        if record.status == DocumentStatus::Approved {
            validate_transition(record.status, DocumentStatus::InReview)?;
            record.status = DocumentStatus::InReview;
            row.status = DocumentStatus::InReview;
            tracing::info!("approved document moved back into review");
        }

        self.pin_latest_revision(tx, &mut record, format!("Changes requested by {user}"))
            .await?;
        self.save_decision(tx, &record, &row, &ledger).await?;
        Ok(record)
    }

    async fn run_approve(
        &self,
        tx: &mut dyn Transaction,
        id: &DocumentId,
        user: &str,
    ) -> Result<DocumentRecord, WorkflowError> {
        let (mut record, snapshot) = self.load(tx, id).await?;
        let groups = self.groups_for(&record, user).await?;
        approval_permitted(&record, user, &groups)?;
        let mut row = snapshot.row;
        let mut ledger = snapshot.ledger;
        let now = Utc::now();

        if !record.is_approver(user) {
            tracing::info!(approver = user, "promoting group approver to individual approver");
            record.approvers.push(user.to_string());
            row.approvers.push(user.to_string());
        }
        ledger.record_approval(user, now)?;
        record.mark_approved_by(user);

        self.pin_latest_revision(tx, &mut record, format!("Approved by {user}"))
            .await?;
        self.save_decision(tx, &record, &row, &ledger).await?;
        Ok(record)
    }
}
