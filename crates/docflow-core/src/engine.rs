//! Workflow engine
//!
//! [`WorkflowEngine`] owns the collaborators and the background queue.
//! The workflow operations live next to their concerns:
//! - [`crate::review`] for request review
//! - [`crate::approval`] for approve, request changes and the probe
//! - [`crate::documents`] for draft create, patch and delete and document patches

use crate::config::{ConfigError, EngineConfig};
use crate::context::RequestContext;
use crate::error::{ConflictKind, WorkflowError};
use crate::reconcile::{reconcile, ConsistencyReport};
use crate::tasks::{BackgroundTask, QueueStats, TaskHandler, TaskQueue};
use async_trait::async_trait;
use docflow_ports::{
    Datastore, HeaderMetadata, IndexKind, NotificationData, Notifier, PortResult, RedirectStore,
    SearchIndex, StorageProvider, TemplateKind, Transaction,
};
use docflow_record::{DocumentId, DocumentRecord, DocumentSnapshot, ReviewEntry};
use std::future::Future;
use std::sync::Arc;
use tracing::{Instrument, Span};

/// External systems the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn StorageProvider>,
    pub search: Arc<dyn SearchIndex>,
    pub redirects: Arc<dyn RedirectStore>,
    pub datastore: Arc<dyn Datastore>,
    pub notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Shared engine state, also the background task handler
pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) storage: Arc<dyn StorageProvider>,
    pub(crate) search: Arc<dyn SearchIndex>,
    pub(crate) redirects: Arc<dyn RedirectStore>,
    pub(crate) datastore: Arc<dyn Datastore>,
    pub(crate) notifier: Arc<dyn Notifier>,
}

/// Document workflow engine
#[derive(Clone)]
pub struct WorkflowEngine {
    pub(crate) inner: Arc<EngineInner>,
    pub(crate) tasks: Arc<TaskQueue>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.inner.config)
            .field("tasks", &self.tasks.stats())
            .finish()
    }
}

impl WorkflowEngine {
    /// Validate configuration and start the background workers
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the configuration is invalid.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let background = config.background;
        let inner = Arc::new(EngineInner {
            config,
            storage: collaborators.storage,
            search: collaborators.search,
            redirects: collaborators.redirects,
            datastore: collaborators.datastore,
            notifier: collaborators.notifier,
        });
        let handler: Arc<dyn TaskHandler> = Arc::clone(&inner) as Arc<dyn TaskHandler>;
        let tasks = TaskQueue::start(background.queue_capacity, background.workers, handler);
        tracing::info!(
            workers = background.workers,
            queue_capacity = background.queue_capacity,
            "workflow engine started"
        );
        Ok(Self {
            inner,
            tasks: Arc::new(tasks),
        })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Review ledger entries of a document
    ///
    /// # Errors
    /// Returns [`WorkflowError::Persistence`] if the datastore fails.
    pub async fn reviews_for_document(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<ReviewEntry>, WorkflowError> {
        let mut tx = self.inner.begin().await?;
        let result = tx
            .find_reviews(id)
            .await
            .map_err(WorkflowError::persistence("find reviews"));
        self.inner.rollback(tx).await;
        result
    }

    /// Review ledger entries of a user across documents
    ///
    /// # Errors
    /// Returns [`WorkflowError::Persistence`] if the datastore fails.
    pub async fn reviews_for_user(&self, user: &str) -> Result<Vec<ReviewEntry>, WorkflowError> {
        let mut tx = self.inner.begin().await?;
        let result = tx
            .find_reviews_by_user(user)
            .await
            .map_err(WorkflowError::persistence("find reviews by user"));
        self.inner.rollback(tx).await;
        result
    }

    /// Compare the published index object with the datastore now
    ///
    /// # Errors
    /// Returns an error if either side cannot be read.
    pub async fn check_consistency(
        &self,
        id: &DocumentId,
    ) -> Result<ConsistencyReport, WorkflowError> {
        self.inner.check_consistency(id).await
    }

    /// Queue counters
    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.tasks.stats()
    }

    /// Wait until all queued background work is done
    pub async fn wait_idle(&self) {
        self.tasks.wait_idle().await;
    }

    /// Drain background work and stop the workers
    pub async fn shutdown(&self) {
        self.tasks.shutdown().await;
        tracing::info!("workflow engine stopped");
    }

    pub(crate) fn submit(&self, task: BackgroundTask) {
        self.tasks.submit(task);
    }
}

/// Run one operation inside the request span, logging its outcome
pub(crate) async fn traced<T, F>(
    ctx: &RequestContext,
    id: &DocumentId,
    operation: &'static str,
    work: F,
) -> Result<T, WorkflowError>
where
    F: Future<Output = Result<T, WorkflowError>>,
{
    traced_in(ctx.span(id), operation, work).await
}

/// [`traced`] inside a caller-built span
pub(crate) async fn traced_in<T, F>(
    span: Span,
    operation: &'static str,
    work: F,
) -> Result<T, WorkflowError>
where
    F: Future<Output = Result<T, WorkflowError>>,
{
    async move {
        let result = work.await;
        match &result {
            Ok(_) => tracing::info!(operation, "request completed"),
            Err(err) => err.log(operation),
        }
        result
    }
    .instrument(span)
    .await
}

impl EngineInner {
    pub(crate) async fn begin(&self) -> Result<Box<dyn Transaction>, WorkflowError> {
        self.datastore
            .begin()
            .await
            .map_err(WorkflowError::persistence("begin transaction"))
    }

    /// Roll back, logging failure
    pub(crate) async fn rollback(&self, tx: Box<dyn Transaction>) {
        if let Err(error) = tx.rollback().await {
            tracing::error!(%error, "error rolling back transaction");
        }
    }

    /// Commit on success, roll back on failure
    pub(crate) async fn finish<T>(
        &self,
        tx: Box<dyn Transaction>,
        result: Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        match result {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(WorkflowError::persistence("commit"))?;
                Ok(value)
            }
            Err(err) => {
                self.rollback(tx).await;
                Err(err)
            }
        }
    }

    /// Load a document inside `tx`
    pub(crate) async fn load(
        &self,
        tx: &mut dyn Transaction,
        id: &DocumentId,
    ) -> Result<(DocumentRecord, DocumentSnapshot), WorkflowError> {
        let snapshot = tx
            .load_snapshot(id)
            .await
            .map_err(WorkflowError::persistence("load document"))?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        let record = DocumentRecord::from_snapshot(&snapshot, &self.config.document_types)?;
        Ok((record, snapshot))
    }

    /// Fail closed: a lock check error reads as not found
    pub(crate) async fn check_lock(&self, id: &DocumentId) -> Result<(), WorkflowError> {
        match self.storage.is_locked(id).await {
            Ok(false) => Ok(()),
            Ok(true) => {
                tracing::warn!("document is locked");
                Err(WorkflowError::conflict(ConflictKind::Locked))
            }
            Err(error) => {
                tracing::error!(%error, "error checking document locked status");
                Err(WorkflowError::NotFound(id.to_string()))
            }
        }
    }

    /// Rewrite the visible header when the provider supports it
    pub(crate) async fn rewrite_header(
        &self,
        record: &DocumentRecord,
        draft: bool,
    ) -> PortResult<()> {
        if !self.storage.capabilities().header_rewrite {
            tracing::debug!("storage provider does not support header rewrite, skipping");
            return Ok(());
        }
        let url = self.config.document_url(&record.id);
        self.storage
            .rewrite_header(&record.id, &HeaderMetadata::from_record(record, url, draft))
            .await
    }

    pub(crate) fn notification(&self, record: &DocumentRecord) -> NotificationData {
        NotificationData::for_record(
            record,
            self.config.document_url(&record.id),
            self.config.email.from_address.clone(),
        )
    }

    /// Send one notification; a no-op when email is disabled
    pub(crate) async fn notify(
        &self,
        template: TemplateKind,
        recipient: &str,
        data: &NotificationData,
    ) -> PortResult<()> {
        if !self.config.email.enabled {
            return Ok(());
        }
        self.notifier
            .send(template, &[recipient.to_string()], data)
            .await
    }

    pub(crate) async fn check_consistency(
        &self,
        id: &DocumentId,
    ) -> Result<ConsistencyReport, WorkflowError> {
        let index = self
            .search
            .get_object(IndexKind::Documents, id)
            .await
            .map_err(WorkflowError::collaborator("get index object"))?;
        let mut tx = self.begin().await?;
        let snapshot = tx
            .load_snapshot(id)
            .await
            .map_err(WorkflowError::persistence("load document"));
        self.rollback(tx).await;
        let snapshot = snapshot?.ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;

        Ok(ConsistencyReport {
            document_id: id.clone(),
            discrepancies: reconcile(&index, &snapshot, &self.config.document_types),
        })
    }

    async fn reconcile_and_log(&self, id: &DocumentId) {
        match self.check_consistency(id).await {
            Ok(report) => report.log(),
            Err(error) => tracing::error!(%error, "error comparing index and datastore"),
        }
    }

    async fn publish(
        &self,
        record: &DocumentRecord,
        subscribers: &[String],
    ) -> Result<(), WorkflowError> {
        self.search
            .index(IndexKind::Documents, record.to_search_object())
            .await
            .map_err(WorkflowError::collaborator("index document"))?;

        if let Err(error) = self.search.delete(IndexKind::Drafts, &record.id).await {
            if !error.is_not_found() {
                return Err(WorkflowError::collaborator("delete draft index object")(error));
            }
        }

        let data = self.notification(record);
        for subscriber in subscribers {
            if let Err(error) = self
                .notify(TemplateKind::SubscriberDocumentPublished, subscriber, &data)
                .await
            {
                tracing::error!(%error, subscriber = %subscriber, "error sending subscriber email");
            } else {
                tracing::info!(subscriber = %subscriber, "doc published email sent to subscriber");
            }
        }

        self.reconcile_and_log(&record.id).await;
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for EngineInner {
    async fn handle(&self, task: BackgroundTask) -> Result<(), WorkflowError> {
        match task {
            BackgroundTask::PublishDocument {
                record,
                subscribers,
            } => self.publish(&record, &subscribers).await,
            BackgroundTask::IndexDocument {
                record,
                kind,
                reconcile,
            } => {
                self.search
                    .index(kind, record.to_search_object())
                    .await
                    .map_err(WorkflowError::collaborator("index document"))?;
                tracing::info!(index = %kind, "document indexed");
                if reconcile {
                    self.reconcile_and_log(&record.id).await;
                }
                Ok(())
            }
            BackgroundTask::RemoveDraft { id } => self
                .search
                .delete(IndexKind::Drafts, &id)
                .await
                .map_err(WorkflowError::collaborator("delete draft index object")),
        }
    }
}
