//! Background work queue
//!
//! Post-response work (indexing, subscriber notices, reconciliation) is
//! submitted to a bounded channel drained by a fixed set of worker tasks.
//! Submission never blocks the request: when the queue is full or shut
//! down the task is dropped and logged. Failures are logged by the worker
//! and never reach the original caller.

use crate::error::WorkflowError;
use crate::observability::task_span;
use async_trait::async_trait;
use docflow_ports::IndexKind;
use docflow_record::{DocumentId, DocumentRecord};
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Work done after a response was sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundTask {
    /// A document entered review: index it, drop its draft entry, tell
    /// product subscribers and reconcile
    PublishDocument {
        record: DocumentRecord,
        subscribers: Vec<String>,
    },
    /// Push a record into an index, optionally reconciling afterwards
    IndexDocument {
        record: DocumentRecord,
        kind: IndexKind,
        reconcile: bool,
    },
    /// Remove a deleted draft from the drafts index
    RemoveDraft { id: DocumentId },
}

impl BackgroundTask {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::PublishDocument { .. } => "publish_document",
            Self::IndexDocument { .. } => "index_document",
            Self::RemoveDraft { .. } => "remove_draft",
        }
    }

    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::PublishDocument { record, .. } | Self::IndexDocument { record, .. } => &record.id,
            Self::RemoveDraft { id } => id,
        }
    }
}

/// Executes background tasks
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: BackgroundTask) -> Result<(), WorkflowError>;
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    /// Rejected because the queue was full or shut down
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: AtomicUsize,
    idle: Notify,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl QueueState {
    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Bounded background queue with a fixed worker set
#[derive(Debug)]
pub struct TaskQueue {
    sender: SyncMutex<Option<mpsc::Sender<BackgroundTask>>>,
    workers: SyncMutex<Vec<JoinHandle<()>>>,
    state: Arc<QueueState>,
}

impl TaskQueue {
    /// Start `workers` workers draining a queue of `capacity` tasks
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn start(capacity: usize, workers: usize, handler: Arc<dyn TaskHandler>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(rx));
        let state = Arc::new(QueueState::default());

        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&receiver),
                    Arc::clone(&handler),
                    Arc::clone(&state),
                ))
            })
            .collect();

        Self {
            sender: SyncMutex::new(Some(tx)),
            workers: SyncMutex::new(handles),
            state,
        }
    }

    /// Enqueue without waiting; returns whether the task was accepted
    pub fn submit(&self, task: BackgroundTask) -> bool {
        let name = task.name();
        let doc_id = task.document_id().clone();
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            self.state.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(task = name, doc_id = %doc_id, "background queue shut down, task dropped");
            return false;
        };

        self.state.pending.fetch_add(1, Ordering::AcqRel);
        match sender.try_send(task) {
            Ok(()) => {
                self.state.submitted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(task = name, doc_id = %doc_id, "background task queued");
                true
            }
            Err(err) => {
                self.state.finish();
                self.state.dropped.fetch_add(1, Ordering::Relaxed);
                let reason = match err {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "queue closed",
                };
                tracing::warn!(task = name, doc_id = %doc_id, reason, "background task dropped");
                false
            }
        }
    }

    /// Tasks accepted but not finished
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.state.submitted.load(Ordering::Relaxed),
            completed: self.state.completed.load(Ordering::Relaxed),
            failed: self.state.failed.load(Ordering::Relaxed),
            dropped: self.state.dropped.load(Ordering::Relaxed),
        }
    }

    /// Wait until every accepted task has finished
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.state.idle.notified();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Stop accepting tasks, drain the queue and wait for the workers
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "background worker panicked");
            }
        }
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<BackgroundTask>>>,
    handler: Arc<dyn TaskHandler>,
    state: Arc<QueueState>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };
        let name = task.name();
        let span = task_span(name, task.document_id().as_str());
        match handler.handle(task).instrument(span.clone()).await {
            Ok(()) => {
                state.completed.fetch_add(1, Ordering::Relaxed);
                span.in_scope(|| tracing::debug!(worker, "background task done"));
            }
            Err(err) => {
                state.failed.fetch_add(1, Ordering::Relaxed);
                span.in_scope(|| tracing::error!(worker, error = %err, "background task failed"));
            }
        }
        state.finish();
    }
    tracing::debug!(worker, "background worker stopped");
}
