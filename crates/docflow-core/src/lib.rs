//! Docflow Core - document workflow engine
//!
//! Drives a document from draft through review to publication:
//! - Requests review with a compensating saga over external systems
//! - Records approvals and change requests
//! - Creates drafts
//! - Authorizes and applies sparse patches to documents and drafts
//! - Reconciles the search index against the datastore after writes
//!
//! # Example
//!
//! ```rust,ignore
//! use docflow_core::prelude::*;
//!
//! # async fn example(collaborators: Collaborators) -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::from_file("docflow.toml")?;
//! let engine = WorkflowEngine::new(config, collaborators)?;
//!
//! let ctx = RequestContext::new("owner@example.com", http::Method::POST, "/reviews/doc-1");
//! let record = engine.request_review(&ctx, &DocumentId::parse("doc-1")?).await?;
//! println!("published as {}", record.doc_number);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod api;
pub mod approval;
pub mod config;
pub mod context;
pub mod documents;
pub mod engine;
pub mod error;
pub mod observability;
pub mod patch;
pub mod reconcile;
pub mod response;
pub mod review;
pub mod saga;
pub mod tasks;

pub use api::{dispatch, Route, RouteError};
pub use approval::{approval_permitted, change_request_permitted};
pub use config::{BackgroundConfig, ConfigError, EmailConfig, EngineConfig, FolderConfig};
pub use context::RequestContext;
pub use engine::{Collaborators, WorkflowEngine};
pub use error::{AuthorizationKind, ConflictKind, WorkflowError};
pub use observability::{init_logging, LogFormat};
pub use patch::{
    authorize_document_patch, authorize_draft_owner, validate_new_draft, DocumentPatch,
    DraftPatch, NewDraft, PatchActor, PatchPlan,
};
pub use reconcile::{reconcile, ConsistencyReport, Discrepancy};
pub use response::{ApiResponse, ALLOWED_HEADER};
pub use review::REQUESTED_REVIEW_LABEL;
pub use saga::{CompensationFailure, Saga, SagaFailure};
pub use tasks::{BackgroundTask, QueueStats, TaskHandler, TaskQueue};

// Re-exported so callers need no direct dependency for ids and records
pub use docflow_record::{DocumentId, DocumentRecord, DocumentStatus};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Docflow Core
    pub use crate::{
        ApiResponse, Collaborators, DocumentId, DocumentPatch, DocumentRecord, DocumentStatus,
        DraftPatch, EngineConfig, NewDraft, RequestContext, WorkflowEngine, WorkflowError,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
