//! Docflow Ports - collaborator capabilities
//!
//! The workflow engine reaches every external system through a narrow
//! trait:
//! - [`StorageProvider`] for files, revisions, sharing and headers
//! - [`SearchIndex`] and [`RedirectStore`] for the derived search index
//! - [`Datastore`] / [`Transaction`] for the system of record
//! - [`Notifier`] for templated email
//!
//! Adapters are chosen at construction time. [`memory`] holds in-memory
//! adapters with fault injection.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod datastore;
pub mod error;
pub mod memory;
pub mod notifier;
pub mod search;
pub mod storage;

pub use datastore::{Datastore, Transaction};
pub use error::{PortError, PortResult};
pub use notifier::{NotificationData, Notifier, TemplateKind};
pub use search::{redirect_key, IndexKind, RedirectStore, SearchIndex};
pub use storage::{
    FileMetadata, HeaderMetadata, Permission, Revision, ShareRole, StorageCapabilities,
    StorageProvider,
};

#[cfg(any(test, feature = "mock"))]
pub use notifier::MockNotifier;
#[cfg(any(test, feature = "mock"))]
pub use search::{MockRedirectStore, MockSearchIndex};
#[cfg(any(test, feature = "mock"))]
pub use storage::MockStorageProvider;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
