//! In-memory collaborator adapters
//!
//! Used by tests and the offline CLI. Every adapter accepts a shared
//! [`FaultPlan`] so a single plan can fail any operation across adapters.

mod datastore;
mod faults;
mod notifier;
mod search;
mod storage;

pub use datastore::{MemoryDatastore, MemoryTables, MemoryTransaction};
pub use faults::FaultPlan;
pub use notifier::{MemoryNotifier, SentNotification};
pub use search::MemorySearch;
pub use storage::{MemoryStorage, StoredFile};
