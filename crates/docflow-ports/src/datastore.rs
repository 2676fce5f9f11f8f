//! Transactional datastore
//!
//! Everything read or written through a [`Transaction`] becomes visible to
//! other transactions only after [`Transaction::commit`]. Implementations
//! must make the latest-number read and the later row write atomic with
//! respect to concurrent transactions.

use crate::error::{PortError, PortResult};
use async_trait::async_trait;
use docflow_record::{
    DocumentId, DocumentRow, DocumentSnapshot, FileRevision, GroupReviewEntry, Product,
    ReviewEntry, ReviewLedger,
};

/// Datastore that hands out transactions
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    async fn begin(&self) -> PortResult<Box<dyn Transaction>>;
}

/// A single ACID transaction scope
#[async_trait]
pub trait Transaction: Send {
    async fn get_document(&mut self, id: &DocumentId) -> PortResult<Option<DocumentRow>>;

    async fn upsert_document(&mut self, row: &DocumentRow) -> PortResult<()>;

    /// Delete a document with its review entries and file revisions
    async fn delete_document(&mut self, id: &DocumentId) -> PortResult<()>;

    async fn get_product(&mut self, name: &str) -> PortResult<Option<Product>>;

    /// Highest document number assigned for a product and document type, `0` if none
    async fn latest_document_number(&mut self, product: &str, doc_type: &str) -> PortResult<u32>;

    async fn find_reviews(&mut self, id: &DocumentId) -> PortResult<Vec<ReviewEntry>>;

    async fn find_reviews_by_user(&mut self, user: &str) -> PortResult<Vec<ReviewEntry>>;

    async fn find_group_reviews(&mut self, id: &DocumentId) -> PortResult<Vec<GroupReviewEntry>>;

    /// Insert or replace the entry keyed by (document, user)
    async fn upsert_review(&mut self, entry: &ReviewEntry) -> PortResult<()>;

    /// Insert or replace the entry keyed by (document, group)
    async fn upsert_group_review(&mut self, entry: &GroupReviewEntry) -> PortResult<()>;

    async fn find_file_revisions(&mut self, id: &DocumentId) -> PortResult<Vec<FileRevision>>;

    async fn create_file_revision(&mut self, revision: &FileRevision) -> PortResult<()>;

    async fn commit(self: Box<Self>) -> PortResult<()>;

    async fn rollback(self: Box<Self>) -> PortResult<()>;

    /// Load the row, its product, review ledger and file revisions
    async fn load_snapshot(&mut self, id: &DocumentId) -> PortResult<Option<DocumentSnapshot>> {
        let Some(row) = self.get_document(id).await? else {
            return Ok(None);
        };
        let product = self
            .get_product(&row.product)
            .await?
            .ok_or_else(|| PortError::not_found("product", row.product.clone()))?;
        let reviews = self.find_reviews(id).await?;
        let groups = self.find_group_reviews(id).await?;
        let ledger = ReviewLedger::from_entries(id.clone(), reviews, groups)?;
        let file_revisions = self.find_file_revisions(id).await?;
        Ok(Some(DocumentSnapshot {
            row,
            product,
            ledger,
            file_revisions,
        }))
    }

    /// Persist every entry of a ledger
    async fn save_ledger(&mut self, ledger: &ReviewLedger) -> PortResult<()> {
        for entry in ledger.entries() {
            self.upsert_review(entry).await?;
        }
        for group in ledger.groups() {
            self.upsert_group_review(group).await?;
        }
        Ok(())
    }
}
