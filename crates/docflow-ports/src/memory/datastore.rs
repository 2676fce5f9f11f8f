use super::faults::FaultPlan;
use crate::datastore::{Datastore, Transaction};
use crate::error::{PortError, PortResult};
use async_trait::async_trait;
use docflow_record::{
    DocumentId, DocumentRow, FileRevision, GroupReviewEntry, Product, ReviewEntry,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Tables held by [`MemoryDatastore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    pub documents: BTreeMap<DocumentId, DocumentRow>,
    pub products: BTreeMap<String, Product>,
    pub reviews: Vec<ReviewEntry>,
    pub group_reviews: Vec<GroupReviewEntry>,
    pub file_revisions: Vec<FileRevision>,
}

/// In-memory datastore
///
/// Transactions are serialized: `begin` waits for the previous transaction
/// to finish, works on a copy of the tables and swaps it in on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatastore {
    tables: Arc<Mutex<MemoryTables>>,
    faults: FaultPlan,
}

impl MemoryDatastore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    #[inline]
    #[must_use]
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub async fn insert_product(&self, product: Product) {
        self.tables
            .lock()
            .await
            .products
            .insert(product.name.clone(), product);
    }

    pub async fn insert_document(&self, row: DocumentRow) {
        self.tables.lock().await.documents.insert(row.id.clone(), row);
    }

    /// Copy of the committed tables
    pub async fn tables(&self) -> MemoryTables {
        self.tables.lock().await.clone()
    }

    pub async fn document(&self, id: &DocumentId) -> Option<DocumentRow> {
        self.tables.lock().await.documents.get(id).cloned()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn begin(&self) -> PortResult<Box<dyn Transaction>> {
        self.faults.check("begin")?;
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }
}

/// Transaction over a private copy of the tables
#[derive(Debug)]
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryTables>,
    working: MemoryTables,
    faults: FaultPlan,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get_document(&mut self, id: &DocumentId) -> PortResult<Option<DocumentRow>> {
        self.faults.check("get_document")?;
        Ok(self.working.documents.get(id).cloned())
    }

    async fn upsert_document(&mut self, row: &DocumentRow) -> PortResult<()> {
        self.faults.check("upsert_document")?;
        self.working.documents.insert(row.id.clone(), row.clone());
        Ok(())
    }

    async fn delete_document(&mut self, id: &DocumentId) -> PortResult<()> {
        self.faults.check("delete_document")?;
        if self.working.documents.remove(id).is_none() {
            return Err(PortError::not_found("document", id.as_str()));
        }
        self.working.reviews.retain(|r| r.document_id != *id);
        self.working.group_reviews.retain(|g| g.document_id != *id);
        self.working.file_revisions.retain(|r| r.document_id != *id);
        Ok(())
    }

    async fn get_product(&mut self, name: &str) -> PortResult<Option<Product>> {
        self.faults.check("get_product")?;
        Ok(self.working.products.get(name).cloned())
    }

    async fn latest_document_number(&mut self, product: &str, doc_type: &str) -> PortResult<u32> {
        self.faults.check("latest_document_number")?;
        Ok(self
            .working
            .documents
            .values()
            .filter(|d| d.product == product && d.doc_type == doc_type)
            .map(|d| d.document_number)
            .max()
            .unwrap_or(0))
    }

    async fn find_reviews(&mut self, id: &DocumentId) -> PortResult<Vec<ReviewEntry>> {
        self.faults.check("find_reviews")?;
        Ok(self
            .working
            .reviews
            .iter()
            .filter(|r| r.document_id == *id)
            .cloned()
            .collect())
    }

    async fn find_reviews_by_user(&mut self, user: &str) -> PortResult<Vec<ReviewEntry>> {
        self.faults.check("find_reviews_by_user")?;
        Ok(self
            .working
            .reviews
            .iter()
            .filter(|r| r.user == user)
            .cloned()
            .collect())
    }

    async fn find_group_reviews(&mut self, id: &DocumentId) -> PortResult<Vec<GroupReviewEntry>> {
        self.faults.check("find_group_reviews")?;
        Ok(self
            .working
            .group_reviews
            .iter()
            .filter(|g| g.document_id == *id)
            .cloned()
            .collect())
    }

    async fn upsert_review(&mut self, entry: &ReviewEntry) -> PortResult<()> {
        self.faults.check("upsert_review")?;
        match self
            .working
            .reviews
            .iter_mut()
            .find(|r| r.document_id == entry.document_id && r.user == entry.user)
        {
            Some(existing) => *existing = entry.clone(),
            None => self.working.reviews.push(entry.clone()),
        }
        Ok(())
    }

    async fn upsert_group_review(&mut self, entry: &GroupReviewEntry) -> PortResult<()> {
        self.faults.check("upsert_group_review")?;
        match self
            .working
            .group_reviews
            .iter_mut()
            .find(|g| g.document_id == entry.document_id && g.group == entry.group)
        {
            Some(existing) => *existing = entry.clone(),
            None => self.working.group_reviews.push(entry.clone()),
        }
        Ok(())
    }

    async fn find_file_revisions(&mut self, id: &DocumentId) -> PortResult<Vec<FileRevision>> {
        self.faults.check("find_file_revisions")?;
        Ok(self
            .working
            .file_revisions
            .iter()
            .filter(|r| r.document_id == *id)
            .cloned()
            .collect())
    }

    async fn create_file_revision(&mut self, revision: &FileRevision) -> PortResult<()> {
        self.faults.check("create_file_revision")?;
        if self.working.file_revisions.contains(revision) {
            return Err(PortError::failed(
                "create_file_revision",
                format!(
                    "revision {} already recorded as {:?}",
                    revision.revision_id, revision.label
                ),
            ));
        }
        self.working.file_revisions.push(revision.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let MemoryTransaction {
            mut guard,
            working,
            faults,
        } = *self;
        faults.check("commit")?;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> PortResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docflow_record::{DocumentStatus, ReviewStatus};

    fn row(id: &str, number: u32) -> DocumentRow {
        let now = Utc::now();
        DocumentRow {
            id: DocumentId::parse(id).unwrap(),
            title: "T".into(),
            doc_type: "RFC".into(),
            product: "Terraform".into(),
            document_number: number,
            status: DocumentStatus::Wip,
            owner: Some("o@x".into()),
            approvers: vec![],
            approver_groups: vec![],
            contributors: vec![],
            custom_fields: vec![],
            created_at: now,
            modified_at: now,
            summary: None,
            imported: false,
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = MemoryDatastore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_document(&row("d1", 0)).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.document(&DocumentId::parse("d1").unwrap()).await.is_none());

        let mut tx = store.begin().await.unwrap();
        tx.upsert_document(&row("d1", 0)).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.document(&DocumentId::parse("d1").unwrap()).await.is_some());
    }

    #[tokio::test]
    async fn failed_commit_leaves_tables_untouched() {
        let store = MemoryDatastore::new();
        store.faults().fail_times("commit", 1);
        let mut tx = store.begin().await.unwrap();
        tx.upsert_document(&row("d1", 0)).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert!(store.tables().await.documents.is_empty());
    }

    #[tokio::test]
    async fn latest_number_is_scoped_to_product_and_type() {
        let store = MemoryDatastore::new();
        store.insert_document(row("a", 3)).await;
        store.insert_document(row("b", 7)).await;
        let mut other = row("c", 40);
        other.doc_type = "PRD".into();
        store.insert_document(other).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.latest_document_number("Terraform", "RFC").await.unwrap(), 7);
        assert_eq!(tx.latest_document_number("Vault", "RFC").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn review_upsert_keeps_one_entry_per_user() {
        let store = MemoryDatastore::new();
        let id = DocumentId::parse("d1").unwrap();
        let mut tx = store.begin().await.unwrap();
        for status in [ReviewStatus::Approved, ReviewStatus::ChangesRequested] {
            tx.upsert_review(&ReviewEntry {
                document_id: id.clone(),
                user: "a@x".into(),
                status,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        let reviews = tx.find_reviews(&id).await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].status, ReviewStatus::ChangesRequested);
    }
}
