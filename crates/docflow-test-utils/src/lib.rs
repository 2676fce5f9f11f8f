//! Testing utilities for the docflow workspace
//!
//! Shared fixtures: sample document types and products, record builders
//! and a seeded in-memory environment whose adapters share one fault plan.

#![allow(missing_docs)]

use chrono::{DateTime, TimeZone, Utc};
use docflow_ports::memory::{
    FaultPlan, MemoryDatastore, MemoryNotifier, MemorySearch, MemoryStorage,
};
use docflow_record::{
    CustomFieldDef, CustomFieldType, DocNumber, DocumentId, DocumentRecord, DocumentRow,
    DocumentStatus, DocumentTypeDef, Product,
};
use std::sync::{Arc, Once};

pub const OWNER: &str = "owner@example.com";
pub const APPROVER_A: &str = "alice@example.com";
pub const APPROVER_B: &str = "bob@example.com";
pub const GROUP: &str = "reviewers@example.com";
pub const DRAFTS_FOLDER: &str = "drafts";
pub const DOCUMENTS_FOLDER: &str = "documents";

static LOGGING: Once = Once::new();

/// Route `tracing` output to the test harness; later calls are no-ops
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    });
}

/// `RFC` with a text and a people custom field
pub fn rfc_type() -> DocumentTypeDef {
    DocumentTypeDef::new("RFC")
        .with_long_name("Request for Comments")
        .with_field(CustomFieldDef::new("Current Version", CustomFieldType::String))
        .with_field(CustomFieldDef::new("Stakeholders", CustomFieldType::People))
}

pub fn prd_type() -> DocumentTypeDef {
    DocumentTypeDef::new("PRD").with_long_name("Product Requirements")
}

pub fn doc_types() -> Vec<DocumentTypeDef> {
    vec![rfc_type(), prd_type()]
}

/// `Terraform` (`TF`) with one subscriber
pub fn terraform() -> Product {
    Product::new("Terraform", "TF").with_subscriber("subscriber@example.com")
}

pub fn vault() -> Product {
    Product::new("Vault", "VLT")
}

pub fn doc_id(id: &str) -> DocumentId {
    DocumentId::parse(id).unwrap()
}

/// Fixed timestamp used for seeded rows
pub fn seeded_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
}

/// Builder for seeded documents
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: DocumentRecord,
}

impl RecordBuilder {
    /// `RFC` draft in `Terraform` owned by [`OWNER`]
    pub fn draft(id: &str) -> Self {
        let mut record = DocumentRecord::draft(doc_id(id), "Plan", "RFC", &terraform(), OWNER);
        record.modified_time = seeded_at().timestamp();
        Self { record }
    }

    pub fn title(mut self, title: &str) -> Self {
        title.clone_into(&mut self.record.title);
        self
    }

    pub fn doc_type(mut self, doc_type: &str) -> Self {
        doc_type.clone_into(&mut self.record.doc_type);
        self
    }

    pub fn product(mut self, product: &Product) -> Self {
        self.record.product.clone_from(&product.name);
        self.record.doc_number = DocNumber::unassigned(product.abbreviation.clone());
        self
    }

    pub fn status(mut self, status: DocumentStatus) -> Self {
        self.record.status = status;
        self
    }

    /// Assigned number `{abbreviation}-{sequence:03}`
    pub fn number(mut self, sequence: u32) -> Self {
        let abbreviation = self.record.doc_number.abbreviation().to_string();
        self.record.doc_number = DocNumber::assigned(abbreviation, sequence);
        self
    }

    pub fn approvers(mut self, approvers: &[&str]) -> Self {
        self.record.approvers = approvers.iter().map(|a| (*a).to_string()).collect();
        self
    }

    pub fn approver_groups(mut self, groups: &[&str]) -> Self {
        self.record.approver_groups = groups.iter().map(|g| (*g).to_string()).collect();
        self
    }

    pub fn contributors(mut self, contributors: &[&str]) -> Self {
        self.record.contributors = contributors.iter().map(|c| (*c).to_string()).collect();
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        summary.clone_into(&mut self.record.summary);
        self
    }

    pub fn build(self) -> DocumentRecord {
        self.record
    }

    pub fn row(self) -> DocumentRow {
        DocumentRow::from_record(&self.record, seeded_at())
    }
}

/// In-memory collaborators sharing one [`FaultPlan`]
#[derive(Debug, Clone)]
pub struct Harness {
    pub faults: FaultPlan,
    pub storage: Arc<MemoryStorage>,
    pub search: Arc<MemorySearch>,
    pub datastore: Arc<MemoryDatastore>,
    pub notifier: Arc<MemoryNotifier>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let faults = FaultPlan::new();
        Self {
            storage: Arc::new(MemoryStorage::new().with_faults(faults.clone())),
            search: Arc::new(MemorySearch::new().with_faults(faults.clone())),
            datastore: Arc::new(MemoryDatastore::new().with_faults(faults.clone())),
            notifier: Arc::new(MemoryNotifier::new().with_faults(faults.clone())),
            faults,
        }
    }

    /// Harness with the standard products seeded
    pub async fn seeded() -> Self {
        let harness = Self::new();
        harness.datastore.insert_product(terraform()).await;
        harness.datastore.insert_product(vault()).await;
        harness
    }

    /// Store a document row and its file in the folder matching its status
    pub async fn add_document(&self, record: &DocumentRecord) {
        let folder = if record.status == DocumentStatus::Wip {
            DRAFTS_FOLDER
        } else {
            DOCUMENTS_FOLDER
        };
        self.storage.add_file(&record.id, &record.file_name(), folder);
        self.datastore
            .insert_document(DocumentRow::from_record(record, seeded_at()))
            .await;
    }

    pub async fn row(&self, id: &str) -> DocumentRow {
        self.datastore.document(&doc_id(id)).await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_numbers_per_product() {
        let record = RecordBuilder::draft("d1")
            .product(&vault())
            .status(DocumentStatus::InReview)
            .number(7)
            .build();
        assert_eq!(record.doc_number.to_string(), "VLT-007");
        assert_eq!(record.product, "Vault");
    }

    #[test]
    fn rows_mirror_builder_fields() {
        let row = RecordBuilder::draft("d2")
            .approvers(&[APPROVER_A])
            .summary("why")
            .row();
        assert_eq!(row.owner.as_deref(), Some(OWNER));
        assert_eq!(row.approvers, vec![APPROVER_A.to_string()]);
        assert_eq!(row.document_number, 0);
        assert_eq!(row.summary.as_deref(), Some("why"));
    }
}
