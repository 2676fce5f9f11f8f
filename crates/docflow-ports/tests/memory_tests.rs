use chrono::Utc;
use docflow_ports::memory::{FaultPlan, MemoryDatastore, MemoryNotifier, MemorySearch, MemoryStorage};
use docflow_ports::{
    redirect_key, Datastore, IndexKind, NotificationData, Notifier, PortError, RedirectStore,
    SearchIndex, ShareRole, StorageProvider, TemplateKind,
};
use docflow_record::{
    DocumentId, DocumentRecord, DocumentRow, FileRevision, Product, ReviewLedger,
};
use pretty_assertions::assert_eq;

fn id(s: &str) -> DocumentId {
    DocumentId::parse(s).unwrap()
}

#[tokio::test]
async fn test_revision_pinning() {
    let storage = MemoryStorage::new();
    let doc = id("doc-1");
    storage.add_file(&doc, "Draft", "drafts");
    let rev = storage.add_revision(&doc).unwrap();

    let latest = storage.get_latest_revision(&doc).await.unwrap();
    assert_eq!(latest.id, rev);

    storage.keep_revision_forever(&doc, &rev).await.unwrap();
    assert!(storage.file(&doc).unwrap().pinned.contains(&rev));

    storage.unmark_keep_forever(&doc, &rev).await.unwrap();
    assert!(storage.file(&doc).unwrap().pinned.is_empty());

    let err = storage.keep_revision_forever(&doc, "missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_sharing_and_permissions() {
    let storage = MemoryStorage::new();
    let doc = id("doc-1");
    storage.add_file(&doc, "Draft", "drafts");

    storage.share_file(&doc, "a@x", ShareRole::Writer).await.unwrap();
    storage.share_file(&doc, "a@x", ShareRole::Writer).await.unwrap();
    let perms = storage.list_permissions(&doc).await.unwrap();
    assert_eq!(perms.len(), 1);

    storage.delete_permission(&doc, &perms[0].id).await.unwrap();
    assert!(!storage.file(&doc).unwrap().has_writer("a@x"));
}

#[tokio::test]
async fn test_created_files_copy_their_template() {
    let storage = MemoryStorage::new();
    let template = id("tpl-rfc");
    storage.add_file(&template, "RFC template", "templates");

    let file = storage
        .create_file("[TF-???] Plan", "drafts", Some("tpl-rfc".to_string()))
        .await
        .unwrap();
    let stored = storage.file(&file.id).unwrap();
    assert_eq!(stored.folder, "drafts");
    assert_eq!(stored.name, "[TF-???] Plan");
    assert_eq!(stored.template.as_deref(), Some("tpl-rfc"));
    assert!(storage.get_latest_revision(&file.id).await.is_ok());

    let blank = storage.create_file("Blank", "drafts", None).await.unwrap();
    assert_ne!(blank.id, file.id);

    let err = storage
        .create_file("Orphan", "drafts", Some("missing".to_string()))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(storage.file_ids().len(), 3);
}

#[tokio::test]
async fn test_subfolders_are_reused() {
    let storage = MemoryStorage::new();
    let first = storage.get_or_create_subfolder("shortcuts", "RFC").await.unwrap();
    let second = storage.get_or_create_subfolder("shortcuts", "RFC").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_lock_check_on_missing_file_is_not_found() {
    let storage = MemoryStorage::new();
    let err = storage.is_locked(&id("nope")).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound { .. }));
}

#[tokio::test]
async fn test_shared_fault_plan_spans_adapters() {
    let faults = FaultPlan::new();
    let storage = MemoryStorage::new().with_faults(faults.clone());
    let search = MemorySearch::new().with_faults(faults.clone());
    let doc = id("doc-1");
    storage.add_file(&doc, "Draft", "drafts");

    faults.fail("move_file");
    faults.fail("save_link");
    assert!(storage.move_file(&doc, "docs").await.is_err());
    assert!(search.save_link("rfc/tf-001", &doc).await.is_err());

    faults.clear_all();
    storage.move_file(&doc, "docs").await.unwrap();
    search.save_link("rfc/tf-001", &doc).await.unwrap();
    assert_eq!(storage.file(&doc).unwrap().folder, "docs");
    assert_eq!(search.link(&redirect_key("RFC", "TF-001")), Some(doc));
}

#[tokio::test]
async fn test_search_index_round_trip() {
    let search = MemorySearch::new();
    let product = Product::new("Terraform", "TF");
    let record = DocumentRecord::draft(id("doc-1"), "Plan", "RFC", &product, "o@x");

    search
        .index(IndexKind::Drafts, record.to_search_object())
        .await
        .unwrap();
    let stored = search.get_object(IndexKind::Drafts, &record.id).await.unwrap();
    assert_eq!(stored["title"], "Plan");
    assert!(search.get_object(IndexKind::Documents, &record.id).await.is_err());

    search.delete(IndexKind::Drafts, &record.id).await.unwrap();
    assert!(search.object(IndexKind::Drafts, &record.id).is_none());
}

#[tokio::test]
async fn test_notifier_records_messages() {
    let notifier = MemoryNotifier::new();
    let product = Product::new("Terraform", "TF");
    let record = DocumentRecord::draft(id("doc-1"), "Plan", "RFC", &product, "o@x");
    let data = NotificationData::for_record(&record, "https://docs/document/doc-1", "noreply@x")
        .with_actor("a@x");

    notifier
        .send(TemplateKind::DocumentApproved, &["o@x".to_string()], &data)
        .await
        .unwrap();
    let sent = notifier.sent_with(TemplateKind::DocumentApproved);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data.actor.as_deref(), Some("a@x"));
}

#[tokio::test]
async fn test_snapshot_loads_ledger_and_revisions() {
    let store = MemoryDatastore::new();
    let product = Product::new("Terraform", "TF");
    store.insert_product(product.clone()).await;
    let record = DocumentRecord::draft(id("doc-1"), "Plan", "RFC", &product, "o@x");
    store
        .insert_document(DocumentRow::from_record(&record, Utc::now()))
        .await;

    let mut tx = store.begin().await.unwrap();
    let mut ledger = ReviewLedger::new(record.id.clone());
    ledger.record_approval("a@x", Utc::now()).unwrap();
    tx.save_ledger(&ledger).await.unwrap();
    tx.create_file_revision(&FileRevision {
        document_id: record.id.clone(),
        revision_id: "r1".into(),
        label: "Approved by a@x".into(),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let snapshot = tx.load_snapshot(&record.id).await.unwrap().unwrap();
    assert_eq!(snapshot.ledger.approved_by(), vec!["a@x".to_string()]);
    assert_eq!(snapshot.file_revisions.len(), 1);
    assert_eq!(snapshot.product, product);
    assert!(tx.load_snapshot(&id("other")).await.unwrap().is_none());
}
