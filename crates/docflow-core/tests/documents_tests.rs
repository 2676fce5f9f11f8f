//! Draft create, patch and delete, document patches

mod common;

use common::{ctx, engine};
use docflow_core::{
    dispatch, AuthorizationKind, ConflictKind, DocumentPatch, DocumentStatus, DraftPatch,
    EngineConfig, RequestContext, WorkflowEngine, WorkflowError,
};
use docflow_ports::{IndexKind, ShareRole, StorageProvider, TemplateKind};
use docflow_test_utils::{
    doc_id, prd_type, rfc_type, Harness, RecordBuilder, APPROVER_A, APPROVER_B, DRAFTS_FOLDER,
    GROUP, OWNER,
};
use http::{Method, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const CAROL: &str = "carol@example.com";

fn patch_doc(user: &str) -> RequestContext {
    ctx(user, Method::PATCH, "/documents/d1")
}

fn patch_draft(user: &str) -> RequestContext {
    ctx(user, Method::PATCH, "/drafts/d1")
}

fn delete_draft(user: &str) -> RequestContext {
    ctx(user, Method::DELETE, "/drafts/d1")
}

fn emails(list: &[&str]) -> Vec<String> {
    list.iter().map(|e| (*e).to_string()).collect()
}

async fn seeded_document(harness: &Harness) {
    let record = RecordBuilder::draft("d1")
        .status(DocumentStatus::InReview)
        .number(1)
        .approvers(&[APPROVER_A, APPROVER_B])
        .build();
    harness.add_document(&record).await;
}

async fn seeded_draft(harness: &Harness) {
    let record = RecordBuilder::draft("d1")
        .approvers(&[APPROVER_A])
        .contributors(&["c1@example.com", "c2@example.com"])
        .build();
    harness.add_document(&record).await;
}

#[tokio::test]
async fn approvers_may_only_remove_themselves() {
    let harness = Harness::seeded().await;
    seeded_document(&harness).await;
    let engine = engine(&harness);

    // Removing someone else.
    let response = dispatch(
        &engine,
        &patch_doc(APPROVER_A),
        json!({ "approvers": [APPROVER_A] }),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // Another field alongside the removal.
    let response = dispatch(
        &engine,
        &patch_doc(APPROVER_A),
        json!({ "approvers": [APPROVER_B], "title": "Mine now" }),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let row = harness.row("d1").await;
    assert_eq!(row.approvers, emails(&[APPROVER_A, APPROVER_B]));
    assert_eq!(row.title, "Plan");

    let response = dispatch(
        &engine,
        &patch_doc(APPROVER_A),
        json!({ "approvers": [APPROVER_B] }),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(harness.row("d1").await.approvers, emails(&[APPROVER_B]));
    assert!(harness.notifier.sent().is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn owner_patch_shares_notifies_and_renames() {
    let harness = Harness::seeded().await;
    seeded_document(&harness).await;
    let engine = engine(&harness);

    let patch = DocumentPatch {
        title: Some("New title".into()),
        approvers: Some(emails(&[APPROVER_A, APPROVER_B, CAROL])),
        ..DocumentPatch::default()
    };
    let record = engine
        .patch_document(&patch_doc(OWNER), &doc_id("d1"), patch)
        .await
        .unwrap();
    assert_eq!(record.title, "New title");

    let file = harness.storage.file(&doc_id("d1")).unwrap();
    assert_eq!(file.name, "[TF-001] New title");
    assert!(file.has_writer(CAROL));
    assert!(!file.has_writer(APPROVER_A));
    assert_eq!(file.last_header().unwrap().title, "New title");

    let requested = harness.notifier.sent_with(TemplateKind::ReviewRequested);
    assert_eq!(requested.len(), 1);
    assert_eq!(requested[0].recipients, emails(&[CAROL]));

    let row = harness.row("d1").await;
    assert_eq!(row.title, "New title");
    assert_eq!(row.approvers, emails(&[APPROVER_A, APPROVER_B, CAROL]));
    assert_eq!(
        engine.reviews_for_document(&doc_id("d1")).await.unwrap().len(),
        3
    );

    engine.wait_idle().await;
    let report = engine.check_consistency(&doc_id("d1")).await.unwrap();
    assert!(report.is_consistent(), "{:?}", report.discrepancies);
    engine.shutdown().await;
}

#[tokio::test]
async fn added_approver_groups_are_shared_and_notified() {
    let harness = Harness::seeded().await;
    seeded_document(&harness).await;
    let engine = engine(&harness);

    let response = dispatch(
        &engine,
        &patch_doc(OWNER),
        json!({ "approverGroups": [GROUP], "approvers": [APPROVER_A, APPROVER_B, CAROL] }),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let file = harness.storage.file(&doc_id("d1")).unwrap();
    assert!(file.has_writer(GROUP));
    let recipients: Vec<String> = harness
        .notifier
        .sent_with(TemplateKind::ReviewRequested)
        .into_iter()
        .flat_map(|notice| notice.recipients)
        .collect();
    assert_eq!(recipients, emails(&[CAROL, GROUP]));
    assert_eq!(harness.row("d1").await.approver_groups, emails(&[GROUP]));

    // Already a group approver: no second email.
    let response = dispatch(&engine, &patch_doc(OWNER), json!({ "approverGroups": [GROUP] })).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(harness.notifier.sent_with(TemplateKind::ReviewRequested).len(), 2);
    engine.shutdown().await;
}

#[tokio::test]
async fn status_changes_follow_the_state_machine() {
    let harness = Harness::seeded().await;
    seeded_document(&harness).await;
    let engine = engine(&harness);

    let response = dispatch(&engine, &patch_doc(OWNER), json!({ "status": "Approved" })).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(harness.row("d1").await.status, DocumentStatus::Approved);

    // Only a change request reopens review.
    let response = dispatch(&engine, &patch_doc(OWNER), json!({ "status": "In-Review" })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = dispatch(&engine, &patch_doc(OWNER), json!({ "status": "WIP" })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = dispatch(&engine, &patch_doc(OWNER), json!({ "status": "Obsolete" })).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(harness.row("d1").await.status, DocumentStatus::Obsolete);
    engine.shutdown().await;
}

#[tokio::test]
async fn custom_fields_are_checked_against_the_document_type() {
    let harness = Harness::seeded().await;
    seeded_document(&harness).await;
    let engine = engine(&harness);

    let unknown = json!({
        "customFields": [
            { "name": "budget", "displayName": "Budget", "type": "STRING", "value": "10" }
        ]
    });
    let response = dispatch(&engine, &patch_doc(OWNER), unknown).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(harness.row("d1").await.custom_fields.is_empty());

    let valid = json!({
        "customFields": [
            {
                "name": "currentVersion",
                "displayName": "Current Version",
                "type": "STRING",
                "value": "2.0"
            }
        ]
    });
    let response = dispatch(&engine, &patch_doc(OWNER), valid).await;
    assert_eq!(response.status, StatusCode::OK);
    let row = harness.row("d1").await;
    assert_eq!(row.custom_fields.len(), 1);
    assert_eq!(row.custom_fields[0].display_name, "Current Version");
    assert_eq!(row.custom_fields[0].value, "2.0");
    engine.shutdown().await;
}

#[tokio::test]
async fn invalid_patches_fail_before_the_lock_check() {
    let harness = Harness::seeded().await;
    seeded_document(&harness).await;
    harness.storage.set_locked(&doc_id("d1"), true);
    let engine = engine(&harness);

    let response = dispatch(
        &engine,
        &patch_doc(OWNER),
        json!({ "owners": ["a@example.com", "b@example.com"] }),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = dispatch(&engine, &patch_doc(OWNER), json!({ "title": "Locked" })).await;
    assert_eq!(response.status, StatusCode::LOCKED);
    assert_eq!(harness.row("d1").await.title, "Plan");
    engine.shutdown().await;
}

#[tokio::test]
async fn drafts_are_not_patched_as_documents() {
    let harness = Harness::seeded().await;
    seeded_draft(&harness).await;
    let engine = engine(&harness);

    let err = engine
        .patch_document(&patch_doc(OWNER), &doc_id("d1"), DocumentPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Conflict {
            kind: ConflictKind::NotPublished
        }
    ));
    engine.shutdown().await;
}

#[tokio::test]
async fn failed_share_commits_nothing() {
    let harness = Harness::seeded().await;
    seeded_document(&harness).await;
    harness.faults.fail("share_file");
    let engine = engine(&harness);

    let response = dispatch(
        &engine,
        &patch_doc(OWNER),
        json!({ "title": "Shared", "approvers": [APPROVER_A, APPROVER_B, CAROL] }),
    )
    .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    let row = harness.row("d1").await;
    assert_eq!(row.title, "Plan");
    assert_eq!(row.approvers, emails(&[APPROVER_A, APPROVER_B]));
    assert!(harness.notifier.sent().is_empty());
    assert!(engine
        .reviews_for_document(&doc_id("d1"))
        .await
        .unwrap()
        .is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn only_the_owner_patches_a_draft() {
    let harness = Harness::seeded().await;
    seeded_draft(&harness).await;
    let engine = engine(&harness);

    let err = engine
        .patch_draft(
            &patch_draft(APPROVER_A),
            &doc_id("d1"),
            DraftPatch {
                title: Some("Hijack".into()),
                ..DraftPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Authorization {
            kind: AuthorizationKind::NotOwner
        }
    ));
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    engine.shutdown().await;
}

#[tokio::test]
async fn moving_a_draft_to_another_product_resets_its_number() {
    let harness = Harness::seeded().await;
    seeded_draft(&harness).await;
    let engine = engine(&harness);

    let response = dispatch(&engine, &patch_draft(OWNER), json!({ "product": "Vault" })).await;
    assert_eq!(response.status, StatusCode::OK);

    let row = harness.row("d1").await;
    assert_eq!(row.product, "Vault");
    assert_eq!(row.document_number, 0);
    let file = harness.storage.file(&doc_id("d1")).unwrap();
    assert_eq!(file.name, "[VLT-???] Plan");
    let header = file.last_header().unwrap();
    assert_eq!(header.doc_number, "VLT-???");
    assert!(header.draft);

    engine.wait_idle().await;
    let indexed = harness.search.object(IndexKind::Drafts, &doc_id("d1")).unwrap();
    assert_eq!(indexed.get("product"), Some(&json!("Vault")));
    engine.shutdown().await;
}

#[tokio::test]
async fn unknown_products_are_rejected() {
    let harness = Harness::seeded().await;
    seeded_draft(&harness).await;
    let engine = engine(&harness);

    let response = dispatch(&engine, &patch_draft(OWNER), json!({ "product": "Nomad" })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body, json!({ "error": "Bad request: invalid product" }));

    // An empty product leaves the draft where it is.
    let response = dispatch(
        &engine,
        &patch_draft(OWNER),
        json!({ "product": "", "summary": "Why" }),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    let row = harness.row("d1").await;
    assert_eq!(row.product, "Terraform");
    assert_eq!(row.summary.as_deref(), Some("Why"));
    engine.shutdown().await;
}

#[tokio::test]
async fn contributor_changes_update_sharing() {
    let harness = Harness::seeded().await;
    seeded_draft(&harness).await;
    for contributor in ["c1@example.com", "c2@example.com"] {
        harness
            .storage
            .share_file(&doc_id("d1"), contributor, ShareRole::Writer)
            .await
            .unwrap();
    }
    let engine = engine(&harness);

    let patch = DraftPatch {
        contributors: Some(emails(&["c2@example.com", "c3@example.com"])),
        ..DraftPatch::default()
    };
    engine
        .patch_draft(&patch_draft(OWNER), &doc_id("d1"), patch)
        .await
        .unwrap();

    let file = harness.storage.file(&doc_id("d1")).unwrap();
    assert!(!file.has_writer("c1@example.com"));
    assert!(file.has_writer("c2@example.com"));
    assert!(file.has_writer("c3@example.com"));
    assert_eq!(
        harness.row("d1").await.contributors,
        emails(&["c2@example.com", "c3@example.com"])
    );
    engine.shutdown().await;
}

#[tokio::test]
async fn new_draft_owner_is_shared_and_notified() {
    let harness = Harness::seeded().await;
    seeded_draft(&harness).await;
    let engine = engine(&harness);

    let response = dispatch(
        &engine,
        &patch_draft(OWNER),
        json!({ "owners": ["newowner@example.com"] }),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    assert_eq!(
        harness.row("d1").await.owner.as_deref(),
        Some("newowner@example.com")
    );
    let file = harness.storage.file(&doc_id("d1")).unwrap();
    assert!(file.has_writer("newowner@example.com"));
    let sent = harness.notifier.sent_with(TemplateKind::NewOwner);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, emails(&["newowner@example.com"]));

    // The previous owner no longer controls the draft.
    let response = dispatch(&engine, &patch_draft(OWNER), json!({ "title": "Back" })).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    engine.shutdown().await;
}

#[tokio::test]
async fn deleting_a_draft_removes_every_trace() {
    let harness = Harness::seeded().await;
    seeded_draft(&harness).await;
    harness.search.put_object(
        IndexKind::Drafts,
        &doc_id("d1"),
        json!({ "objectID": "d1" }).as_object().cloned().unwrap(),
    );
    let engine = engine(&harness);

    let response = dispatch(&engine, &delete_draft(OWNER), Value::Null).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "id": "d1" }));

    engine.wait_idle().await;
    assert!(harness.datastore.document(&doc_id("d1")).await.is_none());
    assert!(harness.storage.file(&doc_id("d1")).is_none());
    assert!(harness.search.object(IndexKind::Drafts, &doc_id("d1")).is_none());

    let response = dispatch(&engine, &delete_draft(OWNER), Value::Null).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    engine.shutdown().await;
}

#[tokio::test]
async fn delete_requires_an_owned_draft() {
    let harness = Harness::seeded().await;
    seeded_draft(&harness).await;
    let other = RecordBuilder::draft("d2")
        .status(DocumentStatus::InReview)
        .number(1)
        .build();
    harness.add_document(&other).await;
    let engine = engine(&harness);

    let response = dispatch(&engine, &delete_draft(APPROVER_A), Value::Null).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = dispatch(
        &engine,
        &ctx(OWNER, Method::DELETE, "/drafts/d2"),
        Value::Null,
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(harness.datastore.document(&doc_id("d2")).await.is_some());
    engine.shutdown().await;
}

#[tokio::test]
async fn failed_file_delete_keeps_the_row() {
    let harness = Harness::seeded().await;
    seeded_draft(&harness).await;
    harness.faults.fail("delete_file");
    let engine = engine(&harness);

    let response = dispatch(&engine, &delete_draft(OWNER), Value::Null).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.datastore.document(&doc_id("d1")).await.is_some());
    assert!(harness.storage.file(&doc_id("d1")).is_some());
    engine.shutdown().await;
}

fn create(user: &str) -> RequestContext {
    ctx(user, Method::POST, "/drafts")
}

fn new_draft() -> Value {
    json!({
        "title": "Plan",
        "docType": "RFC",
        "product": "Terraform",
        "contributors": [CAROL],
        "summary": "why",
        "customFields": [
            {
                "name": "currentVersion",
                "displayName": "Current Version",
                "type": "STRING",
                "value": "1.0"
            }
        ]
    })
}

#[tokio::test]
async fn drafts_are_created_for_the_caller() {
    let harness = Harness::seeded().await;
    let engine = engine(&harness);

    let response = dispatch(&engine, &create(OWNER), new_draft()).await;
    assert_eq!(response.status, StatusCode::OK);
    let id = doc_id(response.body["id"].as_str().unwrap());

    let row = harness.datastore.document(&id).await.unwrap();
    assert_eq!(row.status, DocumentStatus::Wip);
    assert_eq!(row.document_number, 0);
    assert_eq!(row.owner.as_deref(), Some(OWNER));
    assert_eq!(row.contributors, emails(&[CAROL]));
    assert_eq!(row.summary.as_deref(), Some("why"));
    assert_eq!(row.custom_fields[0].value, "1.0");

    let file = harness.storage.file(&id).unwrap();
    assert_eq!(file.folder, DRAFTS_FOLDER);
    assert_eq!(file.name, "[TF-???] Plan");
    assert!(file.has_writer(OWNER));
    assert!(file.has_writer(CAROL));
    let header = file.last_header().unwrap();
    assert!(header.draft);
    assert_eq!(header.doc_number, "TF-???");
    assert!(harness.notifier.sent().is_empty());

    engine.wait_idle().await;
    assert!(harness.search.object(IndexKind::Drafts, &id).is_some());
    assert!(harness.search.object(IndexKind::Documents, &id).is_none());

    // A created draft goes through review like any other.
    let record = engine
        .request_review(&ctx(OWNER, Method::POST, &format!("/reviews/{id}")), &id)
        .await
        .unwrap();
    assert_eq!(record.doc_number.to_string(), "TF-001");
    engine.shutdown().await;
}

#[tokio::test]
async fn new_drafts_copy_the_type_template() {
    let harness = Harness::seeded().await;
    harness.storage.add_file(&doc_id("tpl-rfc"), "RFC template", "templates");
    let config = EngineConfig::new()
        .with_base_url("https://docs.example.com")
        .with_document_type(rfc_type().with_template("tpl-rfc"))
        .with_document_type(prd_type());
    let engine = WorkflowEngine::new(config, common::collaborators(&harness)).unwrap();

    let request = serde_json::from_value(new_draft()).unwrap();
    let record = engine.create_draft(&create(OWNER), request).await.unwrap();
    let file = harness.storage.file(&record.id).unwrap();
    assert_eq!(file.template.as_deref(), Some("tpl-rfc"));
    assert_eq!(record.owners, emails(&[OWNER]));
    engine.shutdown().await;
}

#[tokio::test]
async fn invalid_new_drafts_create_nothing() {
    let harness = Harness::seeded().await;
    let engine = engine(&harness);

    let mut cases = Vec::new();
    for (field, value) in [
        ("title", json!(" ")),
        ("docType", json!("ADR")),
        ("product", json!("Nomad")),
        ("product", json!("")),
    ] {
        let mut body = new_draft();
        body[field] = value;
        cases.push(body);
    }
    let mut undeclared = new_draft();
    undeclared["customFields"][0]["name"] = json!("budget");
    undeclared["customFields"][0]["displayName"] = json!("Budget");
    cases.push(undeclared);
    let mut unknown_key = new_draft();
    unknown_key["status"] = json!("Approved");
    cases.push(unknown_key);

    for body in cases {
        let response = dispatch(&engine, &create(OWNER), body.clone()).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{body}");
    }
    assert!(harness.storage.file_ids().is_empty());
    assert!(harness.datastore.tables().await.documents.is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn failed_draft_creation_deletes_the_new_file() {
    let harness = Harness::seeded().await;
    harness.faults.fail("share_file");
    let engine = engine(&harness);

    let response = dispatch(&engine, &create(OWNER), new_draft()).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.storage.file_ids().is_empty());
    assert!(harness.datastore.tables().await.documents.is_empty());

    harness.faults.clear_all();
    harness.faults.fail("create_file");
    let response = dispatch(&engine, &create(OWNER), new_draft()).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.datastore.tables().await.documents.is_empty());

    engine.wait_idle().await;
    assert_eq!(engine.queue_stats().submitted, 0);
    engine.shutdown().await;
}
