#![allow(dead_code)]

use docflow_core::{Collaborators, EngineConfig, RequestContext, WorkflowEngine};
use docflow_test_utils::{init_test_logging, prd_type, rfc_type, Harness};
use http::Method;
use std::sync::Arc;

pub fn config() -> EngineConfig {
    EngineConfig::new()
        .with_base_url("https://docs.example.com")
        .with_document_type(rfc_type())
        .with_document_type(prd_type())
}

pub fn collaborators(harness: &Harness) -> Collaborators {
    Collaborators {
        storage: Arc::clone(&harness.storage) as _,
        search: Arc::clone(&harness.search) as _,
        redirects: Arc::clone(&harness.search) as _,
        datastore: Arc::clone(&harness.datastore) as _,
        notifier: Arc::clone(&harness.notifier) as _,
    }
}

pub fn engine(harness: &Harness) -> WorkflowEngine {
    init_test_logging();
    WorkflowEngine::new(config(), collaborators(harness)).unwrap()
}

pub fn ctx(user: &str, method: Method, path: &str) -> RequestContext {
    RequestContext::new(user, method, path)
}

pub fn review(user: &str, id: &str) -> RequestContext {
    ctx(user, Method::POST, &format!("/reviews/{id}"))
}

pub fn approval(user: &str, method: Method, id: &str) -> RequestContext {
    ctx(user, method, &format!("/approvals/{id}"))
}
