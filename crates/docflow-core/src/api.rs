//! Routing of HTTP-shaped requests onto engine operations
//!
//! | Method  | Path              | Operation                     |
//! |---------|-------------------|-------------------------------|
//! | POST    | `/reviews/{id}`   | request review                |
//! | POST    | `/approvals/{id}` | approve                       |
//! | DELETE  | `/approvals/{id}` | request changes               |
//! | OPTIONS | `/approvals/{id}` | capability probe              |
//! | POST    | `/drafts`         | create a draft                |
//! | PATCH   | `/documents/{id}` | patch a published document    |
//! | PATCH   | `/drafts/{id}`    | patch a draft                 |
//! | DELETE  | `/drafts/{id}`    | delete a draft                |

use crate::context::RequestContext;
use crate::engine::WorkflowEngine;
use crate::response::ApiResponse;
use docflow_record::DocumentId;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// A recognised request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    CreateDraft,
    RequestReview(DocumentId),
    Approve(DocumentId),
    RequestChanges(DocumentId),
    ApprovalOptions(DocumentId),
    PatchDocument(DocumentId),
    PatchDraft(DocumentId),
    DeleteDraft(DocumentId),
}

/// Why a request did not match a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    NotFound,
    MethodNotAllowed,
}

impl RouteError {
    #[must_use]
    pub fn response(self) -> ApiResponse {
        match self {
            Self::NotFound => ApiResponse::error(StatusCode::NOT_FOUND, "Not found"),
            Self::MethodNotAllowed => {
                ApiResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
            }
        }
    }
}

impl Route {
    /// Match a method and path
    ///
    /// # Errors
    /// [`RouteError::NotFound`] for unknown paths or a missing id,
    /// [`RouteError::MethodNotAllowed`] for a known resource and wrong verb.
    pub fn parse(method: &Method, path: &str) -> Result<Self, RouteError> {
        let mut segments = path.trim_matches('/').split('/');
        let (Some(resource), id, None) = (segments.next(), segments.next(), segments.next()) else {
            return Err(RouteError::NotFound);
        };
        let Some(id) = id else {
            return match (resource, method) {
                ("drafts", &Method::POST) => Ok(Self::CreateDraft),
                ("drafts", _) => Err(RouteError::MethodNotAllowed),
                _ => Err(RouteError::NotFound),
            };
        };
        let id = DocumentId::parse(id).map_err(|_| RouteError::NotFound)?;

        match (resource, method) {
            ("reviews", &Method::POST) => Ok(Self::RequestReview(id)),
            ("approvals", &Method::POST) => Ok(Self::Approve(id)),
            ("approvals", &Method::DELETE) => Ok(Self::RequestChanges(id)),
            ("approvals", &Method::OPTIONS) => Ok(Self::ApprovalOptions(id)),
            ("documents", &Method::PATCH) => Ok(Self::PatchDocument(id)),
            ("drafts", &Method::PATCH) => Ok(Self::PatchDraft(id)),
            ("drafts", &Method::DELETE) => Ok(Self::DeleteDraft(id)),
            ("reviews" | "approvals" | "documents" | "drafts", _) => {
                Err(RouteError::MethodNotAllowed)
            }
            _ => Err(RouteError::NotFound),
        }
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ApiResponse> {
    serde_json::from_value(body).map_err(|error| {
        tracing::warn!(%error, "error decoding request body");
        ApiResponse::error(StatusCode::BAD_REQUEST, "Bad request")
    })
}

/// Serve one request
///
/// The caller identity, method and path come from `ctx`; `body` is the
/// decoded JSON body, `Value::Null` when there is none.
pub async fn dispatch(engine: &WorkflowEngine, ctx: &RequestContext, body: Value) -> ApiResponse {
    let route = match Route::parse(ctx.method(), ctx.path()) {
        Ok(route) => route,
        Err(err) => {
            tracing::warn!(method = %ctx.method(), path = ctx.path(), "no route");
            return err.response();
        }
    };

    match route {
        Route::CreateDraft => match decode(body) {
            Ok(request) => {
                let result = engine.create_draft(ctx, request).await;
                ApiResponse::from_result(result.map(|record| json!({ "id": record.id.as_str() })))
            }
            Err(response) => response,
        },
        Route::RequestReview(id) => {
            let result = engine.request_review(ctx, &id).await;
            ApiResponse::from_result(result.map(|_| Value::Null))
        }
        Route::Approve(id) => {
            let result = engine.approve(ctx, &id).await;
            ApiResponse::from_result(result.map(|_| Value::Null))
        }
        Route::RequestChanges(id) => {
            let result = engine.request_changes(ctx, &id).await;
            ApiResponse::from_result(result.map(|_| Value::Null))
        }
        Route::ApprovalOptions(id) => match engine.approval_options(ctx, &id).await {
            Ok(verbs) => ApiResponse::allowed(&verbs),
            Err(err) => ApiResponse::from_error(&err),
        },
        Route::PatchDocument(id) => match decode(body) {
            Ok(patch) => {
                let result = engine.patch_document(ctx, &id, patch).await;
                ApiResponse::from_result(result.map(|_| Value::Null))
            }
            Err(response) => response,
        },
        Route::PatchDraft(id) => match decode(body) {
            Ok(patch) => {
                let result = engine.patch_draft(ctx, &id, patch).await;
                ApiResponse::from_result(result.map(|_| Value::Null))
            }
            Err(response) => response,
        },
        Route::DeleteDraft(id) => {
            let result = engine.delete_draft(ctx, &id).await;
            ApiResponse::from_result(result.map(|id| json!({ "id": id.as_str() })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> DocumentId {
        DocumentId::parse(s).unwrap()
    }

    #[test]
    fn routes_match_verbs() {
        assert_eq!(
            Route::parse(&Method::POST, "/reviews/d1"),
            Ok(Route::RequestReview(id("d1")))
        );
        assert_eq!(
            Route::parse(&Method::DELETE, "/approvals/d1"),
            Ok(Route::RequestChanges(id("d1")))
        );
        assert_eq!(
            Route::parse(&Method::OPTIONS, "/approvals/d1/"),
            Ok(Route::ApprovalOptions(id("d1")))
        );
        assert_eq!(
            Route::parse(&Method::DELETE, "/drafts/d1"),
            Ok(Route::DeleteDraft(id("d1")))
        );
        assert_eq!(Route::parse(&Method::POST, "/drafts"), Ok(Route::CreateDraft));
        assert_eq!(
            Route::parse(&Method::GET, "/drafts/"),
            Err(RouteError::MethodNotAllowed)
        );
    }

    #[test]
    fn unknown_paths_and_verbs() {
        assert_eq!(
            Route::parse(&Method::GET, "/reviews/d1"),
            Err(RouteError::MethodNotAllowed)
        );
        assert_eq!(Route::parse(&Method::POST, "/reviews"), Err(RouteError::NotFound));
        assert_eq!(
            Route::parse(&Method::POST, "/reviews/d1/extra"),
            Err(RouteError::NotFound)
        );
        assert_eq!(Route::parse(&Method::POST, "/people/d1"), Err(RouteError::NotFound));
        assert_eq!(
            RouteError::MethodNotAllowed.response().status,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
