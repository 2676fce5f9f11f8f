//! Caller identity and request correlation

use crate::observability::{pending_request_span, request_span};
use docflow_record::DocumentId;
use http::Method;
use tracing::Span;

/// Authenticated caller and the request being served
///
/// Passed explicitly into every workflow operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    user: String,
    method: Method,
    path: String,
}

impl RequestContext {
    #[inline]
    #[must_use]
    pub fn new(user: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            method,
            path: path.into(),
        }
    }

    /// Email of the authenticated caller
    #[inline]
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[inline]
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn span(&self, doc_id: &DocumentId) -> Span {
        request_span(doc_id.as_str(), self.method.as_str(), &self.path, &self.user)
    }

    /// Span for a request that creates its document
    #[must_use]
    pub fn creation_span(&self) -> Span {
        pending_request_span(self.method.as_str(), &self.path, &self.user)
    }
}
