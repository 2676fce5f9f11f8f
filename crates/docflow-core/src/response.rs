//! HTTP-shaped responses
//!
//! The engine has no server of its own. Operations map onto a status code,
//! a header map and a JSON body so any transport can relay them unchanged.

use crate::error::WorkflowError;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

/// Header listing the verbs a caller may use, set by capability probes
pub const ALLOWED_HEADER: HeaderName = HeaderName::from_static("allowed");

/// Transport-neutral response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ApiResponse {
    /// 200 with a JSON body
    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// 200 with a serialized payload
    ///
    /// A payload that fails to serialize becomes a 500.
    #[must_use]
    pub fn json<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(body) => Self::ok(body),
            Err(error) => {
                tracing::error!(%error, "error encoding response");
                Self::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }

    /// Error response with a short client-facing message
    #[must_use]
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: json!({ "error": message.into() }),
        }
    }

    /// Map a workflow error; the internal cause is never echoed
    #[must_use]
    pub fn from_error(err: &WorkflowError) -> Self {
        Self::error(err.status_code(), err.public_message())
    }

    /// Map an operation result, serializing the success value
    #[must_use]
    pub fn from_result<T: Serialize>(result: Result<T, WorkflowError>) -> Self {
        match result {
            Ok(value) => Self::json(&value),
            Err(err) => Self::from_error(&err),
        }
    }

    /// 200 with the `Allowed` header listing `verbs`, empty when none
    #[must_use]
    pub fn allowed(verbs: &[Method]) -> Self {
        let list = verbs.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
        let mut response = Self::ok(Value::Null);
        let value = HeaderValue::from_str(&list).unwrap_or_else(|_| HeaderValue::from_static(""));
        response.headers.insert(ALLOWED_HEADER, value);
        response
    }

    /// Value of the `Allowed` header, if set
    #[must_use]
    pub fn allowed_verbs(&self) -> Option<&str> {
        self.headers.get(ALLOWED_HEADER).and_then(|v| v.to_str().ok())
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
