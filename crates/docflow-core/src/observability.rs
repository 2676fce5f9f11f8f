//! Logging initialisation and request spans
//!
//! Every workflow operation runs inside a span carrying `doc_id`, `method`
//! and `path`, so collaborator failures and compensation reports can be
//! correlated with the request that caused them.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs
    Json,
    /// Human-readable logs
    #[default]
    Pretty,
}

/// Initialize the global subscriber; later calls are no-ops
///
/// `RUST_LOG` controls levels and defaults to `info`.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Span for one workflow operation
#[must_use]
pub fn request_span(doc_id: &str, method: &str, path: &str, user: &str) -> Span {
    tracing::info_span!("request", doc_id = doc_id, method = method, path = path, user = user)
}

/// Span for an operation whose document id is only known once it runs
///
/// `doc_id` is filled in with [`Span::record`].
#[must_use]
pub fn pending_request_span(method: &str, path: &str, user: &str) -> Span {
    tracing::info_span!(
        "request",
        doc_id = tracing::field::Empty,
        method = method,
        path = path,
        user = user
    )
}

/// Span for background work after a response was sent
#[must_use]
pub fn task_span(task: &'static str, doc_id: &str) -> Span {
    tracing::info_span!("background", task = task, doc_id = doc_id)
}
