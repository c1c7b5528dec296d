//! Per-request correlation context.
//!
//! Each inbound request gets exactly one [`RequestContext`]. It lives in
//! tokio task-local storage for the duration of the request future, so any
//! code awaited inside that future (handlers, log calls, outbound clients)
//! can read it without threading it through every signature. Concurrent
//! requests run as separate futures and never see each other's context.

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// The correlation id of one in-flight request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    request_id: Arc<str>,
}

impl RequestContext {
    /// Adopts the inbound header value, or generates a UUID v4 when the
    /// header is missing or blank.
    pub fn resolve(inbound: Option<&str>) -> Self {
        let request_id: Arc<str> = inbound
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Arc::from)
            .unwrap_or_else(|| Arc::from(Uuid::new_v4().to_string()));
        Self { request_id }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Runs `fut` with `self` as the ambient context.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// Runs a synchronous closure with `self` as the ambient context.
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }

    /// The context of the request currently being handled, if any.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }
}

/// Shorthand for `RequestContext::current()` mapped to its id.
pub fn current_request_id() -> Option<String> {
    CURRENT.try_with(|ctx| ctx.request_id.to_string()).ok()
}
