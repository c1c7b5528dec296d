//! Correlation-id decoration for outbound HTTP calls.
//!
//! vaultkit does not ship an HTTP client. Whatever client the application
//! uses calls [`decorate`] (or [`decorate_headers`]) on each request it
//! builds; once [`install`] has run, every outbound call made while a
//! request is being handled carries that request's correlation id.
//!
//! ```rust
//! use vaultkit::{RequestContext, outbound};
//!
//! # async fn demo() {
//! outbound::install(http::HeaderName::from_static("x-request-id"));
//!
//! RequestContext::resolve(Some("JKJK-123")).scope(async {
//!     let mut req = http::Request::get("http://example.com/").body(()).unwrap();
//!     outbound::decorate(&mut req);
//!     assert_eq!(req.headers()["x-request-id"], "JKJK-123");
//! }).await;
//! # }
//! ```

use std::sync::OnceLock;

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::context::RequestContext;

static HEADER: OnceLock<HeaderName> = OnceLock::new();

/// Installs the process-wide decoration.
///
/// Only the first call has an effect and returns `true`; later calls,
/// including racing ones from other threads, return `false` and leave the
/// installed header untouched.
pub fn install(header: HeaderName) -> bool {
    let mut installed = false;
    HEADER.get_or_init(|| {
        tracing::debug!(header = header.as_str(), "outbound request-id decoration installed");
        installed = true;
        header
    });
    installed
}

/// Decorates an outbound request with the ambient correlation id.
pub fn decorate<B>(request: &mut http::Request<B>) {
    decorate_headers(request.headers_mut());
}

/// Sets the correlation header unless it is already present, so an
/// explicitly chosen id is never overwritten nor duplicated.
pub fn decorate_headers(headers: &mut HeaderMap) {
    let Some(name) = HEADER.get() else { return };
    let Some(ctx) = RequestContext::current() else { return };
    let Ok(value) = HeaderValue::from_str(ctx.request_id()) else {
        tracing::debug!(request_id = ctx.request_id(), "request id is not a valid header value");
        return;
    };
    headers.entry(name.clone()).or_insert(value);
}
