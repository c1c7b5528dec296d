//! Per-request instrumentation.
//!
//! [`App`] wraps a [`Router`] and runs every request through the same
//! pipeline:
//!
//! ```text
//! Start ─→ Authenticate ─→ Dispatch ─→ Measure ─→ Success ─┐
//!   │           │                         │                ├─→ Respond
//!   │           └─ 401 ───────────────────┤──→ Failure ────┘
//!   └─ 301 (plain http in production) ────┘
//! ```
//!
//! - **Start**: resolve the correlation id from the inbound header (or mint
//!   one), open its task-local scope, take the start instant.
//! - **Authenticate**: with [`Router::protect_by_default`], reject anything
//!   not unprotected and not carrying a default password. A 401 is a normal
//!   response: it is measured but never reported as a crash.
//! - **Dispatch**: the matched handler runs exactly once. Panics are caught
//!   at this boundary. A verb outside [`Method`] still reaches any-verb
//!   routes; anywhere else it is a `405`.
//! - **Measure**: always. `http.<code>` and `http.<d>xx` counts, then the
//!   timing under the route's normalized name when a route matched.
//! - **Failure**: the failure is taken out of the response (so it cannot be
//!   seen twice), reported once, and replaced by a diagnostic `500` body.
//! - **Respond**: `Request-ID` is set on whatever goes out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::FutureExt as _;
use http::{HeaderName, StatusCode, header, request::Parts};
use http_body_util::{BodyExt as _, Full};

use crate::config::Config;
use crate::context::RequestContext;
use crate::failure::{self, HandlerFailure};
use crate::log::{Log, LogSink, Record, TracingSink};
use crate::method::Method;
use crate::outbound;
use crate::policy::{ProtectionPolicy, Unauthorized};
use crate::reporter::{ErrorReporter, LogReporter};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::Router;

/// Response header carrying the correlation id.
pub static REQUEST_ID: HeaderName = HeaderName::from_static("request-id");

/// A router plus everything needed to instrument it.
///
/// Cheap to clone; clones share the router, policy, sink and reporter.
#[derive(Clone)]
pub struct App {
    router: Arc<Router>,
    policy: Arc<ProtectionPolicy>,
    config: Arc<Config>,
    log: Log,
    reporter: Arc<dyn ErrorReporter>,
}

impl App {
    /// Freezes `router` and wires it to `config`.
    ///
    /// Records go to [`TracingSink`] and failures to [`LogReporter`] until
    /// replaced. Also installs outbound request-id decoration for the
    /// configured header and the panic hook that keeps panic backtraces for
    /// the diagnostic body (both no-ops after the first `App`).
    pub fn new(config: Config, mut router: Router) -> Self {
        let mut policy = std::mem::take(&mut router.policy);
        policy.set_default_passwords(config.basic_passwords());
        outbound::install(config.request_id_header().clone());
        failure::install_panic_hook();

        Self {
            log: Log::new(&config, TracingSink),
            router: Arc::new(router),
            policy: Arc::new(policy),
            config: Arc::new(config),
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_sink(mut self, sink: impl LogSink) -> Self {
        self.log = Log::new(&self.config, sink);
        self
    }

    pub fn with_reporter(mut self, reporter: impl ErrorReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn log(&self) -> &Log { &self.log }
    pub fn config(&self) -> &Config { &self.config }
    pub fn policy(&self) -> &ProtectionPolicy { &self.policy }

    /// Runs one request through the full pipeline.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let inbound = parts
            .headers
            .get(self.config.request_id_header())
            .and_then(|v| v.to_str().ok());
        let ctx = RequestContext::resolve(inbound);
        let request_id = ctx.request_id().to_owned();

        let mut response = ctx.scope(self.instrument(parts, body)).await;

        response.set_header(REQUEST_ID.clone(), &request_id);
        response.into_http()
    }

    async fn instrument<B>(&self, parts: Parts, body: B) -> Response
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        let start = Instant::now();
        let path = parts.uri.path().to_owned();
        let method = parts.method.clone();

        let (mut response, route) = self.dispatch(parts, body).await;

        // Measure
        let elapsed_ms = (start.elapsed().as_secs_f64() * 1_000_000.0).round() / 1000.0;
        let mut extra = response.metadata.clone();
        extra.entry("request_path".to_owned()).or_insert_with(|| path.clone());
        self.log.count_status(response.status.as_u16(), extra);
        let timing_name = route.as_deref().map(|r| format!("http.{r}"));
        self.log.time(timing_name.as_deref(), elapsed_ms);

        // Failure
        if let Some(failure) = response.take_failure() {
            let mut context = Record::new();
            if let Some(id) = crate::context::current_request_id() {
                context.insert("request-id".to_owned(), id);
            }
            context.insert("method".to_owned(), method.to_string());
            context.insert("path".to_owned(), path);
            if let Some(route) = &route {
                context.insert("route".to_owned(), route.to_string());
            }
            self.reporter.notify(&failure, &context);
            response = Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .text(failure.body());
        }

        response
    }

    /// Start (ssl) → Authenticate → Dispatch. Returns the response and the
    /// matched route template, if any.
    async fn dispatch<B>(&self, parts: Parts, body: B) -> (Response, Option<Arc<str>>)
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        let path = parts.uri.path();
        let method = Method::try_from(&parts.method).ok();
        let matched = self.router.lookup(method, path);
        let route = matched.as_ref().map(|m| Arc::clone(&m.pattern));

        if method.is_none() && matched.is_none() {
            return (Response::status(StatusCode::METHOD_NOT_ALLOWED), None);
        }

        if self.config.enforce_ssl() && !is_https(&parts) {
            return (https_redirect(&parts), route);
        }

        if self.router.protect_by_default {
            let credentials = parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(crate::policy::Credentials::from_authorization);
            if !self.policy.authorized(path, credentials.as_ref(), &[]) {
                return (Unauthorized.into_response(), route);
            }
        }

        let Some(matched) = matched else {
            return (Response::status(StatusCode::NOT_FOUND), None);
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::debug!(error = %e, "failed to read request body");
                return (Response::status(StatusCode::BAD_REQUEST), route);
            }
        };

        let request = Request {
            method: parts.method,
            path: path.to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers: parts.headers,
            body,
            params: matched.params,
            route: Arc::clone(&matched.pattern),
            policy: Arc::clone(&self.policy),
            log: self.log.clone(),
        };

        let handler = matched.handler;
        let response = AssertUnwindSafe(async move { handler.call(request).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| HandlerFailure::from_panic(payload).into_response());

        (response, route)
    }
}

/// TLS is terminated upstream; trust the proxy's `X-Forwarded-Proto`.
fn is_https(parts: &Parts) -> bool {
    parts.uri.scheme_str() == Some("https")
        || parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

fn https_redirect(parts: &Parts) -> Response {
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.host());
    let Some(host) = host else {
        return Response::status(StatusCode::BAD_REQUEST);
    };
    let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION.as_str(), &format!("https://{host}{target}"))
        .no_body()
}
