//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, header};

use crate::context;
use crate::log::Log;
use crate::policy::{Credentials, ProtectionPolicy, Unauthorized};

/// An incoming HTTP request, with its body fully read.
pub struct Request {
    pub(crate) method: http::Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) route: Arc<str>,
    pub(crate) policy: Arc<ProtectionPolicy>,
    pub(crate) log: Log,
}

impl Request {
    pub fn method(&self) -> &http::Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The route template that matched, e.g. `/users/{id}`.
    pub fn route(&self) -> &str { &self.route }

    /// Logging and metrics, decorated with this request's id.
    pub fn log(&self) -> &Log { &self.log }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The correlation id of this request.
    pub fn request_id(&self) -> Option<String> {
        context::current_request_id()
    }

    /// Basic Auth credentials, if the client sent any.
    pub fn credentials(&self) -> Option<Credentials> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(Credentials::from_authorization)
    }

    /// Rejects the request unless its path is unprotected or it carries one
    /// of `passwords` (the configured defaults when `passwords` is empty).
    ///
    /// ```rust
    /// use vaultkit::{Request, Unauthorized};
    ///
    /// async fn admin(req: Request) -> Result<&'static str, Unauthorized> {
    ///     req.protect(&["leelu-dallas-multipass"])?;
    ///     Ok("You may pass")
    /// }
    /// ```
    pub fn protect(&self, passwords: &[&str]) -> Result<(), Unauthorized> {
        let credentials = self.credentials();
        if self.policy.authorized(&self.path, credentials.as_ref(), passwords) {
            Ok(())
        } else {
            Err(Unauthorized)
        }
    }
}
