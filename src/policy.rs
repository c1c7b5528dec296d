//! HTTP Basic Auth gate with an allowlist of unprotected paths.
//!
//! Unprotected patterns use router syntax (`/health`, `/users/{id}`,
//! `/assets/{*path}`) and are compiled with the same `matchit` engine the
//! [`Router`](crate::Router) uses, so "this pattern matches that path" means
//! exactly what it means for routing.
//!
//! Patterns are added while the router is being built. Once serving starts
//! the policy sits behind an `Arc` and is only read.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::{StatusCode, header};
use matchit::Router as MatchitRouter;
use subtle::ConstantTimeEq;

use crate::response::{IntoResponse, Response};

/// Username and password from an `Authorization: Basic …` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Parses an `Authorization` header value. Anything other than a
    /// well-formed Basic credential yields `None`.
    pub fn from_authorization(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self { username: username.to_owned(), password: password.to_owned() })
    }
}

struct Pattern {
    source: String,
    tree: MatchitRouter<()>,
}

/// Which paths skip authentication, and which passwords open the rest.
#[derive(Default)]
pub struct ProtectionPolicy {
    unprotected: Vec<Pattern>,
    passwords: Vec<String>,
}

impl ProtectionPolicy {
    pub fn new<I, S>(passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { unprotected: Vec::new(), passwords: passwords.into_iter().map(Into::into).collect() }
    }

    /// Adds `pattern` to the allowlist. Registering the same pattern twice
    /// is a no-op.
    pub fn register_unprotected(&mut self, pattern: &str) -> Result<(), matchit::InsertError> {
        if self.unprotected.iter().any(|p| p.source == pattern) {
            return Ok(());
        }
        let mut tree = MatchitRouter::new();
        tree.insert(pattern, ())?;
        self.unprotected.push(Pattern { source: pattern.to_owned(), tree });
        Ok(())
    }

    /// Registered patterns in registration order.
    pub fn unprotected_patterns(&self) -> impl Iterator<Item = &str> {
        self.unprotected.iter().map(|p| p.source.as_str())
    }

    pub fn is_unprotected(&self, path: &str) -> bool {
        self.unprotected.iter().any(|p| p.tree.at(path).is_ok())
    }

    pub(crate) fn set_default_passwords(&mut self, passwords: &[String]) {
        self.passwords = passwords.to_vec();
    }

    /// `true` if `path` is unprotected, or the supplied Basic password is
    /// one of `passwords`. An empty `passwords` means "use the defaults";
    /// no passwords at all means nobody gets in.
    pub fn authorized(&self, path: &str, credentials: Option<&Credentials>, passwords: &[&str]) -> bool {
        if self.is_unprotected(path) {
            return true;
        }
        let Some(credentials) = credentials else { return false };
        let given = credentials.password.as_bytes();
        if passwords.is_empty() {
            self.passwords.iter().any(|p| bool::from(p.as_bytes().ct_eq(given)))
        } else {
            passwords.iter().any(|p| bool::from(p.as_bytes().ct_eq(given)))
        }
    }
}

/// Rejection from the authentication gate: `401` with a Basic challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unauthorized;

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header(header::WWW_AUTHENTICATE.as_str(), r#"Basic realm="Restricted Area""#)
            .text("Not authorized\n")
    }
}
