//! Radix-tree request router.
//!
//! One `matchit` tree per HTTP method, plus one "any verb" tree consulted
//! when the method's own tree has no match. The router also owns the
//! [`ProtectionPolicy`] while routes are registered, so marking a route
//! unprotected happens in the same call that registers it.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::health;
use crate::method::Method;
use crate::policy::ProtectionPolicy;

#[derive(Clone)]
struct Route {
    pattern: Arc<str>,
    handler: BoxedHandler,
}

pub(crate) struct Matched {
    pub(crate) pattern: Arc<str>,
    pub(crate) handler: BoxedHandler,
    pub(crate) params: HashMap<String, String>,
}

/// The application router.
///
/// Build it once at startup and hand it to [`App::new`](crate::App::new).
/// Every router starts with the built-in unprotected endpoints from
/// [`health`]: `/` (any verb), `/health` and `/boom`.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    any: MatchitRouter<Route>,
    pub(crate) policy: ProtectionPolicy,
    pub(crate) protect_by_default: bool,
}

impl Router {
    pub fn new() -> Self {
        health::mount(Self {
            routes: HashMap::new(),
            any: MatchitRouter::new(),
            policy: ProtectionPolicy::default(),
            protect_by_default: false,
        })
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax, catch-alls `{*name}`:
    ///
    /// ```rust
    /// # use vaultkit::{Method, Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::Get,  "/users/{id}", get_user)
    ///     .on(Method::Post, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`. Routes are fixed at startup, so this is a
    /// programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler.into_boxed_handler());
        self
    }

    /// Like [`on`](Self::on), and exempts `path` from authentication.
    ///
    /// A `GET` route also answers `HEAD` with the same handler, so both
    /// verbs get identical protection.
    pub fn on_unprotected(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.mark_unprotected(path);
        let handler = handler.into_boxed_handler();
        if method == Method::Get {
            self.add(Method::Head, path, handler.clone());
        }
        self.add(method, path, handler);
        self
    }

    /// Registers an unprotected handler that answers every verb on `path`
    /// unless a method-specific route matches first.
    pub fn any_unprotected(mut self, path: &str, handler: impl Handler) -> Self {
        self.mark_unprotected(path);
        let route = Route { pattern: Arc::from(path), handler: handler.into_boxed_handler() };
        self.any
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Requires authentication for every request whose path is not
    /// unprotected, before the handler runs, using the default passwords.
    pub fn protect_by_default(mut self) -> Self {
        self.protect_by_default = true;
        self
    }

    fn mark_unprotected(&mut self, path: &str) {
        self.policy
            .register_unprotected(path)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
    }

    fn add(&mut self, method: Method, path: &str, handler: BoxedHandler) {
        let route = Route { pattern: Arc::from(path), handler };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{method} {path}`: {e}"));
    }

    /// Finds the route for `method` and `path`. A method-specific route wins
    /// over an any-verb one; a method this crate does not model (`None`)
    /// only sees any-verb routes.
    pub(crate) fn lookup(&self, method: Option<Method>, path: &str) -> Option<Matched> {
        let matched = method
            .and_then(|m| self.routes.get(&m))
            .and_then(|tree| tree.at(path).ok())
            .or_else(|| self.any.at(path).ok())?;
        Some(Matched {
            pattern: Arc::clone(&matched.value.pattern),
            handler: matched.value.handler.clone(),
            params: matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect(),
        })
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
