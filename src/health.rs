//! Built-in endpoints every [`Router`] starts with.
//!
//! | Path | Verbs | Answer |
//! |---|---|---|
//! | `/` | any | `200`, empty body. Is the process up? |
//! | `/health` | `GET`, `HEAD` | `200 OK` with body `OK` |
//! | `/boom` | `GET`, `HEAD` | always fails, to exercise crash reporting and paging end to end |
//!
//! All three are unprotected.

use http::StatusCode;

use crate::failure::HandlerFailure;
use crate::method::Method;
use crate::router::Router;
use crate::{Request, Response};

/// The error `/boom` fails with.
#[derive(Debug, thiserror::Error)]
#[error("An expected error occurred.")]
pub struct ExpectedError;

pub(crate) fn mount(router: Router) -> Router {
    router
        .any_unprotected("/", liveness)
        .on_unprotected(Method::Get, "/health", health)
        .on_unprotected(Method::Get, "/boom", boom)
}

/// Liveness: the process answers HTTP at all.
pub async fn liveness(_req: Request) -> Response {
    Response::status(StatusCode::OK)
}

pub async fn health(_req: Request) -> Response {
    Response::text("OK")
}

/// Fails on every call.
pub async fn boom(_req: Request) -> Result<Response, HandlerFailure> {
    Err(ExpectedError.into())
}
