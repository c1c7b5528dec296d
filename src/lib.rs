//! # vaultkit
//!
//! A minimal HTTP framework for internal services, with the cross-cutting
//! plumbing every one of them needs already wired in.
//!
//! ## What every request gets
//!
//! - **Correlation id**: taken from `X-Request-ID` (or minted), visible to
//!   all code running for that request, stamped on outbound calls via
//!   [`outbound`], echoed back as `Request-ID`.
//! - **Authentication gate**: HTTP Basic Auth with an allowlist of
//!   unprotected route patterns. See [`Request::protect`] and
//!   [`Router::on_unprotected`].
//! - **Metrics**: `count#app.http.200`, `count#app.http.2xx` and a
//!   `measure#app.http-<route>` timing line per request, via [`log::Log`].
//! - **Crash reporting**: a failing or panicking handler is reported once
//!   to the [`ErrorReporter`] and answered with a diagnostic `500`.
//!
//! TLS, rate limiting and body-size limits belong to the reverse proxy in
//! front.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vaultkit::{App, Config, Method, Request, Response, Router, Server, Unauthorized};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vaultkit::Error> {
//!     vaultkit::telemetry::init()?;
//!     let config = Config::from_env()?;
//!
//!     let router = Router::new()
//!         .on(Method::Get, "/invoices/{id}", get_invoice)
//!         .on_unprotected(Method::Get, "/docs", docs);
//!
//!     Server::bind("0.0.0.0:3000")?.serve(App::new(config, router)).await
//! }
//!
//! async fn get_invoice(req: Request) -> Result<Response, Unauthorized> {
//!     req.protect(&[])?;
//!     let id = req.param("id").unwrap_or("unknown");
//!     req.log().count("invoices.viewed", 1, Default::default());
//!     Ok(Response::json(format!(r#"{{"id":"{id}"}}"#)))
//! }
//!
//! async fn docs(_req: Request) -> Response {
//!     Response::text("see README")
//! }
//! ```

mod config;
mod context;
mod error;
mod failure;
mod handler;
mod method;
mod middleware;
mod policy;
mod reporter;
mod request;
mod response;
mod router;
mod server;

pub mod health;
pub mod log;
pub mod outbound;
pub mod telemetry;

pub use config::{Config, DEFAULT_REQUEST_ID_HEADER};
pub use context::{RequestContext, current_request_id};
pub use error::Error;
pub use failure::HandlerFailure;
pub use handler::Handler;
pub use method::Method;
pub use middleware::{App, REQUEST_ID};
pub use policy::{Credentials, ProtectionPolicy, Unauthorized};
pub use reporter::{ErrorReporter, LogReporter, MemoryReporter};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
