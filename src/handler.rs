//! Route handlers.
//!
//! Any `async fn(Request) -> impl IntoResponse` is a [`Handler`]. At
//! registration the router turns it into a [`BoxedHandler`]: one shared
//! closure that calls the function and converts its output, so handlers
//! with different return types live in the same route trees. An unprotected
//! `GET` route hands the same `BoxedHandler` to its `HEAD` twin.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

type ErasedFn = dyn Fn(Request) -> BoxFuture + Send + Sync + 'static;

/// A handler with its return type erased. Clones share the handler.
#[doc(hidden)]
#[derive(Clone)]
pub struct BoxedHandler(Arc<ErasedFn>);

impl BoxedHandler {
    pub(crate) fn call(&self, req: Request) -> BoxFuture {
        (self.0)(req)
    }
}

impl fmt::Debug for BoxedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedHandler")
    }
}

/// Implemented for every valid route handler:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// Sealed; the blanket impl below is the only implementation.
pub trait Handler: sealed::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod sealed {
    pub trait Sealed {}
}

impl<F, Fut, R> sealed::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        BoxedHandler(Arc::new(move |req| {
            let fut = self(req);
            Box::pin(async move { fut.await.into_response() }) as BoxFuture
        }))
    }
}
