//! Unhandled handler failures.
//!
//! A handler fails by returning `Err(HandlerFailure)` (any
//! `std::error::Error` converts with `?`) or by panicking. Either way the
//! middleware reports it once and answers `500` with [`HandlerFailure::body`].
//!
//! Traces are always captured, whatever `RUST_BACKTRACE` says. A panic's
//! backtrace is taken by a panic hook on the panicking thread and picked up
//! by [`HandlerFailure::from_panic`] when the unwind is caught.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::panic;
use std::sync::Once;

use http::StatusCode;

use crate::response::{IntoResponse, Response};

/// A failure raised inside a route handler.
#[derive(Clone, Debug)]
pub struct HandlerFailure {
    kind: String,
    message: String,
    trace: String,
}

impl HandlerFailure {
    /// A failure of the given kind with a backtrace captured here.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: capture_backtrace(),
        }
    }

    /// Converts a boxed error, keeping its source chain.
    ///
    /// ```rust
    /// use vaultkit::HandlerFailure;
    ///
    /// fn load() -> Result<u32, Box<dyn std::error::Error + Send + Sync>> {
    ///     Err("store unavailable".into())
    /// }
    ///
    /// let failure = load().map_err(HandlerFailure::from_boxed).unwrap_err();
    /// assert_eq!(failure.to_string(), "Error: store unavailable");
    /// ```
    pub fn from_boxed(err: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        let mut trace = source_chain(err.as_ref());
        append(&mut trace, capture_backtrace());
        Self { kind: "Error".to_owned(), message: err.to_string(), trace }
    }

    /// Builds a failure from a `catch_unwind` payload. Must run on the
    /// thread that panicked to pick up the hook's backtrace; otherwise the
    /// trace is captured here.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        let trace = PANIC_TRACE
            .try_with(RefCell::take)
            .ok()
            .flatten()
            .unwrap_or_else(capture_backtrace);
        Self { kind: "Panic".to_owned(), message, trace }
    }

    pub fn kind(&self) -> &str { &self.kind }
    pub fn message(&self) -> &str { &self.message }
    pub fn trace(&self) -> &str { &self.trace }

    /// The diagnostic response body: `"{kind}: {message}\n\n{trace}"`.
    pub fn body(&self) -> String {
        format!("{}: {}\n\n{}", self.kind, self.message, self.trace)
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl<E> From<E> for HandlerFailure
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        let mut trace = source_chain(&err);
        append(&mut trace, capture_backtrace());
        Self { kind: short_type_name::<E>().to_owned(), message: err.to_string(), trace }
    }
}

impl IntoResponse for HandlerFailure {
    fn into_response(self) -> Response {
        let mut response = Response::status(StatusCode::INTERNAL_SERVER_ERROR);
        response.failure = Some(Box::new(self));
        response
    }
}

/// `my_crate::db::QueryError<T>` → `QueryError`.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn source_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    lines.join("\n")
}

fn capture_backtrace() -> String {
    Backtrace::force_capture().to_string()
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Chains a hook in front of the current one that stores each panic's
/// backtrace for the thread it happened on. Installed once per process.
pub(crate) fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info.location().map(ToString::to_string).unwrap_or_default();
            let trace = format!("panicked at {location}\n{}", Backtrace::force_capture());
            let _ = PANIC_TRACE.try_with(|slot| slot.replace(Some(trace)));
            previous(info);
        }));
    });
}

fn append(trace: &mut String, more: String) {
    if !trace.is_empty() {
        trace.push('\n');
    }
    trace.push_str(&more);
}
