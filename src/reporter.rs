//! Crash reporting.
//!
//! The middleware hands every unhandled [`HandlerFailure`] to the configured
//! [`ErrorReporter`] exactly once, together with the request's context map.
//! Delivery (Rollbar, Sentry, a queue, …) is the reporter's business.

use std::sync::{Arc, Mutex};

use crate::failure::HandlerFailure;
use crate::log::Record;

/// Receives unhandled handler failures.
pub trait ErrorReporter: Send + Sync + 'static {
    fn notify(&self, failure: &HandlerFailure, context: &Record);
}

/// Default reporter: one `ERROR` event through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn notify(&self, failure: &HandlerFailure, context: &Record) {
        tracing::error!(
            kind = failure.kind(),
            error = failure.message(),
            request_id = context.get("request-id").map(String::as_str),
            path = context.get("path").map(String::as_str),
            "unhandled handler failure"
        );
    }
}

/// Collects reports in memory instead of delivering them.
#[derive(Clone, Debug, Default)]
pub struct MemoryReporter {
    reports: Arc<Mutex<Vec<(HandlerFailure, Record)>>>,
}

impl MemoryReporter {
    pub fn new() -> Self { Self::default() }

    pub fn reports(&self) -> Vec<(HandlerFailure, Record)> {
        self.reports.lock().map(|r| r.to_vec()).unwrap_or_default()
    }
}

impl ErrorReporter for MemoryReporter {
    fn notify(&self, failure: &HandlerFailure, context: &Record) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((failure.clone(), context.clone()));
        }
    }
}
