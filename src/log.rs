//! Structured log lines and logfmt-style metrics.
//!
//! Every record is a flat `key → value` map handed to a [`LogSink`]. Metrics
//! are ordinary records with a namespaced key:
//!
//! ```text
//! count#billing.http.200=1 count#billing.http.2xx=1 request_path=/health source=prod app=billing request-id=…
//! measure#billing.http-health=0.412ms source=prod app=billing request-id=…
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Instant;

use regex::Regex;

use crate::config::Config;
use crate::context;

/// One structured log line.
pub type Record = BTreeMap<String, String>;

// ── Values ────────────────────────────────────────────────────────────────────

/// A loggable value.
///
/// Floats render with three decimals, text passes through untouched, so
/// `measure("t", "42ms")` keeps its unit.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v)   => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.3}"),
            Self::Bool(v)  => write!(f, "{v}"),
            Self::Text(v)  => f.write_str(v),
        }
    }
}

macro_rules! int_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self { Self::Int(i64::from(v)) }
        })*
    };
}

int_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        i64::try_from(v).map_or_else(|_| Self::Text(v.to_string()), Self::Int)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or_else(|_| Self::Text(v.to_string()), Self::Int)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self { Self::Float(f64::from(v)) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Self::Float(v) }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Self::Bool(v) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Self::Text(v) }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self { Self::Text(v.clone()) }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Destination for finished records. Implementations write one line per call
/// and must not block for long: the request path calls this inline.
pub trait LogSink: Send + Sync + 'static {
    fn write(&self, record: &Record);
}

/// Writes each record as a logfmt line through `tracing` at `INFO`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, record: &Record) {
        tracing::info!(target: "vaultkit::log", "{}", logfmt(record));
    }
}

/// Keeps every record in memory. Handy in tests and for embedders that ship
/// records somewhere themselves.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemorySink {
    pub fn new() -> Self { Self::default() }

    /// All records written so far, oldest first.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().map(|r| r.to_vec()).unwrap_or_default()
    }

    /// The first record carrying `key`, if any.
    pub fn find(&self, key: &str) -> Option<Record> {
        self.records().into_iter().find(|r| r.contains_key(key))
    }

    /// Value of `key` in the first record that carries it.
    pub fn value(&self, key: &str) -> Option<String> {
        self.find(key).and_then(|mut r| r.remove(key))
    }
}

impl LogSink for MemorySink {
    fn write(&self, record: &Record) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

fn logfmt(record: &Record) -> String {
    let mut line = String::new();
    for (key, value) in record {
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(key);
        line.push('=');
        if value.is_empty() || value.contains([' ', '"', '=']) {
            line.push_str(&format!("{value:?}"));
        } else {
            line.push_str(value);
        }
    }
    line
}

// ── Metric names ──────────────────────────────────────────────────────────────

static PARAM_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?::\w+|\{\*?\w+\})").expect("static regex")
});
static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[/_]+").expect("static regex"));
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9\-_]").expect("static regex"));

/// Turns a route template into a metric-safe name.
///
/// Parameter segments (`/:id`, `/{id}`, `/{*rest}`) are dropped, runs of `/`
/// or `_` become a single `-`, anything outside `[A-Za-z0-9_-]` is removed
/// and leading dashes are stripped.
///
/// ```rust
/// use vaultkit::log::metric_name;
///
/// assert_eq!(metric_name("/some/:web/path"), "some-path");
/// assert_eq!(metric_name("/users/{id}/keys"), "users-keys");
/// assert_eq!(metric_name("/some/web+path"), "some-webpath");
/// ```
pub fn metric_name(route: &str) -> String {
    let name = PARAM_SEGMENT.replace_all(route, "");
    let name = SEPARATORS.replace_all(&name, "-");
    let name = DISALLOWED.replace_all(&name, "");
    name.trim_start_matches('-').to_owned()
}

// ── Log ───────────────────────────────────────────────────────────────────────

/// Logging and metrics front end.
///
/// Cheap to clone; every clone writes to the same sink with the same
/// process identity.
#[derive(Clone)]
pub struct Log {
    inner: Arc<LogInner>,
}

struct LogInner {
    app_name: String,
    app_deploy: Option<String>,
    sink: Arc<dyn LogSink>,
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log")
            .field("app_name", &self.inner.app_name)
            .field("app_deploy", &self.inner.app_deploy)
            .finish_non_exhaustive()
    }
}

impl Log {
    pub fn new(config: &Config, sink: impl LogSink) -> Self {
        Self {
            inner: Arc::new(LogInner {
                app_name: config.app_name().to_owned(),
                app_deploy: config.app_deploy().map(str::to_owned),
                sink: Arc::new(sink),
            }),
        }
    }

    /// Counts `value` occurrences of `name`.
    pub fn count(&self, name: &str, value: impl Into<Value>, extra: Record) {
        let mut data = extra;
        data.insert(format!("count#{}.{name}", self.inner.app_name), value.into().to_string());
        self.emit(data);
    }

    /// Records a measurement. Text values keep any unit suffix they carry.
    pub fn measure(&self, name: &str, value: impl Into<Value>, extra: Record) {
        let mut data = extra;
        data.insert(format!("measure#{}.{name}", self.inner.app_name), value.into().to_string());
        self.emit(data);
    }

    /// Counts one `http.<code>` and one `http.<d>xx`, both carrying `extra`.
    pub fn count_status(&self, status: u16, extra: Record) {
        self.count(&format!("http.{status}"), 1, extra.clone());
        if let Some(class) = status.to_string().chars().next() {
            self.count(&format!("http.{class}xx"), 1, extra);
        }
    }

    /// Records a duration under the normalized route name. A missing or empty
    /// name emits nothing.
    pub fn time(&self, route: Option<&str>, duration_ms: f64) {
        let Some(route) = route.filter(|r| !r.is_empty()) else { return };
        self.measure(&metric_name(route), format!("{duration_ms}ms"), Record::new());
    }

    /// Writes `data` decorated with the process identity and the ambient
    /// request id. Keys already present in `data` win.
    pub fn log<I, K, V>(&self, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.emit(to_record(data));
    }

    /// Runs `f`, then logs `data` with its wall-clock duration as `elapsed`.
    pub fn log_block<I, K, V, R>(&self, data: I, f: impl FnOnce() -> R) -> R
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let data = to_record(data);
        let start = Instant::now();
        let out = f();
        self.emit_elapsed(data, start);
        out
    }

    /// Async form of [`log_block`](Self::log_block).
    pub async fn log_timed<I, K, V, F>(&self, data: I, fut: F) -> F::Output
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
        F: Future,
    {
        let data = to_record(data);
        let start = Instant::now();
        let out = fut.await;
        self.emit_elapsed(data, start);
        out
    }

    fn emit_elapsed(&self, mut data: Record, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        data.entry("elapsed".to_owned())
            .or_insert_with(|| Value::Float(elapsed).to_string());
        self.emit(data);
    }

    fn emit(&self, mut data: Record) {
        if let Some(deploy) = &self.inner.app_deploy {
            data.entry("source".to_owned()).or_insert_with(|| deploy.clone());
        }
        data.entry("app".to_owned()).or_insert_with(|| self.inner.app_name.clone());
        if let Some(id) = context::current_request_id() {
            data.entry("request-id".to_owned()).or_insert(id);
        }
        self.inner.sink.write(&data);
    }
}

fn to_record<I, K, V>(data: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    data.into_iter()
        .map(|(k, v)| (k.into(), v.into().to_string()))
        .collect()
}
