//! Tracing subscriber setup.
//!
//! Call [`init`] first thing in `main`. Metric lines written by
//! [`TracingSink`](crate::log::TracingSink) and the server's own events go
//! through the subscriber installed here.

use tracing_subscriber::EnvFilter;

use crate::error::Error;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Telemetry(e.to_string()))
}
