//! Unified error type.

/// The error type returned by vaultkit's fallible operations.
///
/// Application-level errors (401, 404, 500) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: reading configuration, binding to a port,
/// installing the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("missing required config value `{0}`")]
    MissingConfig(&'static str),

    #[error("invalid value `{value}` for config `{key}`")]
    InvalidConfig { key: &'static str, value: String },

    #[error("failed to install tracing subscriber: {0}")]
    Telemetry(String),
}
