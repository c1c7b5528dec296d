//! Process identity and environment-driven settings.
//!
//! Everything here is read once at startup and immutable afterwards. A
//! missing required value is a [`Error::MissingConfig`] surfaced before the
//! server binds, never a runtime surprise.

use std::env;

use http::HeaderName;

use crate::error::Error;

/// Inbound correlation header used when `REQUEST_ID_HEADER` is unset.
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

/// Immutable process configuration.
#[derive(Clone, Debug)]
pub struct Config {
    app_name: String,
    app_deploy: Option<String>,
    production: bool,
    ssl_enabled: bool,
    basic_passwords: Vec<String>,
    request_id_header: HeaderName,
}

impl Config {
    /// A development configuration for `app_name`: no deploy id, not
    /// production, no default passwords, `X-Request-ID` inbound header.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_deploy: None,
            production: false,
            ssl_enabled: true,
            basic_passwords: Vec::new(),
            request_id_header: HeaderName::from_static(DEFAULT_REQUEST_ID_HEADER),
        }
    }

    /// Loads the configuration from the process environment.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `APP_NAME` | metric namespace and `app` log field (required) |
    /// | `APP_DEPLOY` | `source` log field |
    /// | `APP_ENV` | `production` enables production mode |
    /// | `DISABLE_SSL` | `true` turns off https enforcement |
    /// | `BASIC_PASSWORD` | comma-separated default Basic Auth passwords |
    /// | `REQUEST_ID_HEADER` | inbound correlation header name |
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let app_name = non_empty("APP_NAME").ok_or(Error::MissingConfig("APP_NAME"))?;
        let mut config = Self::new(app_name);

        config.app_deploy = non_empty("APP_DEPLOY");
        config.production = non_empty("APP_ENV").is_some_and(|v| v == "production");
        config.ssl_enabled = match non_empty("DISABLE_SSL").as_deref() {
            None | Some("false") => true,
            Some("true") => false,
            Some(other) => {
                return Err(Error::InvalidConfig { key: "DISABLE_SSL", value: other.to_owned() });
            }
        };
        if let Some(raw) = non_empty("BASIC_PASSWORD") {
            config.basic_passwords = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(raw) = non_empty("REQUEST_ID_HEADER") {
            config.request_id_header = HeaderName::try_from(raw.as_str())
                .map_err(|_| Error::InvalidConfig { key: "REQUEST_ID_HEADER", value: raw.clone() })?;
        }
        Ok(config)
    }

    pub fn with_deploy(mut self, deploy: impl Into<String>) -> Self {
        self.app_deploy = Some(deploy.into());
        self
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn with_ssl(mut self, enabled: bool) -> Self {
        self.ssl_enabled = enabled;
        self
    }

    pub fn with_basic_passwords<I, S>(mut self, passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.basic_passwords = passwords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_request_id_header(mut self, header: HeaderName) -> Self {
        self.request_id_header = header;
        self
    }

    pub fn app_name(&self) -> &str { &self.app_name }
    pub fn app_deploy(&self) -> Option<&str> { self.app_deploy.as_deref() }
    pub fn is_production(&self) -> bool { self.production }
    pub fn basic_passwords(&self) -> &[String] { &self.basic_passwords }
    pub fn request_id_header(&self) -> &HeaderName { &self.request_id_header }

    /// Plain-http requests are redirected only in production with SSL on.
    pub fn enforce_ssl(&self) -> bool {
        self.ssl_enabled && self.production
    }
}
