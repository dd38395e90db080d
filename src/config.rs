//! Forwarder configuration and its builder.
//!
//! [`ForwarderBuilder`] collects options from code or from an INI file (see
//! [`crate::file_config`]) and validates them into a [`ForwarderConfig`],
//! which [`Forwarder`](crate::Forwarder) consumes at construction time.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::delivery::{Endpoint, TlsOptions};

/// Default collector port.
pub const DEFAULT_PORT: u16 = 80;
/// Default timeout applied when establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout applied to each socket write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default unit of the exponential backoff.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);

/// Errors raised while assembling a [`ForwarderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid user supplied configuration.
    #[error("invalid forwarder configuration: {0}")]
    InvalidConfig(String),
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    /// The configuration file is not valid INI.
    #[error("{} is invalid: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    /// The requested text encoding label is not recognised.
    #[error("unknown encoding {0}")]
    UnknownEncoding(String),
    /// The configuration file is not valid in the requested encoding.
    #[error("{} could not be decoded as {encoding}", .path.display())]
    Decode {
        path: PathBuf,
        encoding: &'static str,
    },
}

/// Bounded exponential backoff applied to a single line.
///
/// After the `n`th failed attempt (counting from one) the engine waits
/// `base * 2^n` before trying again, until `max_retries` retries have been
/// spent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base: DEFAULT_RETRY_BASE,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retry number `retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Validated forwarder settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Collector host name.
    pub host: String,
    /// Collector port.
    pub port: u16,
    /// Directory scanned for `*.token` files.
    pub path: PathBuf,
    /// Wrap the connection in TLS.
    pub use_ssl: bool,
    /// CA certificate used to verify the collector when `use_ssl` is set.
    pub ssl_ca_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ForwarderConfig {
    /// Create a plain TCP configuration with default port, timeouts and retries.
    pub fn new(host: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            path: path.into(),
            use_ssl: false,
            ssl_ca_file: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Check the invariants that the builder enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(invalid("host must not be empty"));
        }
        if self.path.as_os_str().is_empty() {
            return Err(invalid("path must not be empty"));
        }
        if self.use_ssl && self.ssl_ca_file.is_none() {
            return Err(invalid("ssl_ca_file is required when use_ssl is enabled"));
        }
        if self.connect_timeout.is_zero() {
            return Err(invalid("connect_timeout must be greater than zero"));
        }
        if self.write_timeout.is_zero() {
            return Err(invalid("write_timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Describe the collector connection.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        self.validate()?;
        let tls = match (&self.ssl_ca_file, self.use_ssl) {
            (Some(ca_file), true) => Some(TlsOptions {
                domain: self.host.clone(),
                ca_file: ca_file.clone(),
            }),
            _ => None,
        };
        Ok(Endpoint {
            host: self.host.clone(),
            port: self.port,
            tls,
        })
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::InvalidConfig(message.to_owned())
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ConfigError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for [`ForwarderConfig`].
#[derive(Clone, Debug, Default)]
pub struct ForwarderBuilder {
    host: Option<String>,
    port: Option<u16>,
    path: Option<PathBuf>,
    use_ssl: Option<bool>,
    ssl_ca_file: Option<PathBuf>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    retry_base_ms: Option<u64>,
}

impl ForwarderBuilder {
    /// Create a builder with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the collector host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the token directory.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the CA certificate the collector is verified against under TLS.
    pub fn with_ssl_ca_file(mut self, ca_file: impl Into<PathBuf>) -> Self {
        self.ssl_ca_file = Some(ca_file.into());
        self
    }

    option_setter!(
        #[doc = "Set the collector port."]
        with_port,
        port,
        u16
    );
    option_setter!(
        #[doc = "Toggle TLS. Requires a CA file when enabled."]
        with_ssl,
        use_ssl,
        bool
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_write_timeout_ms, write_timeout_ms, u64);
    option_setter!(with_max_retries, max_retries, u32);
    option_setter!(with_retry_base_ms, retry_base_ms, u64);

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.write_timeout_ms {
            ensure_positive!(timeout, "write_timeout_ms")?;
        }
        if let Some(base) = self.retry_base_ms {
            ensure_positive!(base, "retry_base_ms")?;
        }
        Ok(())
    }

    /// Validate the collected options and produce a [`ForwarderConfig`].
    pub fn build(&self) -> Result<ForwarderConfig, ConfigError> {
        self.validate()?;
        let host = self
            .host
            .clone()
            .ok_or_else(|| invalid("host is required"))?;
        let path = self
            .path
            .clone()
            .ok_or_else(|| invalid("path is required"))?;

        let mut config = ForwarderConfig::new(host, path);
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(use_ssl) = self.use_ssl {
            config.use_ssl = use_ssl;
        }
        config.ssl_ca_file = self.ssl_ca_file.clone();
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(timeout);
        }
        if let Some(timeout) = self.write_timeout_ms {
            config.write_timeout = Duration::from_millis(timeout);
        }
        if let Some(retries) = self.max_retries {
            config.retry.max_retries = retries;
        }
        if let Some(base) = self.retry_base_ms {
            config.retry.base = Duration::from_millis(base);
        }
        config.validate()?;
        Ok(config)
    }
}
