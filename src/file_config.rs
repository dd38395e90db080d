//! INI configuration files.
//!
//! Options are read from a `[forwarder]` section, falling back to the
//! section-less preamble when that section is absent:
//!
//! ```ini
//! [forwarder]
//! host = data.logentries.com
//! port = 443
//! path = /etc/forwarder/tokens
//! use_ssl = true
//! ssl_ca_file = /etc/forwarder/ca.pem
//! ```

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use encoding_rs::{Encoding, UTF_8};
use ini::{Ini, Properties};

use crate::config::{ConfigError, ForwarderBuilder, ForwarderConfig};

/// Section holding forwarder options.
pub const SECTION: &str = "forwarder";

/// Read, decode and validate the configuration stored at `path`.
///
/// `encoding` is a WHATWG label such as `"latin1"`; UTF-8 is assumed when it
/// is `None`.
pub fn load_config_file(
    path: impl AsRef<Path>,
    encoding: Option<&str>,
) -> Result<ForwarderConfig, ConfigError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(ErrorKind::UnexpectedEof, "file is empty"),
        });
    }
    let text = decode_contents(path, &bytes, encoding)?;
    parse_config_str(path, &text)?.build()
}

/// Parse INI text into a builder without validating it.
pub fn parse_config_str(path: &Path, text: &str) -> Result<ForwarderBuilder, ConfigError> {
    let ini = Ini::load_from_str(text).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let props = ini
        .section(Some(SECTION))
        .unwrap_or_else(|| ini.general_section());
    apply_properties(ForwarderBuilder::new(), props)
}

fn decode_contents(path: &Path, bytes: &[u8], label: Option<&str>) -> Result<String, ConfigError> {
    let encoding = match label {
        Some(label) => {
            let normalized = label.trim().to_ascii_lowercase();
            Encoding::for_label(normalized.as_bytes())
                .ok_or_else(|| ConfigError::UnknownEncoding(label.to_owned()))?
        }
        None => UTF_8,
    };
    let (decoded, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ConfigError::Decode {
            path: path.to_path_buf(),
            encoding: encoding.name(),
        });
    }
    Ok(decoded.into_owned())
}

fn apply_properties(
    mut builder: ForwarderBuilder,
    props: &Properties,
) -> Result<ForwarderBuilder, ConfigError> {
    for (key, value) in props.iter() {
        let value = value.trim();
        builder = match key {
            "host" => builder.with_host(value),
            "port" => builder.with_port(parse_number(key, value)?),
            "path" => builder.with_path(PathBuf::from(value)),
            "use_ssl" => builder.with_ssl(parse_bool(key, value)?),
            "ssl_ca_file" => builder.with_ssl_ca_file(PathBuf::from(value)),
            "connect_timeout_ms" => builder.with_connect_timeout_ms(parse_number(key, value)?),
            "write_timeout_ms" => builder.with_write_timeout_ms(parse_number(key, value)?),
            "max_retries" => builder.with_max_retries(parse_number(key, value)?),
            "retry_base_ms" => builder.with_retry_base_ms(parse_number(key, value)?),
            other => {
                return Err(ConfigError::InvalidConfig(format!(
                    "unknown option {other}"
                )));
            }
        };
    }
    Ok(builder)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidConfig(format!("{key} must be a number, got {value:?}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidConfig(format!(
            "{key} must be a boolean, got {value:?}"
        ))),
    }
}
