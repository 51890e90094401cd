//! Provider connection settings.
//!
//! Explicit configuration wins; unset fields fall back to environment
//! variables, then to built-in defaults.

use std::fmt;

use serde::Deserialize;

use crate::error::ProviderError;

/// Environment variable for the contact point.
pub const ENV_HOST_PORT: &str = "CASSANDRA_HOSTPORT";
/// Environment variable for the username.
pub const ENV_USERNAME: &str = "CASSANDRA_USERNAME";
/// Environment variable for the password.
pub const ENV_PASSWORD: &str = "CASSANDRA_PASSWORD";
/// Contact point used when neither configuration nor environment sets one.
pub const DEFAULT_HOST_PORT: &str = "localhost:9042";

#[derive(Debug, Default, Deserialize)]
struct RawProviderConfig {
    #[serde(default)]
    host_port: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Validated connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// `host:port` of a contact point.
    pub host_port: String,
    /// Username; empty disables authentication.
    pub username: String,
    /// Password.
    pub password: String,
}

impl ProviderConfig {
    /// Build from the host's configuration value, reading defaults from the process environment.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        Self::from_value_with_env(value, |key| std::env::var(key).ok())
    }

    /// Build from the host's configuration value with an explicit environment lookup.
    pub fn from_value_with_env<F>(value: serde_json::Value, env: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawProviderConfig = match value {
            serde_json::Value::Null => RawProviderConfig::default(),
            other => serde_json::from_value(other).map_err(|e| {
                ProviderError::Configuration(format!("invalid provider configuration: {}", e))
            })?,
        };

        // An empty value, in configuration or environment, counts as unset.
        let lookup = |explicit: Option<String>, key: &str| {
            explicit
                .filter(|v| !v.is_empty())
                .or_else(|| env(key).filter(|v| !v.is_empty()))
        };

        let config = Self {
            host_port: lookup(raw.host_port, ENV_HOST_PORT)
                .unwrap_or_else(|| DEFAULT_HOST_PORT.to_string()),
            username: lookup(raw.username, ENV_USERNAME).unwrap_or_default(),
            password: lookup(raw.password, ENV_PASSWORD).unwrap_or_default(),
        };
        validate_host_port(&config.host_port)?;
        Ok(config)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host_port", &self.host_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Check that a contact point has the `host:port` shape.
pub fn validate_host_port(host_port: &str) -> Result<(), ProviderError> {
    let invalid = |reason: &str| {
        ProviderError::Configuration(format!(
            "invalid host_port '{}': {}",
            host_port, reason
        ))
    };

    let (host, port) = host_port
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    if host.is_empty() {
        return Err(invalid("host is empty"));
    }
    if host.contains(char::is_whitespace) {
        return Err(invalid("host contains whitespace"));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid("port must be a number between 1 and 65535")),
        Ok(_) => Ok(()),
    }
}
