//! Connection configuration.
//!
//! [`ConnectionConfig`] holds the recognised transport options with the
//! runtime's defaults. Callers supply a [`ConfigOverrides`], either built in
//! code or parsed from TOML, and [`ConnectionConfig::merged`] layers it on
//! top: any field the caller sets wins.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ceiling for the reconnect backoff.
pub const DEFAULT_MAXIMUM_RECONNECT_TIME: Duration = Duration::from_millis(1000);
/// Default starting delay for the reconnect backoff.
pub const DEFAULT_BASE_RECONNECT_TIME: Duration = Duration::from_millis(1000);
/// Default MQTT keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(300);
/// Default time a shadow request may wait for its accepted/rejected answer.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport protocol. Only secure WebSockets are supported.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// MQTT over TLS WebSockets.
    #[default]
    #[serde(rename = "wss")]
    SecureWebSocket,
}

/// Which flavour of client the connection acts as.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMode {
    /// Plain publish/subscribe device; thing sessions are unavailable.
    #[default]
    Device,
    /// Device-shadow client supporting thing sessions.
    Shadow,
}

/// Credential placeholders passed through to the transport.
///
/// Flows that sign the connection URL out of band require all three to stay
/// empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_key: String,
    /// Session token for temporary credentials.
    pub session_token: String,
}

impl Credentials {
    /// Whether every field is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_key_id.is_empty() && self.secret_key.is_empty() && self.session_token.is_empty()
    }
}

/// Fully resolved connection options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Service region.
    pub region: String,
    /// Broker host name.
    pub host: String,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Upper bound for the reconnect backoff.
    pub maximum_reconnect_time: Duration,
    /// First reconnect delay; doubles on each failure up to the maximum.
    pub base_reconnect_time: Duration,
    /// Log every transport event at debug level instead of trace.
    pub debug: bool,
    /// Credential placeholders.
    pub credentials: Credentials,
    /// MQTT keep-alive interval.
    pub keep_alive: Duration,
    /// Client identifier; generated when absent.
    pub client_id: Option<String>,
    /// Time a shadow request may wait before a timeout event fires.
    pub operation_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            host: String::new(),
            protocol: Protocol::SecureWebSocket,
            maximum_reconnect_time: DEFAULT_MAXIMUM_RECONNECT_TIME,
            base_reconnect_time: DEFAULT_BASE_RECONNECT_TIME,
            debug: true,
            credentials: Credentials::default(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            client_id: None,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML source could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// No broker host was configured.
    #[error("broker host must not be empty")]
    MissingHost,
    /// The backoff window is inverted.
    #[error("base reconnect time {base:?} exceeds maximum {maximum:?}")]
    InvalidReconnectWindow {
        /// Configured base delay.
        base: Duration,
        /// Configured maximum delay.
        maximum: Duration,
    },
    /// Keep-alive must be zero or at least one second.
    #[error("keep-alive of {0:?} is below one second")]
    KeepAliveTooShort(Duration),
}

impl ConnectionConfig {
    /// Set the broker host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the service region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set an explicit client identifier.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the shadow operation timeout.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Layer `overrides` on top of this configuration; set fields win.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use thingwire::config::{ConfigOverrides, ConnectionConfig};
    ///
    /// let overrides = ConfigOverrides {
    ///     host: Some("broker.example".into()),
    ///     maximum_reconnect_time_ms: Some(8000),
    ///     ..ConfigOverrides::default()
    /// };
    /// let config = ConnectionConfig::default().merged(overrides);
    /// assert_eq!(config.host, "broker.example");
    /// assert_eq!(config.maximum_reconnect_time, Duration::from_secs(8));
    /// assert!(config.debug);
    /// ```
    #[must_use]
    pub fn merged(mut self, overrides: ConfigOverrides) -> Self {
        let ConfigOverrides {
            region,
            host,
            protocol,
            maximum_reconnect_time_ms,
            base_reconnect_time_ms,
            debug,
            access_key_id,
            secret_key,
            session_token,
            keep_alive_secs,
            client_id,
            operation_timeout_ms,
        } = overrides;

        if let Some(region) = region {
            self.region = region;
        }
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(protocol) = protocol {
            self.protocol = protocol;
        }
        if let Some(ms) = maximum_reconnect_time_ms {
            self.maximum_reconnect_time = Duration::from_millis(ms);
        }
        if let Some(ms) = base_reconnect_time_ms {
            self.base_reconnect_time = Duration::from_millis(ms);
        }
        if let Some(debug) = debug {
            self.debug = debug;
        }
        if let Some(value) = access_key_id {
            self.credentials.access_key_id = value;
        }
        if let Some(value) = secret_key {
            self.credentials.secret_key = value;
        }
        if let Some(value) = session_token {
            self.credentials.session_token = value;
        }
        if let Some(secs) = keep_alive_secs {
            self.keep_alive = Duration::from_secs(secs);
        }
        if client_id.is_some() {
            self.client_id = client_id;
        }
        if let Some(ms) = operation_timeout_ms {
            self.operation_timeout = Duration::from_millis(ms);
        }
        self
    }

    /// Check the options a live transport depends on.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.base_reconnect_time > self.maximum_reconnect_time {
            return Err(ConfigError::InvalidReconnectWindow {
                base: self.base_reconnect_time,
                maximum: self.maximum_reconnect_time,
            });
        }
        if !self.keep_alive.is_zero() && self.keep_alive < Duration::from_secs(1) {
            return Err(ConfigError::KeepAliveTooShort(self.keep_alive));
        }
        Ok(())
    }

    /// Configured client identifier, or a process-unique generated one.
    #[must_use]
    pub fn resolved_client_id(&self) -> String {
        if let Some(id) = self.client_id.as_ref().filter(|id| !id.is_empty()) {
            return id.clone();
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.subsec_nanos());
        format!("thingwire-{}-{nanos:08x}", std::process::id())
    }
}

/// Caller-supplied overrides; unset fields keep the defaults.
///
/// Field names follow TOML conventions. Durations are whole milliseconds
/// except `keep_alive_secs`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    /// Service region.
    pub region: Option<String>,
    /// Broker host name.
    pub host: Option<String>,
    /// Transport protocol.
    pub protocol: Option<Protocol>,
    /// Reconnect backoff ceiling in milliseconds.
    pub maximum_reconnect_time_ms: Option<u64>,
    /// Reconnect backoff start in milliseconds.
    pub base_reconnect_time_ms: Option<u64>,
    /// Verbose transport event logging.
    pub debug: Option<bool>,
    /// Access key identifier.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_key: Option<String>,
    /// Session token.
    pub session_token: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: Option<u64>,
    /// Client identifier.
    pub client_id: Option<String>,
    /// Shadow operation timeout in milliseconds.
    pub operation_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Parse overrides from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> { Ok(toml::from_str(source)?) }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ConnectionConfig::default();
        assert_eq!(config.protocol, Protocol::SecureWebSocket);
        assert_eq!(config.maximum_reconnect_time, Duration::from_millis(1000));
        assert!(config.debug);
        assert!(config.credentials.is_empty());
        assert_eq!(config.keep_alive, Duration::from_secs(300));
    }

    #[test]
    fn caller_overrides_win_and_unset_fields_keep_defaults() {
        let base = ConnectionConfig::default().with_region("eu-west-1");
        let config = base.merged(ConfigOverrides {
            host: Some("example.iot".into()),
            debug: Some(false),
            session_token: Some("token".into()),
            ..ConfigOverrides::default()
        });

        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.host, "example.iot");
        assert!(!config.debug);
        assert_eq!(config.credentials.session_token, "token");
        assert_eq!(config.credentials.access_key_id, "");
    }

    #[test]
    fn overrides_parse_from_toml() {
        let overrides = ConfigOverrides::from_toml_str(
            r#"
            host = "abc.iot.us-east-1.amazonaws.com"
            region = "us-east-1"
            protocol = "wss"
            maximum_reconnect_time_ms = 8000
            keep_alive_secs = 30
            "#,
        )
        .expect("valid overrides");

        assert_eq!(overrides.protocol, Some(Protocol::SecureWebSocket));
        let config = ConnectionConfig::default().merged(overrides);
        assert_eq!(config.maximum_reconnect_time, Duration::from_secs(8));
        assert_eq!(config.keep_alive, Duration::from_secs(30));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ConfigOverrides::from_toml_str("hots = \"typo\"").expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[rstest]
    #[case::missing_host(ConnectionConfig::default(), "host")]
    #[case::inverted_backoff(
        ConnectionConfig {
            base_reconnect_time: Duration::from_secs(5),
            ..ConnectionConfig::default().with_host("h")
        },
        "exceeds"
    )]
    #[case::sub_second_keep_alive(
        ConnectionConfig {
            keep_alive: Duration::from_millis(500),
            ..ConnectionConfig::default().with_host("h")
        },
        "keep-alive"
    )]
    fn validation_rejects(#[case] config: ConnectionConfig, #[case] needle: &str) {
        let err = config.validate().expect_err("config should be invalid");
        assert!(err.to_string().contains(needle), "unexpected error: {err}");
    }

    #[test]
    fn explicit_client_id_is_kept() {
        let config = ConnectionConfig::default().with_client_id("device-7");
        assert_eq!(config.resolved_client_id(), "device-7");
        assert!(
            ConnectionConfig::default()
                .resolved_client_id()
                .starts_with("thingwire-")
        );
    }
}
