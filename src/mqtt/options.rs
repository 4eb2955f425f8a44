//! Translate [`ConnectionConfig`] into `rumqttc` options.

use rumqttc::{MqttOptions, Transport};

use crate::config::{ConnectionConfig, Protocol};

/// Port used for MQTT over secure WebSockets.
pub const WSS_PORT: u16 = 443;

/// Broker URL for `config`.
#[must_use]
pub fn broker_url(config: &ConnectionConfig) -> String {
    match config.protocol {
        Protocol::SecureWebSocket => format!("wss://{}:{WSS_PORT}/mqtt", config.host.trim()),
    }
}

/// Build client options for `client_id`.
///
/// Credentials are only attached when at least one field is set; signed URL
/// flows leave them empty.
#[must_use]
pub fn mqtt_options(config: &ConnectionConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, broker_url(config), WSS_PORT);
    options
        .set_keep_alive(config.keep_alive)
        .set_clean_session(true);
    match config.protocol {
        Protocol::SecureWebSocket => {
            options.set_transport(Transport::wss_with_default_config());
        }
    }
    if !config.credentials.is_empty() {
        options.set_credentials(
            config.credentials.access_key_id.clone(),
            config.credentials.secret_key.clone(),
        );
    }
    options
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn url_targets_the_mqtt_path() {
        let config = ConnectionConfig::default().with_host(" broker.example ");
        assert_eq!(broker_url(&config), "wss://broker.example:443/mqtt");
    }

    #[test]
    fn options_carry_identity_and_keep_alive() {
        let config = ConnectionConfig::default().with_host("broker.example");
        let options = mqtt_options(&config, "dev-1");

        assert_eq!(options.client_id(), "dev-1");
        assert_eq!(options.keep_alive(), Duration::from_secs(300));
        assert!(options.credentials().is_none());
    }
}
