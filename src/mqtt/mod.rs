//! MQTT transport built on `rumqttc`.
//!
//! [`ConnectionBuilder::connect_mqtt`] validates the configuration and
//! returns a [`Connection`] over an [`MqttTransport`] together with the
//! [`MqttDriver`] that produces its events. Shadow requests follow the AWS IoT
//! thing shadow topic layout described in [`shadow`].
//!
//! ```no_run
//! use thingwire::{
//!     client::{ConnectionBuilder, Observers},
//!     config::ConnectionConfig,
//!     mqtt::drive,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), thingwire::client::ClientError> {
//! let (connection, driver) = ConnectionBuilder::new()
//!     .with_config(ConnectionConfig::default().with_host("example-ats.iot.eu-west-1.amazonaws.com"))
//!     .with_observers(Observers::new().on_message(|topic, text| println!("{topic}: {text}")))
//!     .connect_mqtt()?;
//! let shared = connection.into_shared();
//! thingwire::client::lock(&shared).subscribe(["sensors/#"], None);
//! drive(shared, driver, CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use rumqttc::AsyncClient;

use crate::{
    client::{ClientError, Connection, ConnectionBuilder},
    codec::{FrameDecoder, InboundFrame},
    message::QoS,
};

mod driver;
mod inflight;
pub mod options;
pub mod shadow;
mod transport;

pub use driver::{Backoff, EVENT_CAPACITY, MqttDriver, drive};
pub use transport::MqttTransport;

/// Capacity of the client's request queue.
pub const REQUEST_CAPACITY: usize = 64;

pub(crate) fn to_rumqttc_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

pub(crate) fn from_rumqttc_qos(qos: rumqttc::QoS) -> QoS {
    match qos {
        rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
        rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
        rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}

impl<D> ConnectionBuilder<D>
where
    D: FrameDecoder,
    D::Frame: InboundFrame,
{
    /// Build a connection over a `rumqttc` client.
    ///
    /// Nothing touches the network until the returned driver is polled. The
    /// resolved client identifier is written back into the connection's
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the configuration is invalid.
    pub fn connect_mqtt(self) -> Result<(Connection<MqttTransport, D>, MqttDriver), ClientError> {
        self.config().validate()?;
        let client_id = self.config().resolved_client_id();
        let config = self.config().clone().with_client_id(client_id.clone());
        let (client, eventloop) =
            AsyncClient::new(options::mqtt_options(&config, &client_id), REQUEST_CAPACITY);
        let inflight = Arc::new(inflight::Inflight::default());
        let transport = MqttTransport::new(
            client.clone(),
            Arc::clone(&inflight),
            &client_id,
            config.operation_timeout,
        );
        let driver = MqttDriver::new(client, eventloop, inflight, &config);
        Ok((self.with_config(config).build(transport), driver))
    }
}
