//! Builder for [`Connection`].

use std::sync::Arc;

use super::{Connection, Observers};
use crate::{
    codec::{FrameDecoder, InboundFrame, MqttPacketDecoder},
    config::{ClientMode, ConfigOverrides, ConnectionConfig},
    deframer::{DEFAULT_MAX_BUFFERED, StreamDeframer},
    service::Service,
    session::{DuplicateRegistration, ThingSessionRegistry},
    subscription::SubscriptionRegistry,
};

/// Single construction point for a [`Connection`].
///
/// The decoder type parameter `D` selects how raw inbound chunks are
/// deframed and defaults to [`MqttPacketDecoder`].
///
/// # Examples
///
/// ```
/// use thingwire::{
///     client::{ConnectionBuilder, Observers},
///     config::ClientMode,
/// };
///
/// let builder = ConnectionBuilder::new()
///     .with_mode(ClientMode::Shadow)
///     .with_observers(Observers::new().on_close(|| println!("closed")));
/// assert_eq!(builder.mode(), ClientMode::Shadow);
/// ```
#[derive(Debug)]
pub struct ConnectionBuilder<D = MqttPacketDecoder> {
    config: ConnectionConfig,
    mode: ClientMode,
    duplicates: DuplicateRegistration,
    observers: Observers,
    decoder: D,
    max_buffered: usize,
}

impl ConnectionBuilder<MqttPacketDecoder> {
    /// Create a builder with default configuration and no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
            mode: ClientMode::default(),
            duplicates: DuplicateRegistration::default(),
            observers: Observers::default(),
            decoder: MqttPacketDecoder::default(),
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }
}

impl Default for ConnectionBuilder<MqttPacketDecoder> {
    fn default() -> Self { Self::new() }
}

impl<D> ConnectionBuilder<D>
where
    D: FrameDecoder,
    D::Frame: InboundFrame,
{
    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Merge `overrides` on top of the current configuration.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.config = self.config.merged(overrides);
        self
    }

    /// Select device or shadow mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ClientMode) -> Self {
        self.mode = mode;
        self
    }

    /// Choose how repeated registrations of one thing behave.
    #[must_use]
    pub fn with_duplicate_registration(mut self, duplicates: DuplicateRegistration) -> Self {
        self.duplicates = duplicates;
        self
    }

    /// Install the observer table.
    #[must_use]
    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    /// Cap the bytes buffered while waiting for a frame to complete.
    #[must_use]
    pub fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = max_buffered;
        self
    }

    /// Deframe raw chunks with `decoder` instead.
    #[must_use]
    pub fn with_decoder<D2>(self, decoder: D2) -> ConnectionBuilder<D2>
    where
        D2: FrameDecoder,
        D2::Frame: InboundFrame,
    {
        ConnectionBuilder {
            config: self.config,
            mode: self.mode,
            duplicates: self.duplicates,
            observers: self.observers,
            decoder,
            max_buffered: self.max_buffered,
        }
    }

    /// Configuration the connection will use.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.config }

    /// Selected client mode.
    #[must_use]
    pub fn mode(&self) -> ClientMode { self.mode }

    /// Assemble a connection over `service`.
    ///
    /// No request is issued. The configuration is not validated here; a
    /// transport that depends on it validates before connecting.
    pub fn build<S: Service>(self, service: S) -> Connection<S, D> {
        Connection {
            service,
            config: self.config,
            observers: Arc::new(self.observers),
            subscriptions: SubscriptionRegistry::new(),
            things: ThingSessionRegistry::new(self.mode, self.duplicates),
            deframer: StreamDeframer::new(self.decoder).with_max_buffered(self.max_buffered),
        }
    }
}
