#![doc(html_root_url = "https://docs.rs/thingwire/latest")]
//! Public API for the `thingwire` library.
//!
//! This crate provides a client facade for AWS IoT style brokers: topic
//! subscriptions, thing shadow sessions, and deframing of inbound byte
//! streams into broker messages. The facade is transport agnostic; the
//! [`mqtt`] module supplies a `rumqttc` backed [`Service`] and event driver.

pub mod byte_order;
pub mod client;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod deframer;
pub mod message;
pub mod metrics;
pub mod mqtt;
pub mod service;
pub mod session;
pub mod subscription;
pub mod test_helpers;

pub use client::{ClientError, Connection, ConnectionBuilder, Observers, SharedConnection};
pub use codec::{DecodeFault, FrameDecoder, InboundFrame, MqttPacketDecoder};
pub use config::{ClientMode, ConfigError, ConfigOverrides, ConnectionConfig};
pub use correlation::{ClientToken, ClientTokenGenerator};
pub use deframer::{Ingested, StreamDeframer};
pub use message::{DecodedMessage, QoS};
pub use service::{BrokerError, Completion, Grant, Service, ServiceEvent, ShadowStatus};
pub use session::{DuplicateRegistration, RegisterOptions, Registration, ThingSessionRegistry};
pub use subscription::{SubscribeOptions, SubscriptionRegistry};
