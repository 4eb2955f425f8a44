//! Inbound application messages and delivery-guarantee levels.

use std::borrow::Cow;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quality-of-service level requested for a subscription or publish.
///
/// Serialises as the numeric MQTT level so configuration files can write
/// `qos = 1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    /// Fire and forget (level 0).
    AtMostOnce,
    /// Acknowledged delivery (level 1).
    #[default]
    AtLeastOnce,
    /// Assured single delivery (level 2).
    ExactlyOnce,
}

/// Error returned when a numeric QoS level is outside `0..=2`.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("invalid QoS level {0}")]
pub struct InvalidQos(pub u8);

impl QoS {
    /// Numeric MQTT level.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = InvalidQos;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(InvalidQos(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(value: QoS) -> Self { value.as_u8() }
}

/// One application message recovered from the broker.
///
/// Immutable once produced; the payload is reference counted so cloning a
/// message for several observers does not copy it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedMessage {
    topic: String,
    payload: Bytes,
}

impl DecodedMessage {
    /// Construct a message received on `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Topic the message arrived on.
    #[must_use]
    pub fn topic(&self) -> &str { &self.topic }

    /// Raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Payload as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn payload_text(&self) -> Cow<'_, str> { String::from_utf8_lossy(&self.payload) }

    /// Consume the message, returning topic and payload.
    #[must_use]
    pub fn into_parts(self) -> (String, Bytes) { (self.topic, self.payload) }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, QoS::AtMostOnce)]
    #[case(1, QoS::AtLeastOnce)]
    #[case(2, QoS::ExactlyOnce)]
    fn qos_levels_map_to_mqtt_numbers(#[case] level: u8, #[case] qos: QoS) {
        assert_eq!(QoS::try_from(level), Ok(qos));
        assert_eq!(u8::from(qos), level);
    }

    #[test]
    fn qos_three_is_rejected() {
        assert_eq!(QoS::try_from(3), Err(InvalidQos(3)));
    }

    #[test]
    fn payload_text_replaces_invalid_utf8() {
        let message = DecodedMessage::new("a/b", vec![b'h', b'i', 0xff]);
        assert_eq!(message.payload_text(), "hi\u{fffd}");
    }
}
