//! MQTT 3.1.1 decoder for packets a broker sends to a client.
//!
//! Only the fixed header and the fields the runtime needs are interpreted.
//! Packet types that a broker never sends (CONNECT, SUBSCRIBE, UNSUBSCRIBE,
//! PINGREQ, DISCONNECT) are treated as malformed, as are the reserved types
//! 0 and 15.

use bytes::Bytes;

use super::{Decoded, DecodeFault, FrameDecoder, InboundFrame, clamp_frame_length};
use crate::{
    byte_order::{
        MAX_REMAINING_LENGTH_BYTES,
        RemainingLength,
        read_network_u16,
        read_remaining_length,
    },
    message::{DecodedMessage, QoS},
};

const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const PUBACK: u8 = 4;
const PUBREC: u8 = 5;
const PUBREL: u8 = 6;
const PUBCOMP: u8 = 7;
const SUBACK: u8 = 9;
const UNSUBACK: u8 = 11;
const PINGRESP: u8 = 13;

/// Return code carried in a SUBACK for one topic filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubAckCode {
    /// Subscription granted at the given level.
    Granted(QoS),
    /// Subscription refused (0x80).
    Failure,
}

/// An inbound PUBLISH packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publish {
    /// Duplicate delivery flag.
    pub dup: bool,
    /// Delivery level.
    pub qos: QoS,
    /// Retained flag.
    pub retain: bool,
    /// Topic name.
    pub topic: String,
    /// Packet identifier, present when `qos` is above zero.
    pub packet_id: Option<u16>,
    /// Application payload.
    pub payload: Bytes,
}

/// A decoded server-to-client control packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    /// Connection acknowledgement.
    ConnAck {
        /// Whether the broker resumed a stored session.
        session_present: bool,
        /// Connect return code (0 = accepted).
        return_code: u8,
    },
    /// Application message.
    Publish(Publish),
    /// QoS 1 acknowledgement.
    PubAck {
        /// Acknowledged packet identifier.
        packet_id: u16,
    },
    /// QoS 2 first acknowledgement.
    PubRec {
        /// Acknowledged packet identifier.
        packet_id: u16,
    },
    /// QoS 2 release.
    PubRel {
        /// Released packet identifier.
        packet_id: u16,
    },
    /// QoS 2 completion.
    PubComp {
        /// Completed packet identifier.
        packet_id: u16,
    },
    /// Subscription acknowledgement.
    SubAck {
        /// Acknowledged packet identifier.
        packet_id: u16,
        /// One code per requested filter.
        return_codes: Vec<SubAckCode>,
    },
    /// Unsubscribe acknowledgement.
    UnsubAck {
        /// Acknowledged packet identifier.
        packet_id: u16,
    },
    /// Keep-alive response.
    PingResp,
}

impl InboundFrame for Packet {
    fn kind(&self) -> &'static str {
        match self {
            Self::ConnAck { .. } => "connack",
            Self::Publish(_) => "publish",
            Self::PubAck { .. } => "puback",
            Self::PubRec { .. } => "pubrec",
            Self::PubRel { .. } => "pubrel",
            Self::PubComp { .. } => "pubcomp",
            Self::SubAck { .. } => "suback",
            Self::UnsubAck { .. } => "unsuback",
            Self::PingResp => "pingresp",
        }
    }

    fn into_message(self) -> Option<DecodedMessage> {
        match self {
            Self::Publish(publish) => Some(DecodedMessage::new(publish.topic, publish.payload)),
            _ => None,
        }
    }
}

/// Stateless decoder for inbound MQTT packets.
///
/// # Examples
///
/// ```
/// use thingwire::codec::{Decoded, FrameDecoder, MqttPacketDecoder, Packet};
///
/// let decoder = MqttPacketDecoder::default();
/// let bytes = [0xd0, 0x00, 0xd0];
/// assert_eq!(
///     decoder.decode(&bytes, 0),
///     Ok(Decoded::Frame {
///         frame: Packet::PingResp,
///         next: 2
///     })
/// );
/// assert_eq!(decoder.decode(&bytes, 2), Ok(Decoded::Incomplete));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct MqttPacketDecoder {
    max_packet_size: usize,
}

impl MqttPacketDecoder {
    /// Construct a decoder accepting bodies of at most `max_packet_size`.
    ///
    /// The value is clamped to the codec's frame length bounds.
    #[must_use]
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_packet_size: clamp_frame_length(max_packet_size),
        }
    }

    /// Largest body this decoder accepts.
    #[must_use]
    pub fn max_packet_size(&self) -> usize { self.max_packet_size }
}

impl Default for MqttPacketDecoder {
    fn default() -> Self { Self::new(super::MAX_FRAME_LENGTH) }
}

impl FrameDecoder for MqttPacketDecoder {
    type Frame = Packet;

    fn decode(&self, buffer: &[u8], offset: usize) -> Result<Decoded<Packet>, DecodeFault> {
        let Some(rest) = buffer.get(offset..) else {
            return Ok(Decoded::Incomplete);
        };
        let Some((&header, after_header)) = rest.split_first() else {
            return Ok(Decoded::Incomplete);
        };
        let packet_type = header >> 4;
        let flags = header & 0x0f;
        check_flags(packet_type, flags)?;

        let (body_len, len_bytes) = match read_remaining_length(after_header) {
            RemainingLength::Complete { value, encoded_len } => (value, encoded_len),
            RemainingLength::Incomplete => return Ok(Decoded::Incomplete),
            RemainingLength::Malformed => return Err(DecodeFault::MalformedRemainingLength),
        };
        if body_len > self.max_packet_size {
            return Err(DecodeFault::OversizedFrame {
                size: body_len,
                max: self.max_packet_size,
            });
        }

        let header_len = 1 + len_bytes;
        let Some(body) = rest.get(header_len..header_len + body_len) else {
            return Ok(Decoded::Incomplete);
        };
        let frame = parse_body(packet_type, flags, body)?;
        Ok(Decoded::Frame {
            frame,
            next: offset + header_len + body_len,
        })
    }

    fn max_frame_len(&self) -> Option<usize> { Some(1 + MAX_REMAINING_LENGTH_BYTES + self.max_packet_size) }
}

fn check_flags(packet_type: u8, flags: u8) -> Result<(), DecodeFault> {
    let valid = match packet_type {
        PUBLISH => true,
        PUBREL => flags == 0b0010,
        CONNACK | PUBACK | PUBREC | PUBCOMP | SUBACK | UNSUBACK | PINGRESP => flags == 0,
        _ => return Err(DecodeFault::ReservedPacketType { packet_type }),
    };
    if valid {
        Ok(())
    } else {
        Err(DecodeFault::InvalidFlags { packet_type, flags })
    }
}

fn parse_body(packet_type: u8, flags: u8, body: &[u8]) -> Result<Packet, DecodeFault> {
    match packet_type {
        CONNACK => match body {
            [ack_flags, return_code] => Ok(Packet::ConnAck {
                session_present: ack_flags & 0x01 == 1,
                return_code: *return_code,
            }),
            _ => Err(truncated("CONNACK", body)),
        },
        PUBLISH => parse_publish(flags, body).map(Packet::Publish),
        PUBACK => fixed_packet_id("PUBACK", body).map(|packet_id| Packet::PubAck { packet_id }),
        PUBREC => fixed_packet_id("PUBREC", body).map(|packet_id| Packet::PubRec { packet_id }),
        PUBREL => fixed_packet_id("PUBREL", body).map(|packet_id| Packet::PubRel { packet_id }),
        PUBCOMP => fixed_packet_id("PUBCOMP", body).map(|packet_id| Packet::PubComp { packet_id }),
        SUBACK => parse_suback(body),
        UNSUBACK => fixed_packet_id("UNSUBACK", body).map(|packet_id| Packet::UnsubAck { packet_id }),
        PINGRESP if body.is_empty() => Ok(Packet::PingResp),
        PINGRESP => Err(DecodeFault::malformed("PINGRESP carries a body")),
        _ => Err(DecodeFault::ReservedPacketType { packet_type }),
    }
}

fn truncated(packet: &'static str, body: &[u8]) -> DecodeFault {
    DecodeFault::TruncatedBody {
        packet,
        len: body.len(),
    }
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let pair = bytes.get(at..at + 2)?;
    <[u8; 2]>::try_from(pair).ok().map(read_network_u16)
}

fn fixed_packet_id(packet: &'static str, body: &[u8]) -> Result<u16, DecodeFault> {
    if body.len() != 2 {
        return Err(truncated(packet, body));
    }
    read_u16(body, 0).ok_or_else(|| truncated(packet, body))
}

fn parse_publish(flags: u8, body: &[u8]) -> Result<Publish, DecodeFault> {
    let qos = QoS::try_from((flags >> 1) & 0b11).map_err(|_| DecodeFault::InvalidQos)?;
    let topic_len = usize::from(read_u16(body, 0).ok_or_else(|| truncated("PUBLISH", body))?);
    let topic_bytes = body
        .get(2..2 + topic_len)
        .ok_or_else(|| truncated("PUBLISH", body))?;
    let topic = std::str::from_utf8(topic_bytes)
        .map_err(|_| DecodeFault::InvalidTopic)?
        .to_owned();

    let mut cursor = 2 + topic_len;
    let packet_id = if qos == QoS::AtMostOnce {
        None
    } else {
        let id = read_u16(body, cursor).ok_or_else(|| truncated("PUBLISH", body))?;
        cursor += 2;
        Some(id)
    };
    let payload = body.get(cursor..).unwrap_or_default();

    Ok(Publish {
        dup: flags & 0b1000 != 0,
        qos,
        retain: flags & 0b0001 != 0,
        topic,
        packet_id,
        payload: Bytes::copy_from_slice(payload),
    })
}

fn parse_suback(body: &[u8]) -> Result<Packet, DecodeFault> {
    let packet_id = read_u16(body, 0).ok_or_else(|| truncated("SUBACK", body))?;
    let codes = &body[2..];
    if codes.is_empty() {
        return Err(truncated("SUBACK", body));
    }
    let return_codes = codes
        .iter()
        .map(|&code| match code {
            0x80 => Ok(SubAckCode::Failure),
            level => QoS::try_from(level)
                .map(SubAckCode::Granted)
                .map_err(|_| DecodeFault::InvalidReturnCode { code }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Packet::SubAck {
        packet_id,
        return_codes,
    })
}
