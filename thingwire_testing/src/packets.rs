//! Builders for server-to-client MQTT 3.1.1 packets.
//!
//! Each function returns the complete encoded packet, fixed header included.

use thingwire::{byte_order::write_remaining_length, message::QoS};

/// Prefix `body` with a fixed header.
///
/// # Panics
///
/// Panics if `body` exceeds the largest encodable remaining length.
#[must_use]
pub fn frame(header: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![header];
    out.extend(write_remaining_length(body.len()).expect("body length fits in four bytes"));
    out.extend_from_slice(body);
    out
}

fn string(value: &str) -> Vec<u8> {
    let len = u16::try_from(value.len()).expect("string fits a u16 length prefix");
    let mut out = len.to_be_bytes().to_vec();
    out.extend_from_slice(value.as_bytes());
    out
}

/// QoS 0 PUBLISH of `payload` on `topic`.
#[must_use]
pub fn publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = string(topic);
    body.extend_from_slice(payload);
    frame(0x30, &body)
}

/// PUBLISH at `qos`; `packet_id` is written for QoS 1 and 2 only.
#[must_use]
pub fn publish_with_qos(topic: &str, payload: &[u8], qos: QoS, packet_id: u16) -> Vec<u8> {
    let mut body = string(topic);
    if qos != QoS::AtMostOnce {
        body.extend_from_slice(&packet_id.to_be_bytes());
    }
    body.extend_from_slice(payload);
    frame(0x30 | (u8::from(qos) << 1), &body)
}

/// CONNACK with the given return code.
#[must_use]
pub fn connack(session_present: bool, return_code: u8) -> Vec<u8> {
    frame(0x20, &[u8::from(session_present), return_code])
}

/// SUBACK for `packet_id`; `None` encodes a refused filter.
#[must_use]
pub fn suback(packet_id: u16, codes: &[Option<QoS>]) -> Vec<u8> {
    let mut body = packet_id.to_be_bytes().to_vec();
    body.extend(codes.iter().map(|code| code.map_or(0x80, u8::from)));
    frame(0x90, &body)
}

/// UNSUBACK for `packet_id`.
#[must_use]
pub fn unsuback(packet_id: u16) -> Vec<u8> { frame(0xb0, &packet_id.to_be_bytes()) }

/// PUBACK for `packet_id`.
#[must_use]
pub fn puback(packet_id: u16) -> Vec<u8> { frame(0x40, &packet_id.to_be_bytes()) }

/// PINGRESP.
#[must_use]
pub fn pingresp() -> Vec<u8> { frame(0xd0, &[]) }
