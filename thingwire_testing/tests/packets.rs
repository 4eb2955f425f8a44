//! Built packets decode to what they describe.

use rstest::rstest;
use thingwire::{
    codec::{Decoded, FrameDecoder, MqttPacketDecoder, Packet, SubAckCode},
    message::QoS,
};
use thingwire_testing::{packets, split_at};

fn decode(bytes: &[u8]) -> Packet {
    match MqttPacketDecoder::default().decode(bytes, 0) {
        Ok(Decoded::Frame { frame, next }) => {
            assert_eq!(next, bytes.len(), "packet should be consumed whole");
            frame
        }
        other => panic!("expected a frame, got {other:?}"),
    }
}

#[rstest]
#[case(QoS::AtMostOnce, None)]
#[case(QoS::AtLeastOnce, Some(9))]
#[case(QoS::ExactlyOnce, Some(9))]
fn publish_carries_packet_id_above_qos0(#[case] qos: QoS, #[case] expected: Option<u16>) {
    let Packet::Publish(publish) = decode(&packets::publish_with_qos("a/b", b"x", qos, 9)) else {
        panic!("expected a publish");
    };
    assert_eq!(publish.qos, qos);
    assert_eq!(publish.packet_id, expected);
    assert_eq!(publish.topic, "a/b");
}

#[test]
fn suback_encodes_refusals() {
    let packet = decode(&packets::suback(4, &[Some(QoS::AtLeastOnce), None]));
    assert_eq!(
        packet,
        Packet::SubAck {
            packet_id: 4,
            return_codes: vec![SubAckCode::Granted(QoS::AtLeastOnce), SubAckCode::Failure],
        }
    );
}

#[rstest]
#[case(packets::pingresp(), Packet::PingResp)]
#[case(packets::puback(3), Packet::PubAck { packet_id: 3 })]
#[case(packets::unsuback(5), Packet::UnsubAck { packet_id: 5 })]
fn control_packets_decode(#[case] bytes: Vec<u8>, #[case] expected: Packet) {
    assert_eq!(decode(&bytes), expected);
}

#[test]
fn split_keeps_every_byte() {
    let bytes = packets::publish("t", b"payload");
    let chunks = split_at(&bytes, &[usize::MAX, 3, 0]);
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks.concat(), bytes);
}
