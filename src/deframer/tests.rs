//! Unit tests for `StreamDeframer` using a toy length-prefixed decoder.

use rstest::{fixture, rstest};

use super::*;

/// One length byte followed by that many payload bytes. A length of `0xff`
/// is malformed.
#[derive(Clone, Copy, Debug, Default)]
struct LengthByte;

impl FrameDecoder for LengthByte {
    type Frame = Vec<u8>;

    fn decode(&self, buffer: &[u8], offset: usize) -> Result<Decoded<Vec<u8>>, DecodeFault> {
        let Some(&len) = buffer.get(offset) else {
            return Ok(Decoded::Incomplete);
        };
        if len == 0xff {
            return Err(DecodeFault::malformed("length 0xff"));
        }
        let end = offset + 1 + usize::from(len);
        match buffer.get(offset + 1..end) {
            Some(payload) => Ok(Decoded::Frame {
                frame: payload.to_vec(),
                next: end,
            }),
            None => Ok(Decoded::Incomplete),
        }
    }
}

/// Claims a frame without consuming anything.
struct Stuck;

impl FrameDecoder for Stuck {
    type Frame = ();

    fn decode(&self, _buffer: &[u8], offset: usize) -> Result<Decoded<()>, DecodeFault> {
        Ok(Decoded::Frame {
            frame: (),
            next: offset,
        })
    }
}

#[fixture]
fn deframer() -> StreamDeframer<LengthByte> { StreamDeframer::new(LengthByte) }

#[rstest]
fn empty_chunk_is_a_no_op(mut deframer: StreamDeframer<LengthByte>) {
    deframer.ingest(&[3, b'a']);
    let before = deframer.residual_len();

    let out = deframer.ingest(&[]);

    assert!(out.frames().is_empty());
    assert!(out.fault().is_none());
    assert_eq!(deframer.residual_len(), before);
}

#[rstest]
fn whole_frames_are_returned_in_order(mut deframer: StreamDeframer<LengthByte>) {
    let out = deframer.ingest(&[1, b'a', 2, b'b', b'c', 0]);
    assert_eq!(
        out.into_frames(),
        vec![b"a".to_vec(), b"bc".to_vec(), Vec::new()]
    );
    assert_eq!(deframer.residual_len(), 0);
}

#[rstest]
fn chunk_without_a_complete_frame_becomes_residual(mut deframer: StreamDeframer<LengthByte>) {
    let out = deframer.ingest(&[5, b'a', b'b']);
    assert!(out.frames().is_empty());
    assert_eq!(deframer.residual_len(), 3);
}

#[rstest]
fn trailing_partial_frame_is_buffered(mut deframer: StreamDeframer<LengthByte>) {
    let out = deframer.ingest(&[1, b'a', 3, b'x']);
    assert_eq!(out.into_frames(), vec![b"a".to_vec()]);
    assert_eq!(deframer.residual_len(), 2);
}

#[rstest]
fn frame_is_only_emitted_once_its_last_byte_arrives(mut deframer: StreamDeframer<LengthByte>) {
    assert!(deframer.ingest(&[3, b'x', b'y']).frames().is_empty());
    let out = deframer.ingest(&[b'z', 1]);
    assert_eq!(out.into_frames(), vec![b"xyz".to_vec()]);
    assert_eq!(deframer.residual_len(), 1);
}

#[rstest]
fn fault_discards_the_whole_buffer(mut deframer: StreamDeframer<LengthByte>) {
    deframer.ingest(&[1]);
    let out = deframer.ingest(&[b'a', 0xff, 1, b'b', 4]);

    let (frames, fault) = out.into_parts();
    assert_eq!(frames, vec![b"a".to_vec()]);
    assert_eq!(fault, Some(DecodeFault::malformed("length 0xff")));
    assert_eq!(deframer.residual_len(), 0);

    let out = deframer.ingest(&[1, b'c']);
    assert_eq!(out.into_frames(), vec![b"c".to_vec()]);
}

#[rstest]
fn reset_drops_residual(mut deframer: StreamDeframer<LengthByte>) {
    deframer.ingest(&[4, b'a']);
    deframer.reset();
    assert_eq!(deframer.residual_len(), 0);

    let out = deframer.ingest(&[1, b'z']);
    assert_eq!(out.into_frames(), vec![b"z".to_vec()]);
}

#[test]
fn residual_over_cap_is_a_fault() {
    let mut deframer = StreamDeframer::new(LengthByte).with_max_buffered(4);
    let out = deframer.ingest(&[200, 1, 2, 3, 4, 5]);
    assert_eq!(
        out.fault(),
        Some(&DecodeFault::BufferOverflow {
            buffered: 6,
            max: 4
        })
    );
    assert_eq!(deframer.residual_len(), 0);
}

#[test]
fn cap_never_drops_below_the_largest_frame() {
    let decoder = crate::codec::MqttPacketDecoder::new(crate::codec::MIN_FRAME_LENGTH);
    let mut deframer = StreamDeframer::new(decoder).with_max_buffered(4);
    assert_eq!(deframer.max_buffered(), 1 + 4 + crate::codec::MIN_FRAME_LENGTH);

    let mut packet = vec![0x30, 62, 0x00, 0x01, b't'];
    packet.extend_from_slice(&[b'x'; 59]);
    let (head, tail) = packet.split_at(40);

    let first = deframer.ingest(head);
    assert!(first.fault().is_none());
    assert_eq!(deframer.residual_len(), 40);
    let second = deframer.ingest(tail);
    assert!(second.fault().is_none());
    assert_eq!(second.frames().len(), 1);
}

#[test]
fn default_cap_covers_the_default_mqtt_frame_limit() {
    let deframer = StreamDeframer::new(crate::codec::MqttPacketDecoder::default());
    assert!(deframer.max_buffered() >= 1 + 4 + crate::codec::MAX_FRAME_LENGTH);
}

#[test]
fn decoder_that_does_not_advance_is_a_fault() {
    let mut deframer = StreamDeframer::new(Stuck);
    let out = deframer.ingest(&[1, 2, 3]);
    assert_eq!(
        out.fault(),
        Some(&DecodeFault::NoProgress {
            offset: 0,
            reported: 0
        })
    );
    assert!(out.frames().is_empty());
}

#[rstest]
fn residual_is_an_owned_copy(mut deframer: StreamDeframer<LengthByte>) {
    let mut chunk = vec![2, b'o'];
    deframer.ingest(&chunk);
    chunk.fill(0xff);
    drop(chunk);

    let out = deframer.ingest(&[b'k']);
    assert_eq!(out.into_frames(), vec![b"ok".to_vec()]);
}
