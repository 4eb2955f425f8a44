//! Helpers for the integer encodings used on the MQTT wire.
//!
//! MQTT carries packet identifiers and string lengths as network-order `u16`
//! values and encodes the fixed-header remaining length as a little-endian
//! base-128 varint of at most four bytes. Keeping both here scopes the Clippy
//! expectations to the conversion points.

/// Largest value a four-byte remaining length can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Maximum number of bytes in a remaining-length varint.
pub const MAX_REMAINING_LENGTH_BYTES: usize = 4;

/// Serialise a `u16` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use thingwire::byte_order::write_network_u16;
///
/// assert_eq!(write_network_u16(0x1234), [0x12, 0x34]);
/// ```
#[must_use]
pub fn write_network_u16(value: u16) -> [u8; 2] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u16` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use thingwire::byte_order::read_network_u16;
///
/// assert_eq!(read_network_u16([0x12, 0x34]), 0x1234);
/// ```
#[must_use]
pub fn read_network_u16(bytes: [u8; 2]) -> u16 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u16::from_be_bytes(bytes)
}

/// Result of reading a remaining-length varint from the front of a slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemainingLength {
    /// The varint was complete.
    Complete {
        /// Decoded length of the packet body.
        value: usize,
        /// Number of bytes the varint itself occupied.
        encoded_len: usize,
    },
    /// More bytes are needed before the varint can be read.
    Incomplete,
    /// The continuation bit was still set on the fourth byte.
    Malformed,
}

/// Read a remaining-length varint from the start of `bytes`.
///
/// # Examples
///
/// ```
/// use thingwire::byte_order::{RemainingLength, read_remaining_length};
///
/// assert_eq!(
///     read_remaining_length(&[0xc1, 0x02]),
///     RemainingLength::Complete {
///         value: 321,
///         encoded_len: 2
///     }
/// );
/// assert_eq!(read_remaining_length(&[0xc1]), RemainingLength::Incomplete);
/// ```
#[must_use]
pub fn read_remaining_length(bytes: &[u8]) -> RemainingLength {
    let mut value = 0usize;
    for (index, byte) in bytes.iter().take(MAX_REMAINING_LENGTH_BYTES).enumerate() {
        value |= usize::from(byte & 0x7f) << (7 * index);
        if byte & 0x80 == 0 {
            return RemainingLength::Complete {
                value,
                encoded_len: index + 1,
            };
        }
    }
    if bytes.len() >= MAX_REMAINING_LENGTH_BYTES {
        RemainingLength::Malformed
    } else {
        RemainingLength::Incomplete
    }
}

/// Encode `value` as a remaining-length varint.
///
/// Returns `None` when `value` exceeds [`MAX_REMAINING_LENGTH`].
///
/// # Examples
///
/// ```
/// use thingwire::byte_order::write_remaining_length;
///
/// assert_eq!(write_remaining_length(321), Some(vec![0xc1, 0x02]));
/// assert_eq!(write_remaining_length(0), Some(vec![0x00]));
/// ```
#[must_use]
pub fn write_remaining_length(value: usize) -> Option<Vec<u8>> {
    if value > MAX_REMAINING_LENGTH {
        return None;
    }
    let mut out = Vec::with_capacity(MAX_REMAINING_LENGTH_BYTES);
    let mut rest = value;
    loop {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "masked to seven bits before the cast"
        )]
        let mut byte = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if rest == 0 {
            return Some(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::zero(0, &[0x00])]
    #[case::one_byte_max(127, &[0x7f])]
    #[case::two_bytes(128, &[0x80, 0x01])]
    #[case::three_bytes(16_384, &[0x80, 0x80, 0x01])]
    #[case::four_byte_max(MAX_REMAINING_LENGTH, &[0xff, 0xff, 0xff, 0x7f])]
    fn remaining_length_encodings(#[case] value: usize, #[case] encoded: &[u8]) {
        assert_eq!(write_remaining_length(value).as_deref(), Some(encoded));
        assert_eq!(
            read_remaining_length(encoded),
            RemainingLength::Complete {
                value,
                encoded_len: encoded.len()
            }
        );
    }

    #[test]
    fn remaining_length_rejects_oversized_values() {
        assert_eq!(write_remaining_length(MAX_REMAINING_LENGTH + 1), None);
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::one_continuation(&[0x80])]
    #[case::three_continuations(&[0xff, 0xff, 0xff])]
    fn remaining_length_waits_for_more_bytes(#[case] bytes: &[u8]) {
        assert_eq!(read_remaining_length(bytes), RemainingLength::Incomplete);
    }

    #[test]
    fn fifth_length_byte_is_malformed() {
        assert_eq!(
            read_remaining_length(&[0xff, 0xff, 0xff, 0xff, 0x01]),
            RemainingLength::Malformed
        );
    }

    #[test]
    fn trailing_bytes_are_not_consumed() {
        assert_eq!(
            read_remaining_length(&[0x05, 0xaa, 0xbb]),
            RemainingLength::Complete {
                value: 5,
                encoded_len: 1
            }
        );
    }

    #[test]
    fn network_u16_round_trip() {
        assert_eq!(write_network_u16(0xbeef), [0xbe, 0xef]);
        assert_eq!(read_network_u16([0xbe, 0xef]), 0xbeef);
    }
}
