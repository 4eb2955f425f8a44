//! Decode faults raised by frame decoders and the stream deframer.
//!
//! A fault means the bytes at the current offset are definitively malformed.
//! Running out of bytes is never a fault: decoders report
//! [`Decoded::Incomplete`](super::Decoded::Incomplete) instead.

use thiserror::Error;

/// Malformed input detected while splitting a byte stream into frames.
///
/// # Examples
///
/// ```
/// use thingwire::codec::DecodeFault;
///
/// let fault = DecodeFault::ReservedPacketType { packet_type: 15 };
/// assert_eq!(fault.kind(), "packet_type");
/// assert_eq!(fault.to_string(), "reserved or client-only packet type 15");
/// ```
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeFault {
    /// The remaining-length varint ran past four bytes.
    #[error("malformed remaining length")]
    MalformedRemainingLength,

    /// The packet type is reserved or only ever sent by clients.
    #[error("reserved or client-only packet type {packet_type}")]
    ReservedPacketType {
        /// Upper nibble of the fixed header.
        packet_type: u8,
    },

    /// The fixed-header flags are not valid for the packet type.
    #[error("invalid flags {flags:#06b} for packet type {packet_type}")]
    InvalidFlags {
        /// Upper nibble of the fixed header.
        packet_type: u8,
        /// Lower nibble of the fixed header.
        flags: u8,
    },

    /// A PUBLISH carried QoS 3.
    #[error("invalid QoS level in PUBLISH")]
    InvalidQos,

    /// The packet body is shorter than its mandatory fields.
    #[error("{packet} body of {len} bytes is truncated")]
    TruncatedBody {
        /// Packet name.
        packet: &'static str,
        /// Declared body length.
        len: usize,
    },

    /// A SUBACK carried an undefined return code.
    #[error("invalid SUBACK return code {code:#04x}")]
    InvalidReturnCode {
        /// Offending return code.
        code: u8,
    },

    /// A topic name was not valid UTF-8.
    #[error("topic name is not valid UTF-8")]
    InvalidTopic,

    /// A single frame declared a body larger than the decoder accepts.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Declared body size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// The residual buffer grew past its cap without yielding a frame.
    #[error("buffered {buffered} bytes without a complete frame (limit {max})")]
    BufferOverflow {
        /// Bytes that would have been retained.
        buffered: usize,
        /// Configured cap.
        max: usize,
    },

    /// A decoder returned an offset that did not advance or overran the buffer.
    #[error("decoder made no progress at offset {offset} (reported {reported})")]
    NoProgress {
        /// Offset the decoder was called with.
        offset: usize,
        /// Offset the decoder returned.
        reported: usize,
    },

    /// Decoder-specific malformation.
    #[error("malformed frame: {reason}")]
    Malformed {
        /// Human readable description.
        reason: String,
    },
}

impl DecodeFault {
    /// Short category label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRemainingLength | Self::OversizedFrame { .. } => "length",
            Self::ReservedPacketType { .. } | Self::InvalidFlags { .. } => "packet_type",
            Self::InvalidQos
            | Self::TruncatedBody { .. }
            | Self::InvalidReturnCode { .. }
            | Self::InvalidTopic
            | Self::Malformed { .. } => "body",
            Self::BufferOverflow { .. } => "overflow",
            Self::NoProgress { .. } => "decoder",
        }
    }

    /// Build a [`DecodeFault::Malformed`] from any displayable reason.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
