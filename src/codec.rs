//! Pluggable frame decoders for inbound byte streams.
//!
//! A [`FrameDecoder`] recognises exactly one frame starting at a given offset
//! of a buffer. It is pure: it never mutates the buffer or keeps state
//! between calls, which lets the [`StreamDeframer`](crate::deframer::StreamDeframer)
//! own all buffering. The default implementation,
//! [`MqttPacketDecoder`], understands the server-to-client packets of
//! MQTT 3.1.1.
//!
//! # Contract
//!
//! - [`Decoded::Frame`] returns the frame and the offset just past it. The new
//!   offset must be greater than the input offset and no larger than the
//!   buffer length.
//! - [`Decoded::Incomplete`] means more bytes are needed. It is not an error.
//! - `Err(DecodeFault)` means the bytes are definitively malformed.

pub mod error;
pub mod mqtt;

pub use error::DecodeFault;
pub use mqtt::{MqttPacketDecoder, Packet, Publish, SubAckCode};

use crate::message::DecodedMessage;

/// Minimum single-frame body size a decoder may be configured with.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum single-frame body size (the MQTT four-byte varint ceiling).
pub const MAX_FRAME_LENGTH: usize = crate::byte_order::MAX_REMAINING_LENGTH;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Outcome of one successful decode attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded<F> {
    /// A full frame was recognised.
    Frame {
        /// Decoded frame.
        frame: F,
        /// Offset just past the frame.
        next: usize,
    },
    /// The buffer ends before the frame does.
    Incomplete,
}

/// Decode one frame from `buffer` starting at `offset`.
pub trait FrameDecoder {
    /// Frame type produced by decoding.
    type Frame;

    /// Attempt to decode exactly one frame.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeFault`] when the bytes at `offset` are malformed.
    fn decode(&self, buffer: &[u8], offset: usize) -> Result<Decoded<Self::Frame>, DecodeFault>;

    /// Largest encoded frame, header included, this decoder accepts.
    ///
    /// `None` means frames are unbounded.
    fn max_frame_len(&self) -> Option<usize> { None }
}

impl<T: FrameDecoder + ?Sized> FrameDecoder for &T {
    type Frame = T::Frame;

    fn decode(&self, buffer: &[u8], offset: usize) -> Result<Decoded<Self::Frame>, DecodeFault> {
        (**self).decode(buffer, offset)
    }

    fn max_frame_len(&self) -> Option<usize> { (**self).max_frame_len() }
}

/// Frames that may carry an application message.
///
/// The connection facade hands messages to the message observer and logs
/// anything else as a control frame.
pub trait InboundFrame {
    /// Short name for logging.
    fn kind(&self) -> &'static str;

    /// Convert into an application message, if this frame carries one.
    fn into_message(self) -> Option<DecodedMessage>;
}

impl InboundFrame for DecodedMessage {
    fn kind(&self) -> &'static str { "message" }

    fn into_message(self) -> Option<DecodedMessage> { Some(self) }
}
