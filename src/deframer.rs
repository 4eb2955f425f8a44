//! Reconstruct discrete frames from an arbitrarily chunked byte stream.
//!
//! [`StreamDeframer`] owns the residual buffer for one connection. Each call
//! to [`ingest`](StreamDeframer::ingest) prepends the residual to the new
//! chunk, decodes as many whole frames as the buffer holds and keeps an owned
//! copy of the undecoded tail for the next chunk. Chunk boundaries therefore
//! never change which frames come out, or their order.
//!
//! A decode fault discards everything buffered, including the residual, and
//! the deframer resumes clean on the next chunk. This trades completeness for
//! the guarantee that corrupt state cannot wedge the stream in a fault loop.

use bytes::BytesMut;
use tracing::{trace, warn};

use crate::codec::{DecodeFault, Decoded, FrameDecoder};

/// Default cap on residual bytes held while waiting for a frame to complete.
pub const DEFAULT_MAX_BUFFERED: usize = 16 * 1024 * 1024;

/// Frames recovered from one chunk, plus the fault that ended decoding, if any.
#[derive(Debug, PartialEq, Eq)]
pub struct Ingested<F> {
    frames: Vec<F>,
    fault: Option<DecodeFault>,
}

impl<F> Ingested<F> {
    fn empty() -> Self {
        Self {
            frames: Vec::new(),
            fault: None,
        }
    }

    /// Frames decoded, in stream order.
    #[must_use]
    pub fn frames(&self) -> &[F] { &self.frames }

    /// Fault that caused the buffer to be discarded.
    #[must_use]
    pub fn fault(&self) -> Option<&DecodeFault> { self.fault.as_ref() }

    /// Consume, keeping only the frames.
    #[must_use]
    pub fn into_frames(self) -> Vec<F> { self.frames }

    /// Consume into frames and fault.
    #[must_use]
    pub fn into_parts(self) -> (Vec<F>, Option<DecodeFault>) { (self.frames, self.fault) }
}

/// Stateful deframer wrapping a pure [`FrameDecoder`].
///
/// Not shared between threads or connections: one instance per connection,
/// reset whenever that connection is torn down.
///
/// # Examples
///
/// ```
/// use thingwire::{codec::MqttPacketDecoder, deframer::StreamDeframer};
///
/// let mut deframer = StreamDeframer::new(MqttPacketDecoder::default());
/// // A PINGRESP split across two chunks.
/// assert!(deframer.ingest(&[0xd0]).frames().is_empty());
/// assert_eq!(deframer.residual_len(), 1);
/// assert_eq!(deframer.ingest(&[0x00]).frames().len(), 1);
/// assert_eq!(deframer.residual_len(), 0);
/// ```
#[derive(Debug)]
pub struct StreamDeframer<D> {
    decoder: D,
    residual: BytesMut,
    max_buffered: usize,
}

impl<D: FrameDecoder> StreamDeframer<D> {
    /// Create a deframer with an empty residual buffer.
    ///
    /// The residual cap defaults to [`DEFAULT_MAX_BUFFERED`], raised to the
    /// decoder's largest frame when that is bigger.
    #[must_use]
    pub fn new(decoder: D) -> Self {
        let max_buffered = buffer_floor(&decoder).max(DEFAULT_MAX_BUFFERED);
        Self {
            decoder,
            residual: BytesMut::new(),
            max_buffered,
        }
    }

    /// Cap the number of residual bytes retained between chunks.
    ///
    /// The cap never drops below the decoder's largest frame, so a frame the
    /// decoder accepts whole is also accepted when split across chunks.
    #[must_use]
    pub fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = max_buffered.max(buffer_floor(&self.decoder));
        self
    }

    /// Effective residual cap.
    #[must_use]
    pub fn max_buffered(&self) -> usize { self.max_buffered }

    /// Decoder used for each frame.
    #[must_use]
    pub fn decoder(&self) -> &D { &self.decoder }

    /// Bytes received but not yet resolved into a frame.
    #[must_use]
    pub fn residual_len(&self) -> usize { self.residual.len() }

    /// Drop the residual buffer and its allocation.
    ///
    /// Frame boundaries mean nothing across connections, so this must run
    /// before the deframer sees bytes from a replacement connection.
    pub fn reset(&mut self) {
        if !self.residual.is_empty() {
            trace!(discarded = self.residual.len(), "resetting deframer residual");
        }
        self.residual = BytesMut::new();
    }

    /// Feed one chunk and return every frame it completes.
    ///
    /// An empty chunk is a no-op and leaves the residual untouched.
    pub fn ingest(&mut self, chunk: &[u8]) -> Ingested<D::Frame> {
        if chunk.is_empty() {
            return Ingested::empty();
        }

        let mut buffer = std::mem::take(&mut self.residual);
        buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut offset = 0;
        while offset < buffer.len() {
            match self.decoder.decode(&buffer, offset) {
                Ok(Decoded::Frame { frame, next }) if next > offset && next <= buffer.len() => {
                    frames.push(frame);
                    offset = next;
                }
                Ok(Decoded::Frame { next, .. }) => {
                    let fault = DecodeFault::NoProgress {
                        offset,
                        reported: next,
                    };
                    return Self::discard(frames, fault, buffer.len() - offset);
                }
                Ok(Decoded::Incomplete) => break,
                Err(fault) => return Self::discard(frames, fault, buffer.len() - offset),
            }
        }

        crate::metrics::inc_frames_decoded(frames.len());

        let pending = buffer.len() - offset;
        if pending > self.max_buffered {
            let fault = DecodeFault::BufferOverflow {
                buffered: pending,
                max: self.max_buffered,
            };
            return Self::discard(frames, fault, pending);
        }
        if pending > 0 {
            self.residual = BytesMut::from(&buffer[offset..]);
            trace!(pending, "buffered partial frame");
        }

        Ingested {
            frames,
            fault: None,
        }
    }

    fn discard(frames: Vec<D::Frame>, fault: DecodeFault, discarded: usize) -> Ingested<D::Frame> {
        warn!(
            error = %fault,
            kind = fault.kind(),
            discarded,
            recovered = frames.len(),
            "decode fault, discarding buffered bytes"
        );
        crate::metrics::inc_frames_decoded(frames.len());
        crate::metrics::inc_decode_faults(fault.kind());
        Ingested {
            frames,
            fault: Some(fault),
        }
    }
}

fn buffer_floor<D: FrameDecoder>(decoder: &D) -> usize { decoder.max_frame_len().unwrap_or(1).max(1) }

#[cfg(test)]
mod tests;
