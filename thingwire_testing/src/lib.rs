//! Utilities for exercising a [`Connection`](thingwire::client::Connection)
//! without a broker.
//!
//! [`RecordingService`] stands in for the transport, [`packets`] builds the
//! server-to-client MQTT packets a broker would stream, and [`logger`]
//! captures `log` records for assertions.
//!
//! ```rust
//! use thingwire::client::ConnectionBuilder;
//! use thingwire_testing::{RecordingService, packets};
//!
//! let mut connection = ConnectionBuilder::new().build(RecordingService::new());
//! connection.ingest(&packets::publish("a/b", b"hello"));
//! assert_eq!(connection.residual_len(), 0);
//! ```

pub mod logging;
pub mod metrics;
pub mod packets;

pub use logging::{LoggerHandle, logger};
pub use metrics::{counter_value, debugging_recorder, gauge_value};
pub use thingwire::test_helpers::{Call, RecordingService};

/// Split `bytes` at the given offsets, clamped to the input length.
///
/// Offsets may be unsorted or repeated; repeated offsets yield empty chunks.
///
/// ```rust
/// let chunks = thingwire_testing::split_at(b"abcdef", &[4, 1, 1]);
/// assert_eq!(chunks, [&b"a"[..], b"", b"bcd", b"ef"]);
/// ```
#[must_use]
pub fn split_at<'a>(bytes: &'a [u8], offsets: &[usize]) -> Vec<&'a [u8]> {
    let mut cuts: Vec<usize> = offsets.iter().map(|&at| at.min(bytes.len())).collect();
    cuts.sort_unstable();
    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        chunks.push(&bytes[start..cut]);
        start = cut;
    }
    chunks.push(&bytes[start..]);
    chunks
}
