//! Metric helpers for `thingwire`.
//!
//! Names and thin wrappers around the [`metrics`](https://docs.rs/metrics)
//! crate. With the `metrics` feature disabled every helper compiles to a
//! no-op so call sites stay unconditional.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the counter tracking frames recovered by the deframer.
pub const FRAMES_DECODED: &str = "thingwire_frames_decoded_total";
/// Name of the counter tracking decode faults, labelled by `kind`.
pub const DECODE_FAULTS: &str = "thingwire_decode_faults_total";
/// Name of the counter tracking dispatched service events, labelled by `event`.
pub const EVENTS_DISPATCHED: &str = "thingwire_events_dispatched_total";
/// Name of the gauge tracking registered thing sessions.
pub const THINGS_REGISTERED: &str = "thingwire_things_registered";

/// Record frames recovered from one chunk.
pub fn inc_frames_decoded(count: usize) {
    #[cfg(feature = "metrics")]
    {
        if count > 0 {
            counter!(FRAMES_DECODED).increment(u64::try_from(count).unwrap_or(u64::MAX));
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

/// Record a decode fault of the given category.
pub fn inc_decode_faults(kind: &'static str) {
    #[cfg(feature = "metrics")]
    {
        counter!(DECODE_FAULTS, "kind" => kind).increment(1);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record one dispatched service event.
pub fn inc_events(event: &'static str) {
    #[cfg(feature = "metrics")]
    {
        counter!(EVENTS_DISPATCHED, "event" => event).increment(1);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = event;
}

/// Publish the number of registered thing sessions.
pub fn set_things_registered(count: usize) {
    #[cfg(feature = "metrics")]
    {
        #[expect(
            clippy::cast_precision_loss,
            reason = "gauge values are f64; registry sizes stay far below 2^52"
        )]
        gauge!(THINGS_REGISTERED).set(count as f64);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}
