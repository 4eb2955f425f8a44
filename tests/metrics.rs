#![cfg(feature = "metrics")]
//! Tests for `thingwire` metrics.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use rstest::rstest;
use thingwire::{
    client::ConnectionBuilder,
    config::ClientMode,
    metrics::{DECODE_FAULTS, EVENTS_DISPATCHED, FRAMES_DECODED, THINGS_REGISTERED},
    service::ServiceEvent,
};
use thingwire_testing::{RecordingService, counter_value, debugging_recorder, gauge_value, packets};

#[test]
fn decoded_frames_are_counted() {
    let (snapshotter, recorder) = debugging_recorder();
    metrics::with_local_recorder(&recorder, || {
        let mut connection = ConnectionBuilder::new().build(RecordingService::new());
        let mut bytes = packets::publish("a", b"1");
        bytes.extend(packets::pingresp());
        connection.ingest(&bytes);
    });

    assert_eq!(counter_value(&snapshotter, FRAMES_DECODED, None), Some(2));
}

#[test]
fn decode_faults_are_labelled_by_kind() {
    let (snapshotter, recorder) = debugging_recorder();
    metrics::with_local_recorder(&recorder, || {
        let mut connection = ConnectionBuilder::new().build(RecordingService::new());
        connection.ingest(&[0xf0, 0x00]);
    });

    assert_eq!(
        counter_value(&snapshotter, DECODE_FAULTS, Some(("kind", "packet_type"))),
        Some(1)
    );
}

#[rstest]
#[case(ServiceEvent::Connect, "connect")]
#[case(ServiceEvent::Close, "close")]
#[case(ServiceEvent::Offline, "offline")]
fn dispatched_events_are_counted(#[case] event: ServiceEvent, #[case] kind: &str) {
    let (snapshotter, recorder) = debugging_recorder();
    metrics::with_local_recorder(&recorder, || {
        let mut connection = ConnectionBuilder::new().build(RecordingService::new());
        connection.dispatch(event);
    });

    assert_eq!(
        counter_value(&snapshotter, EVENTS_DISPATCHED, Some(("event", kind))),
        Some(1)
    );
}

#[test]
fn registered_things_gauge_follows_the_registry() {
    let (snapshotter, recorder) = debugging_recorder();
    metrics::with_local_recorder(&recorder, || {
        let mut connection = ConnectionBuilder::new()
            .with_mode(ClientMode::Shadow)
            .build(RecordingService::new());
        let _ = connection.add_thing("a", None);
        let _ = connection.add_thing("b", None);
    });
    assert_eq!(gauge_value(&snapshotter, THINGS_REGISTERED), Some(2.0));

    metrics::with_local_recorder(&recorder, || {
        let mut connection = ConnectionBuilder::new()
            .with_mode(ClientMode::Shadow)
            .build(RecordingService::new());
        let _ = connection.add_thing("a", None);
        connection.dispatch(ServiceEvent::Close);
    });
    assert_eq!(gauge_value(&snapshotter, THINGS_REGISTERED), Some(0.0));
}
