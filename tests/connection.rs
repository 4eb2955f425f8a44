//! Event routing and logging of the connection facade.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::Level;
use rstest::rstest;
use serial_test::serial;
use thingwire::{
    client::{ClientError, ConnectionBuilder, Observers},
    config::ClientMode,
    service::ServiceEvent,
};
use thingwire_testing::{LoggerHandle, RecordingService, logger, packets, split_at};

type Seen = Arc<Mutex<Vec<String>>>;

fn recording_observers(seen: &Seen) -> Observers {
    let messages = Arc::clone(seen);
    let errors = Arc::clone(seen);
    let closes = Arc::clone(seen);
    Observers::new()
        .on_message(move |topic, text| {
            messages.lock().expect("seen lock").push(format!("{topic}={text}"));
        })
        .on_error(move |error: &ClientError| {
            let label = match error {
                ClientError::Decode(_) => "decode",
                ClientError::Broker(_) => "broker",
                ClientError::Transport { .. } => "transport",
                ClientError::Config(_) => "config",
            };
            errors.lock().expect("seen lock").push(format!("error:{label}"));
        })
        .on_close(move || closes.lock().expect("seen lock").push("close".into()))
}

#[rstest]
fn chunks_deliver_messages_in_order() {
    let seen = Seen::default();
    let mut connection = ConnectionBuilder::new()
        .with_observers(recording_observers(&seen))
        .build(RecordingService::new());
    let mut bytes = packets::publish("a", b"1");
    bytes.extend(packets::suback(1, &[None]));
    bytes.extend(packets::publish("b", b"2"));

    for chunk in split_at(&bytes, &[2, 9, 10]) {
        connection.dispatch(ServiceEvent::Chunk(Bytes::copy_from_slice(chunk)));
    }

    assert_eq!(*seen.lock().expect("seen lock"), ["a=1", "b=2"]);
    assert_eq!(connection.residual_len(), 0);
}

#[rstest]
fn close_discards_a_partial_frame() {
    let seen = Seen::default();
    let mut connection = ConnectionBuilder::new()
        .with_observers(recording_observers(&seen))
        .build(RecordingService::new());
    let bytes = packets::publish("a", b"payload");

    connection.ingest(&bytes[..4]);
    connection.dispatch(ServiceEvent::Close);
    connection.ingest(&bytes);

    assert_eq!(*seen.lock().expect("seen lock"), ["close", "a=payload"]);
}

#[rstest]
#[serial]
fn decode_fault_is_logged_and_reported(mut logger: LoggerHandle) {
    let seen = Seen::default();
    let mut connection = ConnectionBuilder::new()
        .with_observers(recording_observers(&seen))
        .build(RecordingService::new());
    let mut bytes = packets::publish("ok", b"1");
    bytes.push(0xf0);

    connection.ingest(&bytes);

    assert_eq!(*seen.lock().expect("seen lock"), ["ok=1", "error:decode"]);
    assert!(
        logger.contains(Level::Warn, "decode fault, discarding buffered bytes"),
        "decode fault should be logged"
    );
}

#[rstest]
#[serial]
fn shadow_get_for_unregistered_thing_warns(mut logger: LoggerHandle) {
    let mut connection = ConnectionBuilder::new()
        .with_mode(ClientMode::Shadow)
        .build(RecordingService::new());

    let token = connection.get("lamp");

    assert!(token.is_some());
    assert!(logger.contains(Level::Warn, "shadow get for unregistered thing"));
}

#[rstest]
#[serial]
fn device_mode_registration_warns(mut logger: LoggerHandle) {
    let mut connection = ConnectionBuilder::new().build(RecordingService::new());

    let _ = connection.add_thing("lamp", None);

    assert!(logger.contains(Level::Warn, "thing registration requires shadow mode"));
}

#[rstest]
fn transport_errors_reach_the_error_observer() {
    let seen = Seen::default();
    let mut connection = ConnectionBuilder::new()
        .with_observers(recording_observers(&seen))
        .build(RecordingService::new());

    connection.dispatch(ServiceEvent::Error {
        reason: "socket reset".into(),
    });
    connection.dispatch(ServiceEvent::Message {
        topic: "raw".into(),
        payload: Bytes::from_static(b"\xffok"),
    });

    assert_eq!(
        *seen.lock().expect("seen lock"),
        ["error:transport", "raw=\u{fffd}ok"]
    );
}
