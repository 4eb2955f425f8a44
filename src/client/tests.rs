//! Unit tests for `Connection` event routing.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use rstest::{fixture, rstest};
use serde_json::json;
use tracing_test::traced_test;

use super::*;
use crate::{
    codec::DecodeFault,
    config::ClientMode,
    correlation::ClientToken,
    message::QoS,
    service::{BrokerError, ServiceEvent, ShadowStatus},
    session::{DuplicateRegistration, Registration},
    test_helpers::{Call, RecordingService},
};

type Log = Arc<Mutex<Vec<String>>>;

#[fixture]
fn log() -> Log { Arc::new(Mutex::new(Vec::new())) }

fn entries(log: &Log) -> Vec<String> { log.lock().expect("log lock").clone() }

fn recording_observers(log: &Log) -> Observers {
    let push = |log: &Log| {
        let log = Arc::clone(log);
        move |entry: String| log.lock().expect("log lock").push(entry)
    };
    let (connect, close, offline, reconnect) = (push(log), push(log), push(log), push(log));
    let (error, message, thing, granted) = (push(log), push(log), push(log), push(log));
    let (delta, answer, timeout) = (push(log), push(log), push(log));
    Observers::new()
        .on_connect(move || connect("connect".into()))
        .on_close(move || close("close".into()))
        .on_offline(move || offline("offline".into()))
        .on_reconnect(move || reconnect("reconnect".into()))
        .on_error(move |e| error(format!("error:{e}")))
        .on_message(move |topic, text| message(format!("message:{topic}:{text}")))
        .on_thing_connected(move |name| thing(format!("thing:{name}")))
        .on_subscription(move |grants| {
            for grant in grants {
                granted(format!("granted:{}:{}", grant.topic, grant.qos.as_u8()));
            }
        })
        .on_delta(move |name, state| delta(format!("delta:{name}:{state}")))
        .on_status(move |name, status, token, _| {
            answer(format!("status:{name}:{}:{token}", status.as_str()));
        })
        .on_timeout(move |name, token| timeout(format!("timeout:{name}:{token}")))
}

fn shadow_connection(log: &Log) -> Connection<RecordingService> {
    ConnectionBuilder::new()
        .with_mode(ClientMode::Shadow)
        .with_observers(recording_observers(log))
        .build(RecordingService::new())
}

/// PUBLISH qos 0 packet for `topic` carrying `payload`.
fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
    let topic_len = u16::try_from(topic.len()).expect("short topic");
    let remaining = 2 + topic.len() + payload.len();
    let mut packet = vec![0x30, u8::try_from(remaining).expect("short packet")];
    packet.extend_from_slice(&topic_len.to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}

#[rstest]
#[case(ServiceEvent::Connect, "connect")]
#[case(ServiceEvent::Reconnect, "reconnect")]
#[case(ServiceEvent::Offline, "offline")]
#[case(ServiceEvent::Close, "close")]
#[case(ServiceEvent::Error { reason: "boom".into() }, "error:transport error: boom")]
#[case(
    ServiceEvent::Timeout { thing: "lamp".into(), token: ClientToken::new("c-1") },
    "timeout:lamp:c-1"
)]
#[case(
    ServiceEvent::Delta { thing: "lamp".into(), state: json!({"on": true}) },
    r#"delta:lamp:{"on":true}"#
)]
#[case(
    ServiceEvent::Status {
        thing: "lamp".into(),
        status: ShadowStatus::Rejected,
        token: ClientToken::new("c-2"),
        state: json!({}),
    },
    "status:lamp:rejected:c-2"
)]
#[case(
    ServiceEvent::Message { topic: "a/b".into(), payload: Bytes::from_static(b"hi") },
    "message:a/b:hi"
)]
fn routes_each_event_to_its_observer(log: Log, #[case] event: ServiceEvent, #[case] expected: &str) {
    let mut connection = shadow_connection(&log);
    connection.dispatch(event);

    assert_eq!(entries(&log), [expected]);
}

#[rstest]
fn missing_observers_are_skipped() {
    let mut connection = ConnectionBuilder::new().build(RecordingService::new());
    connection.dispatch(ServiceEvent::Connect);
    connection.dispatch(ServiceEvent::Message {
        topic: "t".into(),
        payload: Bytes::from_static(b"x"),
    });
    connection.dispatch(ServiceEvent::Close);
}

#[rstest]
fn message_payload_is_lossy_text(log: Log) {
    let mut connection = shadow_connection(&log);
    connection.dispatch(ServiceEvent::Message {
        topic: "t".into(),
        payload: Bytes::from_static(&[b'o', b'k', 0xff]),
    });

    assert_eq!(entries(&log), ["message:t:ok\u{fffd}"]);
}

#[rstest]
#[traced_test]
fn close_clears_state_before_observer() {
    let observers = Observers::new().on_close(|| tracing::info!("close observer ran"));
    let mut connection = ConnectionBuilder::new()
        .with_mode(ClientMode::Shadow)
        .with_observers(observers)
        .build(RecordingService::new());
    let _ = connection.subscribe(["a", "b"], None);
    let _ = connection.add_thing("lamp", None);
    connection.dispatch(ServiceEvent::Chunk(Bytes::from_static(&[0x30, 0x05])));
    assert_eq!(connection.residual_len(), 2);

    connection.dispatch(ServiceEvent::Close);

    assert!(!connection.is_subscribed("a"));
    assert!(!connection.is_registered("lamp"));
    assert_eq!(connection.residual_len(), 0);
    logs_assert(|lines: &[&str]| {
        let position = |needle: &str| lines.iter().position(|line| line.contains(needle));
        match (position("session state cleared"), position("close observer ran")) {
            (Some(cleared), Some(observed)) if cleared < observed => Ok(()),
            other => Err(format!("unexpected close ordering: {other:?}")),
        }
    });
}

#[rstest]
fn repeated_close_unregisters_once(log: Log) {
    let mut connection = shadow_connection(&log);
    let _ = connection.add_thing("a", None);
    let _ = connection.add_thing("b", None);
    for _ in 0..3 {
        connection.dispatch(ServiceEvent::Close);
    }

    let unregisters = connection
        .service()
        .count(|call| matches!(call, Call::Unregister { .. }));
    assert_eq!(unregisters, 2);
    assert_eq!(entries(&log), ["close", "close", "close"]);
}

#[rstest]
fn close_allows_resubscribing(log: Log) {
    let mut connection = shadow_connection(&log);
    let _ = connection.subscribe(["a"], None);
    connection.dispatch(ServiceEvent::Close);
    let requested = connection.subscribe(["a"], None);

    assert_eq!(requested, ["a"]);
}

#[rstest]
fn chunk_is_deframed_into_messages(log: Log) {
    let mut connection = shadow_connection(&log);
    let packet = publish_packet("sensors/t", b"21.5");
    let (head, tail) = packet.split_at(5);

    connection.dispatch(ServiceEvent::Chunk(Bytes::copy_from_slice(head)));
    assert!(entries(&log).is_empty());
    connection.dispatch(ServiceEvent::Chunk(Bytes::copy_from_slice(tail)));

    assert_eq!(entries(&log), ["message:sensors/t:21.5"]);
}

#[rstest]
fn control_packets_are_not_messages(log: Log) {
    let mut connection = shadow_connection(&log);
    connection.ingest(&[0xd0, 0x00]);

    assert!(entries(&log).is_empty());
}

#[rstest]
fn decode_fault_reaches_error_observer(log: Log) {
    let mut connection = shadow_connection(&log);
    let mut chunk = publish_packet("t", b"1");
    chunk.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0xff]);
    connection.ingest(&chunk);

    let seen = entries(&log);
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], "message:t:1");
    assert!(seen[1].starts_with("error:failed to decode inbound data"));
    assert_eq!(connection.residual_len(), 0);
}

#[rstest]
fn subscription_grants_reach_observer(log: Log) {
    let mut connection = shadow_connection(&log);
    let options = crate::subscription::SubscribeOptions::default().with_qos(QoS::AtMostOnce);
    let _ = connection.subscribe(["a"], Some(options));
    connection.service_mut().grant_next_subscription();

    assert_eq!(entries(&log), ["granted:a:0"]);
}

#[rstest]
fn rejected_subscription_reports_error_and_persists(log: Log) {
    let mut connection = shadow_connection(&log);
    let _ = connection.subscribe(["denied"], None);
    connection.service_mut().reject_next_subscription();

    assert_eq!(
        entries(&log),
        ["error:broker rejected subscription to denied"]
    );
    assert!(connection.is_subscribed("denied"));
}

#[rstest]
fn registration_completion_notifies_thing_connected(log: Log) {
    let mut connection = shadow_connection(&log);
    assert_eq!(connection.add_thing("lamp", None), Registration::Registered);
    assert!(entries(&log).is_empty());

    connection.service_mut().complete_next_registration(Ok(()));
    assert_eq!(entries(&log), ["thing:lamp"]);
}

#[rstest]
fn failed_registration_reports_error_and_persists(log: Log) {
    let mut connection = shadow_connection(&log);
    let _ = connection.add_thing("lamp", None);
    connection
        .service_mut()
        .complete_next_registration(Err(BrokerError::RegistrationRejected {
            thing: "lamp".into(),
        }));

    assert_eq!(
        entries(&log),
        ["error:broker rejected registration of thing lamp"]
    );
    assert!(connection.is_registered("lamp"));
}

#[rstest]
#[case(DuplicateRegistration::Renotify, vec!["thing:lamp"])]
#[case(DuplicateRegistration::Ignore, vec![])]
fn duplicate_add_thing_follows_policy(
    log: Log,
    #[case] policy: DuplicateRegistration,
    #[case] expected: Vec<&str>,
) {
    let mut connection = ConnectionBuilder::new()
        .with_mode(ClientMode::Shadow)
        .with_duplicate_registration(policy)
        .with_observers(recording_observers(&log))
        .build(RecordingService::new());
    let _ = connection.add_thing("lamp", None);
    let _ = connection.add_thing("lamp", None);

    assert_eq!(entries(&log), expected);
    assert_eq!(
        connection
            .service()
            .count(|call| matches!(call, Call::Register { .. })),
        1
    );
}

#[rstest]
fn publish_forwards_and_maps_errors() {
    let mut connection = ConnectionBuilder::new().build(RecordingService::new());
    connection
        .publish("a/b", "hello", QoS::AtLeastOnce)
        .expect("publish queued");
    assert_eq!(
        connection.service().calls(),
        [Call::Publish {
            topic: "a/b".into(),
            payload: Bytes::from_static(b"hello"),
            qos: QoS::AtLeastOnce,
        }]
    );

    let failing = RecordingService::new().with_publish_error(BrokerError::Disconnected);
    let mut connection = ConnectionBuilder::new().build(failing);
    let err = connection
        .publish("a/b", Vec::from("x"), QoS::AtMostOnce)
        .expect_err("publish should fail");
    assert!(matches!(err, ClientError::Broker(BrokerError::Disconnected)));
}

#[rstest]
#[traced_test]
fn device_mode_refuses_things_with_warning(log: Log) {
    let mut connection = ConnectionBuilder::new()
        .with_observers(recording_observers(&log))
        .build(RecordingService::new());

    assert_eq!(connection.add_thing("lamp", None), Registration::Unsupported);
    assert!(connection.service().calls().is_empty());
    assert!(logs_contain("thing registration requires shadow mode"));
}

#[rstest]
#[traced_test]
fn get_on_unregistered_thing_warns_and_forwards(log: Log) {
    let mut connection = shadow_connection(&log);
    let token = connection.get("stranger");

    assert!(token.is_some());
    assert!(logs_contain("shadow get for unregistered thing"));
}

#[test]
fn decode_fault_converts_into_client_error() {
    let err = ClientError::from(DecodeFault::malformed("bad"));
    assert!(matches!(err, ClientError::Decode(_)));
}
