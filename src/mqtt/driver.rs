//! Event pump turning `rumqttc` traffic into [`ServiceEvent`]s.
//!
//! The `rumqttc` event loop runs on its own task, started on the first call
//! to [`MqttDriver::next_event`]. It resolves subscribe acknowledgements,
//! classifies inbound publishes, and applies the reconnect backoff. Shadow
//! request timeouts are swept by the driver itself.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use bytes::Bytes;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Outgoing, Packet, SubscribeReasonCode};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
    MqttTransport,
    from_rumqttc_qos,
    inflight::Inflight,
    shadow::{self, ShadowTopic},
};
use crate::{
    client::{SharedConnection, lock},
    codec::{FrameDecoder, InboundFrame},
    config::ConnectionConfig,
    service::{BrokerError, ServiceEvent},
};

/// Capacity of the channel between the event loop task and the driver.
pub const EVENT_CAPACITY: usize = 64;

/// Exponential reconnect delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    maximum: Duration,
    attempt: u32,
}

impl Backoff {
    /// Start at `base`, doubling up to `maximum`.
    #[must_use]
    pub fn new(base: Duration, maximum: Duration) -> Self {
        Self {
            base,
            maximum: maximum.max(base),
            attempt: 0,
        }
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2_u32.saturating_pow(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(factor).min(self.maximum)
    }

    /// Forget failed attempts after a successful connection.
    pub fn reset(&mut self) { self.attempt = 0; }
}

/// Outcome of translating one event loop event.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Translated {
    pub(crate) events: Vec<ServiceEvent>,
    /// Topics no longer needed once this event is handled.
    pub(crate) release: Vec<String>,
}

impl Translated {
    fn event(event: ServiceEvent) -> Self {
        Self {
            events: vec![event],
            release: Vec::new(),
        }
    }
}

/// Translate one event loop event, resolving acknowledgement waiters.
pub(crate) fn translate(event: Event, inflight: &Inflight) -> Translated {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => Translated::event(ServiceEvent::Connect),
        Event::Incoming(Packet::Publish(publish)) => route_publish(publish.topic, publish.payload, inflight),
        Event::Incoming(Packet::SubAck(ack)) => {
            let codes: Vec<_> = ack
                .return_codes
                .iter()
                .map(|code| match code {
                    SubscribeReasonCode::Success(qos) => Some(from_rumqttc_qos(*qos)),
                    SubscribeReasonCode::Failure => None,
                })
                .collect();
            match inflight.take_ack(ack.pkid) {
                Some(waiter) => waiter.resolve(&codes),
                None => trace!(packet_id = ack.pkid, "suback without a waiter"),
            }
            Translated::default()
        }
        Event::Outgoing(Outgoing::Subscribe(packet_id)) => {
            if !inflight.bind(packet_id) {
                trace!(packet_id, "subscribe replayed without a waiter");
            }
            Translated::default()
        }
        _ => Translated::default(),
    }
}

fn route_publish(topic: String, payload: Bytes, inflight: &Inflight) -> Translated {
    let Some(parsed) = shadow::parse_topic(&topic) else {
        return Translated::event(ServiceEvent::Message { topic, payload });
    };
    let document = match serde_json::from_slice::<Value>(&payload) {
        Ok(document) => document,
        Err(error) => {
            warn!(%topic, %error, "shadow document is not valid JSON");
            return Translated::event(ServiceEvent::Message { topic, payload });
        }
    };

    match parsed {
        ShadowTopic::Response { thing, op, status } => {
            let tracked = shadow::response_token(&document)
                .and_then(|token| inflight.complete_operation(&token).map(|pending| (token, pending)));
            let current = shadow::document_version(&document)
                .is_none_or(|version| inflight.observe_version(thing, version));
            match tracked {
                Some((token, pending)) => {
                    let release = if pending.transient {
                        shadow::operation_topics(thing, op).to_vec()
                    } else {
                        Vec::new()
                    };
                    if !current {
                        debug!(thing, op = op.as_str(), "discarding stale answer");
                        return Translated {
                            events: Vec::new(),
                            release,
                        };
                    }
                    Translated {
                        events: vec![ServiceEvent::Status {
                            thing: thing.to_owned(),
                            status,
                            token,
                            state: document,
                        }],
                        release,
                    }
                }
                None if inflight.thing(thing).is_some() => {
                    trace!(thing, op = op.as_str(), "answer to another client's request");
                    Translated::default()
                }
                None => Translated::event(ServiceEvent::Message { topic, payload }),
            }
        }
        ShadowTopic::Delta { thing } => {
            if inflight.thing(thing).is_none() {
                return Translated::event(ServiceEvent::Message { topic, payload });
            }
            if let Some(version) = shadow::document_version(&document) {
                if !inflight.observe_version(thing, version) {
                    debug!(thing, version, "discarding stale delta");
                    return Translated::default();
                }
            }
            Translated::event(ServiceEvent::Delta {
                thing: thing.to_owned(),
                state: document,
            })
        }
    }
}

/// State owned by the event loop task.
struct Pump {
    eventloop: EventLoop,
    client: AsyncClient,
    inflight: Arc<Inflight>,
    events: mpsc::Sender<ServiceEvent>,
    backoff: Backoff,
    /// A CONNACK was seen since the last connection loss.
    connected: bool,
    verbose: bool,
}

impl Pump {
    async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let polled = tokio::select! {
                () = shutdown.cancelled() => break,
                polled = self.eventloop.poll() => polled,
            };
            let (events, lost) = match polled {
                Ok(event) => (self.handle(event), false),
                Err(ConnectionError::RequestsDone) => {
                    debug!("all client handles dropped, stopping event loop");
                    break;
                }
                Err(error) => (self.connection_lost(&error), true),
            };
            for event in events {
                if self.events.send(event).await.is_err() {
                    return;
                }
            }
            if !lost {
                continue;
            }
            let delay = self.backoff.next_delay();
            debug!(?delay, "waiting before reconnect");
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
            if self.events.send(ServiceEvent::Reconnect).await.is_err() {
                return;
            }
        }
    }

    fn handle(&mut self, event: Event) -> Vec<ServiceEvent> {
        if self.verbose {
            debug!(?event, "mqtt event");
        } else {
            trace!(?event, "mqtt event");
        }
        if matches!(event, Event::Incoming(Packet::ConnAck(_))) {
            info!("connected to broker");
            self.backoff.reset();
            self.connected = true;
        }
        let Translated { events, release } = translate(event, &self.inflight);
        for topic in release {
            if let Err(error) = self.client.try_unsubscribe(topic.clone()) {
                debug!(%topic, %error, "could not release shadow answer topic");
            }
        }
        events
    }

    fn connection_lost(&mut self, error: &ConnectionError) -> Vec<ServiceEvent> {
        warn!(%error, "broker connection lost");
        for waiter in self.inflight.drain_waiters() {
            waiter.fail(BrokerError::Disconnected);
        }
        let mut events = vec![
            ServiceEvent::Error {
                reason: error.to_string(),
            },
            ServiceEvent::Close,
        ];
        if self.connected {
            events.push(ServiceEvent::Offline);
        }
        self.connected = false;
        events
    }
}

/// Source of [`ServiceEvent`]s for a connection built by
/// [`ConnectionBuilder::connect_mqtt`](crate::client::ConnectionBuilder::connect_mqtt).
pub struct MqttDriver {
    events: mpsc::Receiver<ServiceEvent>,
    pump: Option<Pump>,
    task: Option<JoinHandle<()>>,
    client: AsyncClient,
    inflight: Arc<Inflight>,
    expired: VecDeque<ServiceEvent>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for MqttDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttDriver")
            .field("started", &self.pump.is_none())
            .field("inflight", &self.inflight)
            .field("expired", &self.expired.len())
            .finish_non_exhaustive()
    }
}

impl MqttDriver {
    pub(crate) fn new(
        client: AsyncClient,
        eventloop: EventLoop,
        inflight: Arc<Inflight>,
        config: &ConnectionConfig,
    ) -> Self {
        let (tx, events) = mpsc::channel(EVENT_CAPACITY);
        let pump = Pump {
            eventloop,
            client: client.clone(),
            inflight: Arc::clone(&inflight),
            events: tx,
            backoff: Backoff::new(config.base_reconnect_time, config.maximum_reconnect_time),
            connected: false,
            verbose: config.debug,
        };
        Self {
            events,
            pump: Some(pump),
            task: None,
            client,
            inflight,
            expired: VecDeque::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Wait for the next event.
    ///
    /// Starts the event loop task on first use. Returns `None` once the
    /// event loop has stopped. Cancelling the returned future loses no
    /// events.
    pub async fn next_event(&mut self) -> Option<ServiceEvent> {
        if let Some(pump) = self.pump.take() {
            self.task = Some(tokio::spawn(pump.run(self.shutdown.clone())));
        }
        loop {
            if let Some(event) = self.expired.pop_front() {
                return Some(event);
            }
            let deadline = self.inflight.next_deadline();
            tokio::select! {
                event = self.events.recv() => return event,
                () = sleep_until(deadline) => self.expire_operations(),
            }
        }
    }

    fn expire_operations(&mut self) {
        for (token, pending) in self.inflight.expire(Instant::now().into_std()) {
            warn!(thing = %pending.thing, %token, op = pending.op.as_str(), "shadow request timed out");
            if pending.transient {
                for topic in shadow::operation_topics(&pending.thing, pending.op) {
                    if let Err(error) = self.client.try_unsubscribe(topic) {
                        debug!(%error, "could not release shadow answer topic");
                    }
                }
            }
            self.expired.push_back(ServiceEvent::Timeout {
                thing: pending.thing,
                token,
            });
        }
    }

    /// Stop the event loop task.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(%error, "event loop task failed");
            }
        }
    }
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Pump events from `driver` into `connection` until `shutdown` fires or the
/// event loop stops.
///
/// On exit the broker session is ended and a final
/// [`ServiceEvent::Close`] is dispatched, leaving the connection clean.
pub async fn drive<D>(
    connection: SharedConnection<MqttTransport, D>,
    mut driver: MqttDriver,
    shutdown: CancellationToken,
) where
    D: FrameDecoder,
    D::Frame: InboundFrame,
{
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = driver.next_event() => event,
        };
        let Some(event) = event else {
            break;
        };
        lock(&connection).dispatch(event);
    }
    {
        let mut guard = lock(&connection);
        if let Err(error) = guard.service().disconnect() {
            debug!(%error, "could not queue disconnect");
        }
        guard.dispatch(ServiceEvent::Close);
    }
    driver.shutdown().await;
}
