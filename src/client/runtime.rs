//! Connection runtime: registries, deframer and observer routing over one
//! transport handle.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{ClientError, Observers};
use crate::{
    codec::{FrameDecoder, InboundFrame, MqttPacketDecoder},
    config::{ClientMode, ConnectionConfig},
    correlation::ClientToken,
    deframer::StreamDeframer,
    message::QoS,
    metrics,
    service::{BrokerError, Completion, Grant, Service, ServiceEvent},
    session::{RegisterOptions, Registration, ThingSessionRegistry},
    subscription::{SubscribeOptions, SubscriptionRegistry},
};

/// A [`Connection`] shared between the event pump and application tasks.
///
/// The lock is never held across an `.await`.
pub type SharedConnection<S, D = MqttPacketDecoder> = Arc<Mutex<Connection<S, D>>>;

/// Lock `shared`, recovering the guard if a previous holder panicked.
///
/// Connection state stays consistent across an observer panic because every
/// mutation completes before observers run.
pub fn lock<S, D>(shared: &SharedConnection<S, D>) -> MutexGuard<'_, Connection<S, D>>
where
    D: FrameDecoder,
{
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client-side runtime for one broker connection.
///
/// Owns the subscription and thing registries and the inbound deframer, and
/// routes every [`ServiceEvent`] to the configured [`Observers`]. Created by
/// [`ConnectionBuilder::build`].
///
/// # Examples
///
/// ```ignore
/// use thingwire::{
///     client::{ConnectionBuilder, Observers},
///     service::ServiceEvent,
///     test_helpers::RecordingService,
/// };
///
/// let mut connection = ConnectionBuilder::new()
///     .with_observers(Observers::new().on_message(|topic, text| println!("{topic}: {text}")))
///     .build(RecordingService::new());
/// connection.subscribe(["sensors/temp"], None);
/// connection.dispatch(ServiceEvent::Message {
///     topic: "sensors/temp".into(),
///     payload: "21.5".into(),
/// });
/// ```
pub struct Connection<S, D = MqttPacketDecoder>
where
    D: FrameDecoder,
{
    pub(crate) service: S,
    pub(crate) config: ConnectionConfig,
    pub(crate) observers: Arc<Observers>,
    pub(crate) subscriptions: SubscriptionRegistry,
    pub(crate) things: ThingSessionRegistry,
    pub(crate) deframer: StreamDeframer<D>,
}

impl<S, D> fmt::Debug for Connection<S, D>
where
    D: FrameDecoder,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("mode", &self.things.mode())
            .field("subscriptions", &self.subscriptions.len())
            .field("things", &self.things.len())
            .field("residual", &self.deframer.residual_len())
            .finish_non_exhaustive()
    }
}

impl<S, D> Connection<S, D>
where
    S: Service,
    D: FrameDecoder,
    D::Frame: InboundFrame,
{
    /// Subscribe to each topic not already subscribed.
    ///
    /// Granted levels reach the subscription observer; rejections reach the
    /// error observer and leave the entry in place. Returns the topics for
    /// which a request was issued.
    pub fn subscribe<I, T>(&mut self, topics: I, options: Option<SubscribeOptions>) -> Vec<String>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let observers = &self.observers;
        self.subscriptions
            .subscribe(&mut self.service, topics, options, |_| {
                subscription_completion(Arc::clone(observers))
            })
    }

    /// Remove the subscription to `topic`.
    ///
    /// Returns `false` when `topic` was not subscribed.
    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        self.subscriptions.unsubscribe(&mut self.service, topic)
    }

    /// Publish `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Broker`] when the transport cannot queue the
    /// request.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
    ) -> Result<(), ClientError> {
        self.service
            .publish(topic, payload.into(), qos)
            .map_err(ClientError::from)
    }

    /// Register the shadow session of `thing` once.
    ///
    /// The thing-connected observer fires when the transport confirms the
    /// registration, or immediately for a repeat registration under
    /// [`DuplicateRegistration::Renotify`](crate::session::DuplicateRegistration::Renotify).
    pub fn add_thing(&mut self, thing: &str, options: Option<RegisterOptions>) -> Registration {
        let done = registration_completion(Arc::clone(&self.observers), thing.to_owned());
        let outcome = self.things.add_thing(&mut self.service, thing, options, done);
        if outcome == Registration::Renotify {
            self.observers.thing_connected(thing);
        }
        outcome
    }

    /// Request the shadow document of `thing`.
    pub fn get(&mut self, thing: &str) -> Option<ClientToken> {
        self.things.get(&mut self.service, thing)
    }

    /// Request a shadow update of `thing`.
    pub fn update(&mut self, thing: &str, state: &Value) -> Option<ClientToken> {
        self.things.update(&mut self.service, thing, state)
    }

    /// Tear down the shadow session of `thing`.
    pub fn unregister(&mut self, thing: &str) -> bool {
        self.things.unregister(&mut self.service, thing)
    }

    /// Delete the shadow document of `thing` and forget its session.
    pub fn delete(&mut self, thing: &str) -> Option<ClientToken> {
        self.things.delete(&mut self.service, thing)
    }

    /// Route one transport event.
    ///
    /// A [`ServiceEvent::Close`] clears both registries and the deframer
    /// before the close observer runs.
    pub fn dispatch(&mut self, event: ServiceEvent) {
        metrics::inc_events(event.kind());
        trace!(event = event.kind(), "dispatching service event");
        match event {
            ServiceEvent::Connect => self.observers.connected(),
            ServiceEvent::Reconnect => self.observers.reconnecting(),
            ServiceEvent::Close => {
                self.teardown();
                self.observers.closed();
            }
            ServiceEvent::Offline => self.observers.offline(),
            ServiceEvent::Timeout { thing, token } => self.observers.timed_out(&thing, &token),
            ServiceEvent::Error { reason } => {
                self.observers.error(&ClientError::transport(reason));
            }
            ServiceEvent::Delta { thing, state } => self.observers.delta(&thing, &state),
            ServiceEvent::Status {
                thing,
                status,
                token,
                state,
            } => self.observers.status(&thing, status, &token, &state),
            ServiceEvent::Message { topic, payload } => {
                self.observers
                    .message(&topic, &String::from_utf8_lossy(&payload));
            }
            ServiceEvent::Chunk(bytes) => self.ingest(&bytes),
        }
    }

    /// Deframe one raw chunk and deliver every message it completes.
    ///
    /// Control packets are skipped. A decode fault reaches the error
    /// observer after the messages decoded ahead of it.
    pub fn ingest(&mut self, chunk: &[u8]) {
        let (frames, fault) = self.deframer.ingest(chunk).into_parts();
        for frame in frames {
            let kind = frame.kind();
            match frame.into_message() {
                Some(message) => self.observers.message(message.topic(), &message.payload_text()),
                None => trace!(kind, "skipping control packet"),
            }
        }
        if let Some(fault) = fault {
            self.observers.error(&ClientError::Decode(fault));
        }
    }

    fn teardown(&mut self) {
        let topics = self.subscriptions.clear();
        let things = self.things.on_close(&mut self.service);
        self.deframer.reset();
        debug!(topics, things, "connection closed, session state cleared");
    }
}

impl<S, D> Connection<S, D>
where
    D: FrameDecoder,
{
    /// Transport handle.
    pub fn service(&self) -> &S { &self.service }

    /// Mutable transport handle.
    ///
    /// Requests issued directly bypass the registries.
    pub fn service_mut(&mut self) -> &mut S { &mut self.service }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.config }

    /// Device or shadow mode.
    #[must_use]
    pub fn mode(&self) -> ClientMode { self.things.mode() }

    /// Observer table shared with request completions.
    #[must_use]
    pub fn observers(&self) -> &Arc<Observers> { &self.observers }

    /// Active subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionRegistry { &self.subscriptions }

    /// Registered things.
    #[must_use]
    pub fn things(&self) -> &ThingSessionRegistry { &self.things }

    /// Whether `topic` is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, topic: &str) -> bool { self.subscriptions.contains(topic) }

    /// Whether `thing` is registered.
    #[must_use]
    pub fn is_registered(&self, thing: &str) -> bool { self.things.contains(thing) }

    /// Bytes waiting in the deframer for a frame to complete.
    #[must_use]
    pub fn residual_len(&self) -> usize { self.deframer.residual_len() }

    /// Wrap the connection for sharing with an event pump.
    #[must_use]
    pub fn into_shared(self) -> SharedConnection<S, D> { Arc::new(Mutex::new(self)) }
}

fn subscription_completion(observers: Arc<Observers>) -> Completion<Vec<Grant>> {
    Box::new(move |result: Result<Vec<Grant>, BrokerError>| match result {
        Ok(granted) => observers.subscription(&granted),
        Err(error) => {
            warn!(%error, "subscription failed");
            observers.error(&ClientError::Broker(error));
        }
    })
}

fn registration_completion(observers: Arc<Observers>, thing: String) -> Completion<()> {
    Box::new(move |result: Result<(), BrokerError>| match result {
        Ok(()) => {
            debug!(%thing, "thing registered");
            observers.thing_connected(&thing);
        }
        Err(error) => {
            warn!(%thing, %error, "thing registration failed");
            observers.error(&ClientError::Broker(error));
        }
    })
}
