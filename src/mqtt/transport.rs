//! [`Service`] implementation over a `rumqttc` client.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use rumqttc::{AsyncClient, SubscribeFilter};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    inflight::{AckWaiter, Inflight, PendingOperation},
    shadow::{self, ShadowOp},
    to_rumqttc_qos,
};
use crate::{
    correlation::{ClientToken, ClientTokenGenerator},
    message::QoS,
    service::{BrokerError, Completion, Grant, Service},
    session::{RegisterOptions, is_valid_thing_name},
    subscription::SubscribeOptions,
};

/// QoS used for shadow topics.
const SHADOW_QOS: QoS = QoS::AtLeastOnce;

/// Broker requests issued through a `rumqttc` client.
///
/// Every request is queued without waiting; a full request queue surfaces as
/// [`BrokerError::RequestFailed`] through the request's completion.
pub struct MqttTransport {
    client: AsyncClient,
    inflight: Arc<Inflight>,
    tokens: ClientTokenGenerator,
    operation_timeout: Duration,
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("inflight", &self.inflight)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl MqttTransport {
    pub(crate) fn new(
        client: AsyncClient,
        inflight: Arc<Inflight>,
        client_id: &str,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            client,
            inflight,
            tokens: ClientTokenGenerator::new(client_id),
            operation_timeout,
        }
    }

    /// Underlying client handle.
    #[must_use]
    pub fn client(&self) -> &AsyncClient { &self.client }

    /// Ask the broker to end the session.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::RequestFailed`] when the request queue is full
    /// or the event loop has stopped.
    pub fn disconnect(&self) -> Result<(), BrokerError> {
        self.client.try_disconnect().map_err(request_failed)
    }

    fn subscribe_all(&self, topics: Vec<String>, waiter: AckWaiter) -> Result<(), (AckWaiter, BrokerError)> {
        let filters = topics
            .into_iter()
            .map(|topic| SubscribeFilter::new(topic, to_rumqttc_qos(SHADOW_QOS)));
        self.inflight.queue(waiter);
        match self.client.try_subscribe_many(filters) {
            Ok(()) => Ok(()),
            Err(error) => match self.inflight.unqueue_last() {
                Some(waiter) => Err((waiter, request_failed(error))),
                None => {
                    warn!(%error, "subscribe failed after its waiter was bound");
                    Ok(())
                }
            },
        }
    }

    fn unsubscribe_all(&self, topics: impl IntoIterator<Item = String>) {
        for topic in topics {
            if let Err(error) = self.client.try_unsubscribe(topic.clone()) {
                debug!(%topic, %error, "could not queue unsubscribe");
            }
        }
    }

    fn request(&mut self, thing: &str, op: ShadowOp, state: Option<&Value>) -> Option<ClientToken> {
        if !is_valid_thing_name(thing) {
            warn!(thing, op = op.as_str(), "thing name cannot be used in a shadow topic");
            return None;
        }
        let registered = self.inflight.thing(thing);
        let version = registered
            .filter(|entry| entry.versioning && op == ShadowOp::Update)
            .and_then(|entry| entry.version);
        let token = self.tokens.next_token();
        let body = match shadow::request_body(&token, state, version) {
            Ok(body) => body,
            Err(error) => {
                warn!(thing, op = op.as_str(), %error, "invalid shadow request");
                return None;
            }
        };

        let transient = !registered.is_some_and(|entry| entry.persistent);
        if transient {
            let topics = shadow::operation_topics(thing, op).to_vec();
            let waiter = AckWaiter::Transient {
                thing: thing.to_owned(),
            };
            if let Err((_, error)) = self.subscribe_all(topics, waiter) {
                warn!(thing, op = op.as_str(), %error, "could not subscribe to shadow answers");
                return None;
            }
        }

        let topic = shadow::request_topic(thing, op);
        if let Err(error) = self
            .client
            .try_publish(topic, to_rumqttc_qos(SHADOW_QOS), false, body)
        {
            warn!(thing, op = op.as_str(), %error, "could not queue shadow request");
            if transient {
                self.unsubscribe_all(shadow::operation_topics(thing, op));
            }
            return None;
        }

        self.inflight.track_operation(
            token.clone(),
            PendingOperation {
                thing: thing.to_owned(),
                op,
                deadline: Instant::now().into_std() + self.operation_timeout,
                transient,
            },
        );
        debug!(thing, op = op.as_str(), %token, "shadow request queued");
        Some(token)
    }
}

fn request_failed(error: rumqttc::ClientError) -> BrokerError {
    BrokerError::RequestFailed {
        reason: error.to_string(),
    }
}

impl Service for MqttTransport {
    fn subscribe(&mut self, topic: &str, options: &SubscribeOptions, done: Completion<Vec<Grant>>) {
        let filter = SubscribeFilter::new(topic.to_owned(), to_rumqttc_qos(options.qos));
        self.inflight.queue(AckWaiter::Subscribe {
            topic: topic.to_owned(),
            done,
        });
        if let Err(error) = self.client.try_subscribe_many([filter]) {
            if let Some(waiter) = self.inflight.unqueue_last() {
                waiter.fail(request_failed(error));
            }
        }
    }

    fn unsubscribe(&mut self, topic: &str) { self.unsubscribe_all([topic.to_owned()]); }

    fn publish(&mut self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), BrokerError> {
        self.client
            .try_publish(topic, to_rumqttc_qos(qos), false, payload.to_vec())
            .map_err(request_failed)
    }

    fn register(&mut self, thing: &str, options: &RegisterOptions, done: Completion<()>) {
        self.inflight.register_thing(thing, options);
        let topics = shadow::registration_topics(thing, options.persistent_subscribe);
        let waiter = AckWaiter::Register {
            thing: thing.to_owned(),
            done,
        };
        if let Err((waiter, error)) = self.subscribe_all(topics, waiter) {
            self.inflight.forget_thing(thing);
            waiter.fail(error);
        }
    }

    fn unregister(&mut self, thing: &str) {
        let persistent = self
            .inflight
            .forget_thing(thing)
            .is_none_or(|entry| entry.persistent);
        self.unsubscribe_all(shadow::registration_topics(thing, persistent));
    }

    fn get(&mut self, thing: &str) -> Option<ClientToken> { self.request(thing, ShadowOp::Get, None) }

    fn update(&mut self, thing: &str, state: &Value) -> Option<ClientToken> {
        self.request(thing, ShadowOp::Update, Some(state))
    }

    fn delete(&mut self, thing: &str) -> Option<ClientToken> {
        let token = self.request(thing, ShadowOp::Delete, None);
        if let Some(entry) = self.inflight.forget_thing(thing) {
            let mut topics = shadow::registration_topics(thing, entry.persistent);
            if let Some(token) = token.as_ref().filter(|_| entry.persistent) {
                // The delete answer topics are released once it is answered.
                let answers = shadow::operation_topics(thing, ShadowOp::Delete);
                topics.retain(|topic| !answers.contains(topic));
                self.inflight.mark_transient(token);
            }
            self.unsubscribe_all(topics);
        }
        token
    }
}
