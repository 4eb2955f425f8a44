#![cfg(any(test, feature = "test-helpers"))]
//! Test-only helpers for shared test utilities.

use std::collections::VecDeque;

use bytes::Bytes;
use serde_json::Value;

use crate::{
    correlation::{ClientToken, ClientTokenGenerator},
    message::QoS,
    service::{BrokerError, Completion, Grant, Service},
    session::RegisterOptions,
    subscription::SubscribeOptions,
};

/// A request observed by [`RecordingService`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    /// `subscribe(topic, options)`.
    Subscribe { topic: String, options: SubscribeOptions },
    /// `unsubscribe(topic)`.
    Unsubscribe { topic: String },
    /// `publish(topic, payload, qos)`.
    Publish { topic: String, payload: Bytes, qos: QoS },
    /// `register(thing, options)`.
    Register { thing: String, options: RegisterOptions },
    /// `unregister(thing)`.
    Unregister { thing: String },
    /// `get(thing)`.
    Get { thing: String },
    /// `update(thing, state)`.
    Update { thing: String, state: Value },
    /// `delete(thing)`.
    Delete { thing: String },
}

/// [`Service`] that records every request and holds completions until the
/// test resolves them.
pub struct RecordingService {
    calls: Vec<Call>,
    subscriptions: VecDeque<(String, QoS, Completion<Vec<Grant>>)>,
    registrations: VecDeque<(String, Completion<()>)>,
    tokens: ClientTokenGenerator,
    publish_error: Option<BrokerError>,
}

impl Default for RecordingService {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for RecordingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingService")
            .field("calls", &self.calls)
            .field("pending_subscriptions", &self.subscriptions.len())
            .field("pending_registrations", &self.registrations.len())
            .finish_non_exhaustive()
    }
}

impl RecordingService {
    /// Create a service issuing `test-<n>` tokens.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            subscriptions: VecDeque::new(),
            registrations: VecDeque::new(),
            tokens: ClientTokenGenerator::new("test"),
            publish_error: None,
        }
    }

    /// Make every later publish fail with `error`.
    #[must_use]
    pub fn with_publish_error(mut self, error: BrokerError) -> Self {
        self.publish_error = Some(error);
        self
    }

    /// Every request seen so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> &[Call] { &self.calls }

    /// Number of recorded requests matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    /// Forget recorded requests; pending completions are kept.
    pub fn clear_calls(&mut self) { self.calls.clear(); }

    /// Number of subscribe completions not yet resolved.
    #[must_use]
    pub fn pending_subscriptions(&self) -> usize { self.subscriptions.len() }

    /// Number of register completions not yet resolved.
    #[must_use]
    pub fn pending_registrations(&self) -> usize { self.registrations.len() }

    /// Grant the oldest pending subscription at its requested QoS.
    ///
    /// Returns the topic, or `None` when nothing is pending.
    pub fn grant_next_subscription(&mut self) -> Option<String> {
        let (topic, qos, done) = self.subscriptions.pop_front()?;
        done(Ok(vec![Grant {
            topic: topic.clone(),
            qos,
        }]));
        Some(topic)
    }

    /// Reject the oldest pending subscription.
    pub fn reject_next_subscription(&mut self) -> Option<String> {
        let (topic, _, done) = self.subscriptions.pop_front()?;
        done(Err(BrokerError::SubscriptionRejected {
            topic: topic.clone(),
        }));
        Some(topic)
    }

    /// Resolve the oldest pending registration with `result`.
    pub fn complete_next_registration(&mut self, result: Result<(), BrokerError>) -> Option<String> {
        let (thing, done) = self.registrations.pop_front()?;
        done(result);
        Some(thing)
    }
}

impl Service for RecordingService {
    fn subscribe(&mut self, topic: &str, options: &SubscribeOptions, done: Completion<Vec<Grant>>) {
        self.calls.push(Call::Subscribe {
            topic: topic.to_owned(),
            options: options.clone(),
        });
        self.subscriptions.push_back((topic.to_owned(), options.qos, done));
    }

    fn unsubscribe(&mut self, topic: &str) {
        self.calls.push(Call::Unsubscribe {
            topic: topic.to_owned(),
        });
    }

    fn publish(&mut self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), BrokerError> {
        self.calls.push(Call::Publish {
            topic: topic.to_owned(),
            payload,
            qos,
        });
        match &self.publish_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn register(&mut self, thing: &str, options: &RegisterOptions, done: Completion<()>) {
        self.calls.push(Call::Register {
            thing: thing.to_owned(),
            options: options.clone(),
        });
        self.registrations.push_back((thing.to_owned(), done));
    }

    fn unregister(&mut self, thing: &str) {
        self.calls.push(Call::Unregister {
            thing: thing.to_owned(),
        });
    }

    fn get(&mut self, thing: &str) -> Option<ClientToken> {
        self.calls.push(Call::Get {
            thing: thing.to_owned(),
        });
        Some(self.tokens.next_token())
    }

    fn update(&mut self, thing: &str, state: &Value) -> Option<ClientToken> {
        self.calls.push(Call::Update {
            thing: thing.to_owned(),
            state: state.clone(),
        });
        Some(self.tokens.next_token())
    }

    fn delete(&mut self, thing: &str) -> Option<ClientToken> {
        self.calls.push(Call::Delete {
            thing: thing.to_owned(),
        });
        Some(self.tokens.next_token())
    }
}
