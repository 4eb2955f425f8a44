//! The transport seam: requests out, events in.
//!
//! A [`Service`] is the handle onto one broker connection. Every request is
//! fire-and-forget; outcomes arrive later either through a [`Completion`]
//! or as a [`ServiceEvent`] fed into
//! [`Connection::dispatch`](crate::client::Connection::dispatch).
//!
//! Completions may be invoked synchronously from inside the request call or
//! later from another task. They capture only observer handles, never the
//! connection itself.

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::{
    correlation::ClientToken,
    message::QoS,
    session::RegisterOptions,
    subscription::SubscribeOptions,
};

/// One-shot callback receiving the outcome of a request.
pub type Completion<T> = Box<dyn FnOnce(Result<T, BrokerError>) + Send + 'static>;

/// Errors reported by the broker or the transport for a single request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker refused a subscription.
    #[error("broker rejected subscription to {topic}")]
    SubscriptionRejected {
        /// Rejected topic filter.
        topic: String,
    },
    /// The broker refused one of a thing's shadow subscriptions.
    #[error("broker rejected registration of thing {thing}")]
    RegistrationRejected {
        /// Thing being registered.
        thing: String,
    },
    /// The request could not be queued on the transport.
    #[error("request could not be queued: {reason}")]
    RequestFailed {
        /// Transport-provided reason.
        reason: String,
    },
    /// The connection closed before the broker answered.
    #[error("connection closed before the broker answered")]
    Disconnected,
}

/// QoS the broker granted for one topic filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    /// Topic filter.
    pub topic: String,
    /// Granted level.
    pub qos: QoS,
}

/// Outcome of a shadow request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowStatus {
    /// The request was applied.
    Accepted,
    /// The request was refused.
    Rejected,
}

impl ShadowStatus {
    /// Topic suffix used by the shadow protocol.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

/// Lifecycle and data events produced by a transport.
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceEvent {
    /// The broker accepted the connection.
    Connect,
    /// The transport is about to retry after losing the connection.
    Reconnect,
    /// The connection closed.
    Close,
    /// The transport went offline.
    Offline,
    /// A shadow request received no answer in time.
    Timeout {
        /// Thing the request targeted.
        thing: String,
        /// Token returned when the request was made.
        token: ClientToken,
    },
    /// The transport reported an error.
    Error {
        /// Transport-provided description.
        reason: String,
    },
    /// The desired and reported shadow states diverged.
    Delta {
        /// Thing whose shadow changed.
        thing: String,
        /// Delta document.
        state: Value,
    },
    /// A shadow request was answered.
    Status {
        /// Thing the request targeted.
        thing: String,
        /// Accepted or rejected.
        status: ShadowStatus,
        /// Token of the answered request.
        token: ClientToken,
        /// Response document.
        state: Value,
    },
    /// An already-decoded application message.
    Message {
        /// Topic it arrived on.
        topic: String,
        /// Payload bytes.
        payload: Bytes,
    },
    /// Raw protocol bytes that still need deframing.
    Chunk(Bytes),
}

impl ServiceEvent {
    /// Short event name for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Reconnect => "reconnect",
            Self::Close => "close",
            Self::Offline => "offline",
            Self::Timeout { .. } => "timeout",
            Self::Error { .. } => "error",
            Self::Delta { .. } => "delta",
            Self::Status { .. } => "status",
            Self::Message { .. } => "message",
            Self::Chunk(_) => "chunk",
        }
    }
}

/// Request interface of one broker connection.
pub trait Service {
    /// Subscribe to `topic`; `done` receives the granted levels.
    fn subscribe(&mut self, topic: &str, options: &SubscribeOptions, done: Completion<Vec<Grant>>);

    /// Remove a subscription.
    fn unsubscribe(&mut self, topic: &str);

    /// Publish `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::RequestFailed`] when the request cannot be queued.
    fn publish(&mut self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), BrokerError>;

    /// Register a thing's shadow session; `done` fires once it is usable.
    fn register(&mut self, thing: &str, options: &RegisterOptions, done: Completion<()>);

    /// Tear down a thing's shadow session.
    fn unregister(&mut self, thing: &str);

    /// Request the current shadow document.
    fn get(&mut self, thing: &str) -> Option<ClientToken>;

    /// Request a shadow update with `state`.
    fn update(&mut self, thing: &str, state: &Value) -> Option<ClientToken>;

    /// Request deletion of the shadow document.
    fn delete(&mut self, thing: &str) -> Option<ClientToken>;
}

impl<S: Service + ?Sized> Service for Box<S> {
    fn subscribe(&mut self, topic: &str, options: &SubscribeOptions, done: Completion<Vec<Grant>>) {
        (**self).subscribe(topic, options, done);
    }

    fn unsubscribe(&mut self, topic: &str) { (**self).unsubscribe(topic); }

    fn publish(&mut self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), BrokerError> {
        (**self).publish(topic, payload, qos)
    }

    fn register(&mut self, thing: &str, options: &RegisterOptions, done: Completion<()>) {
        (**self).register(thing, options, done);
    }

    fn unregister(&mut self, thing: &str) { (**self).unregister(thing); }

    fn get(&mut self, thing: &str) -> Option<ClientToken> { (**self).get(thing) }

    fn update(&mut self, thing: &str, state: &Value) -> Option<ClientToken> {
        (**self).update(thing, state)
    }

    fn delete(&mut self, thing: &str) -> Option<ClientToken> { (**self).delete(thing) }
}
