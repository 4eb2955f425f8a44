//! Observer slots for connection events.
//!
//! [`Observers`] is a registration table of optional callbacks, one per event
//! kind. It is built fluently, frozen behind an [`Arc`] when the connection is
//! built, and shared with request completions so broker answers can reach the
//! observers without touching the connection.
//!
//! Observers run on whichever context delivers their event. Dispatched events
//! run them on the dispatching thread, with the
//! [`SharedConnection`](super::SharedConnection) lock held. Completions run
//! them wherever the transport resolves the request; under `MqttTransport`
//! that is the event loop task, so `on_subscription`, `on_thing_connected`
//! and broker errors passed to `on_error` may run concurrently with dispatch.
//! Handlers are therefore `Send + Sync` and must never lock the connection;
//! hand work to another task instead.

use std::{fmt, sync::Arc};

use serde_json::Value;

use super::ClientError;
use crate::{
    correlation::ClientToken,
    service::{Grant, ShadowStatus},
};

/// Callback taking no arguments.
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Callback receiving an error.
pub type ErrorHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Callback receiving the thing and token of a timed out request.
pub type TimeoutHandler = Arc<dyn Fn(&str, &ClientToken) + Send + Sync>;

/// Callback receiving a thing and its shadow delta document.
pub type DeltaHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Callback receiving the outcome of a shadow request.
pub type StatusHandler = Arc<dyn Fn(&str, ShadowStatus, &ClientToken, &Value) + Send + Sync>;

/// Callback receiving an inbound message as topic and lossy UTF-8 text.
pub type MessageHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Callback receiving the name of a thing whose session is usable.
pub type ThingHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback receiving the levels granted for a subscription.
pub type SubscriptionHandler = Arc<dyn Fn(&[Grant]) + Send + Sync>;

/// Optional observers for every connection event.
///
/// # Examples
///
/// ```
/// use thingwire::client::Observers;
///
/// let observers = Observers::new()
///     .on_connect(|| println!("connected"))
///     .on_message(|topic, text| println!("{topic}: {text}"));
/// assert!(observers.has_message_observer());
/// ```
#[derive(Clone, Default)]
#[expect(
    clippy::struct_field_names,
    reason = "on_ prefix is idiomatic for callback fields"
)]
pub struct Observers {
    on_connect: Option<EventHandler>,
    on_timeout: Option<TimeoutHandler>,
    on_reconnect: Option<EventHandler>,
    on_error: Option<ErrorHandler>,
    on_delta: Option<DeltaHandler>,
    on_status: Option<StatusHandler>,
    on_close: Option<EventHandler>,
    on_offline: Option<EventHandler>,
    on_message: Option<MessageHandler>,
    on_thing_connected: Option<ThingHandler>,
    on_subscription: Option<SubscriptionHandler>,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_reconnect", &self.on_reconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_delta", &self.on_delta.is_some())
            .field("on_status", &self.on_status.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_offline", &self.on_offline.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_thing_connected", &self.on_thing_connected.is_some())
            .field("on_subscription", &self.on_subscription.is_some())
            .finish()
    }
}

macro_rules! observer_setter {
    ($(#[$docs:meta])* $name:ident, $handler:ty, ($($arg:ident: $ty:ty),*)) => {
        $(#[$docs])*
        #[must_use]
        pub fn $name<F>(mut self, f: F) -> Self
        where
            F: Fn($($ty),*) + Send + Sync + 'static,
        {
            let handler: $handler = Arc::new(move |$($arg: $ty),*| f($($arg),*));
            self.$name = Some(handler);
            self
        }
    };
}

impl Observers {
    /// Create a table with every slot empty.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    observer_setter!(
        /// Observe successful connections.
        on_connect, EventHandler, ()
    );
    observer_setter!(
        /// Observe shadow requests that received no answer.
        on_timeout, TimeoutHandler, (thing: &str, token: &ClientToken)
    );
    observer_setter!(
        /// Observe reconnection attempts.
        on_reconnect, EventHandler, ()
    );
    observer_setter!(
        /// Observe transport, broker and decode errors.
        on_error, ErrorHandler, (error: &ClientError)
    );
    observer_setter!(
        /// Observe shadow deltas.
        on_delta, DeltaHandler, (thing: &str, state: &Value)
    );
    observer_setter!(
        /// Observe answers to shadow requests.
        on_status, StatusHandler,
        (thing: &str, status: ShadowStatus, token: &ClientToken, state: &Value)
    );
    observer_setter!(
        /// Observe connection close.
        on_close, EventHandler, ()
    );
    observer_setter!(
        /// Observe the transport going offline.
        on_offline, EventHandler, ()
    );
    observer_setter!(
        /// Observe inbound messages as `(topic, text)`.
        on_message, MessageHandler, (topic: &str, text: &str)
    );
    observer_setter!(
        /// Observe things whose shadow session became usable.
        on_thing_connected, ThingHandler, (thing: &str)
    );
    observer_setter!(
        /// Observe levels granted for subscriptions.
        on_subscription, SubscriptionHandler, (granted: &[Grant])
    );

    /// Whether a message observer is installed.
    #[must_use]
    pub fn has_message_observer(&self) -> bool { self.on_message.is_some() }

    pub(crate) fn connected(&self) {
        if let Some(f) = &self.on_connect {
            f();
        }
    }

    pub(crate) fn timed_out(&self, thing: &str, token: &ClientToken) {
        if let Some(f) = &self.on_timeout {
            f(thing, token);
        }
    }

    pub(crate) fn reconnecting(&self) {
        if let Some(f) = &self.on_reconnect {
            f();
        }
    }

    pub(crate) fn error(&self, error: &ClientError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }

    pub(crate) fn delta(&self, thing: &str, state: &Value) {
        if let Some(f) = &self.on_delta {
            f(thing, state);
        }
    }

    pub(crate) fn status(&self, thing: &str, status: ShadowStatus, token: &ClientToken, state: &Value) {
        if let Some(f) = &self.on_status {
            f(thing, status, token, state);
        }
    }

    pub(crate) fn closed(&self) {
        if let Some(f) = &self.on_close {
            f();
        }
    }

    pub(crate) fn offline(&self) {
        if let Some(f) = &self.on_offline {
            f();
        }
    }

    pub(crate) fn message(&self, topic: &str, text: &str) {
        if let Some(f) = &self.on_message {
            f(topic, text);
        }
    }

    pub(crate) fn thing_connected(&self, thing: &str) {
        if let Some(f) = &self.on_thing_connected {
            f(thing);
        }
    }

    pub(crate) fn subscription(&self, granted: &[Grant]) {
        if let Some(f) = &self.on_subscription {
            f(granted);
        }
    }
}
