//! Topic subscriptions for one connection.
//!
//! [`SubscriptionRegistry`] guarantees at most one subscribe request per
//! topic while the connection lives. Stored options are shared immutably, so
//! nothing can change them after the request went out.
//!
//! A subscription the broker rejects keeps its entry. Retrying requires an
//! explicit [`unsubscribe`](SubscriptionRegistry::unsubscribe) first.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    message::QoS,
    service::{Completion, Grant, Service},
};

/// Options attached to a subscription.
///
/// Defaults to QoS 1 with no extra options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// Requested delivery level.
    #[serde(default)]
    pub qos: QoS,
    /// Transport-specific options passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubscribeOptions {
    /// Request a specific QoS level.
    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Attach an extra transport option.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Owned map of active subscriptions keyed by topic.
///
/// Single writer: every mutating call takes `&mut self`.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: BTreeMap<String, Arc<SubscribeOptions>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Subscribe to every topic not already present.
    ///
    /// `completion` builds the callback for each new topic. Returns the
    /// topics for which a request was issued, in input order.
    pub fn subscribe<S, I, T, F>(
        &mut self,
        service: &mut S,
        topics: I,
        options: Option<SubscribeOptions>,
        mut completion: F,
    ) -> Vec<String>
    where
        S: Service + ?Sized,
        I: IntoIterator<Item = T>,
        T: Into<String>,
        F: FnMut(&str) -> Completion<Vec<Grant>>,
    {
        let options = Arc::new(options.unwrap_or_default());
        let mut requested = Vec::new();
        for topic in topics {
            let topic = topic.into();
            if self.topics.contains_key(&topic) {
                debug!(%topic, "already subscribed to topic");
                continue;
            }
            self.topics.insert(topic.clone(), Arc::clone(&options));
            service.subscribe(&topic, &options, completion(&topic));
            requested.push(topic);
        }
        requested
    }

    /// Drop `topic` and issue the underlying unsubscribe.
    ///
    /// Returns `false` without any request when the topic was not subscribed.
    pub fn unsubscribe<S: Service + ?Sized>(&mut self, service: &mut S, topic: &str) -> bool {
        if self.topics.remove(topic).is_none() {
            return false;
        }
        service.unsubscribe(topic);
        true
    }

    /// Forget every subscription without issuing requests.
    ///
    /// Used when the connection closes; the broker drops the subscriptions
    /// with the session.
    pub fn clear(&mut self) -> usize {
        let count = self.topics.len();
        self.topics.clear();
        count
    }

    /// Whether `topic` is subscribed.
    #[must_use]
    pub fn contains(&self, topic: &str) -> bool { self.topics.contains_key(topic) }

    /// Options stored for `topic`.
    #[must_use]
    pub fn options(&self, topic: &str) -> Option<&SubscribeOptions> {
        self.topics.get(topic).map(AsRef::as_ref)
    }

    /// Subscribed topics in lexical order.
    pub fn topics(&self) -> impl Iterator<Item = &str> { self.topics.keys().map(String::as_str) }

    /// Number of subscribed topics.
    #[must_use]
    pub fn len(&self) -> usize { self.topics.len() }

    /// Whether no topic is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.topics.is_empty() }
}
