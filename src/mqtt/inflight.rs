//! Bookkeeping shared between [`MqttTransport`](super::MqttTransport) and
//! [`MqttDriver`](super::MqttDriver).
//!
//! Subscribe acknowledgements are matched in two steps. A waiter is queued
//! when the request is handed to the client; the event loop reports outgoing
//! SUBSCRIBE packets in request order, binding the oldest queued waiter to
//! the packet id; the SUBACK for that id resolves it.
//!
//! Callbacks never run while the state lock is held.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use tracing::warn;

use super::shadow::ShadowOp;
use crate::{
    correlation::ClientToken,
    message::QoS,
    service::{BrokerError, Completion, Grant},
    session::RegisterOptions,
};

/// Completion waiting for a SUBACK.
pub(crate) enum AckWaiter {
    /// Plain topic subscription.
    Subscribe {
        topic: String,
        done: Completion<Vec<Grant>>,
    },
    /// Shadow topics of a thing registration.
    Register { thing: String, done: Completion<()> },
    /// Answer topics subscribed for one non-persistent request.
    Transient { thing: String },
}

impl AckWaiter {
    /// Resolve with the SUBACK return codes; `None` marks a refused filter.
    pub(crate) fn resolve(self, codes: &[Option<QoS>]) {
        let refused = codes.iter().any(Option::is_none);
        match self {
            Self::Subscribe { topic, done } => {
                if refused {
                    done(Err(BrokerError::SubscriptionRejected { topic }));
                } else {
                    let qos = codes.iter().flatten().copied().next().unwrap_or_default();
                    done(Ok(vec![Grant { topic, qos }]));
                }
            }
            Self::Register { thing, done } => {
                if refused {
                    done(Err(BrokerError::RegistrationRejected { thing }));
                } else {
                    done(Ok(()));
                }
            }
            Self::Transient { thing } => {
                if refused {
                    warn!(%thing, "broker refused shadow answer topics");
                }
            }
        }
    }

    /// Fail without an answer from the broker.
    pub(crate) fn fail(self, error: BrokerError) {
        match self {
            Self::Subscribe { done, .. } => done(Err(error)),
            Self::Register { done, .. } => done(Err(error)),
            Self::Transient { .. } => {}
        }
    }
}

/// A shadow request awaiting its answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PendingOperation {
    pub(crate) thing: String,
    pub(crate) op: ShadowOp,
    pub(crate) deadline: Instant,
    /// Answer topics were subscribed for this request alone.
    pub(crate) transient: bool,
}

/// Per-thing registration state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ThingState {
    pub(crate) persistent: bool,
    pub(crate) discard_stale: bool,
    pub(crate) versioning: bool,
    pub(crate) version: Option<u64>,
}

#[derive(Default)]
struct State {
    queued: VecDeque<AckWaiter>,
    sent: HashMap<u16, AckWaiter>,
    operations: HashMap<ClientToken, PendingOperation>,
    things: HashMap<String, ThingState>,
}

/// Shared request bookkeeping.
#[derive(Default)]
pub(crate) struct Inflight {
    state: Mutex<State>,
}

impl std::fmt::Debug for Inflight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Inflight")
            .field("queued", &state.queued.len())
            .field("sent", &state.sent.len())
            .field("operations", &state.operations.len())
            .field("things", &state.things.len())
            .finish()
    }
}

impl Inflight {
    fn lock(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Queue a waiter for the next SUBSCRIBE handed to the client.
    pub(crate) fn queue(&self, waiter: AckWaiter) { self.lock().queued.push_back(waiter); }

    /// Withdraw the most recently queued waiter after the client refused
    /// the request.
    pub(crate) fn unqueue_last(&self) -> Option<AckWaiter> { self.lock().queued.pop_back() }

    /// Bind the oldest queued waiter to an outgoing SUBSCRIBE.
    ///
    /// Returns `false` when nothing was queued, which happens for requests
    /// replayed by the client after a reconnect.
    pub(crate) fn bind(&self, packet_id: u16) -> bool {
        let mut state = self.lock();
        match state.queued.pop_front() {
            Some(waiter) => {
                state.sent.insert(packet_id, waiter);
                true
            }
            None => false,
        }
    }

    /// Take the waiter bound to `packet_id`.
    pub(crate) fn take_ack(&self, packet_id: u16) -> Option<AckWaiter> { self.lock().sent.remove(&packet_id) }

    /// Take every waiter, bound or not.
    pub(crate) fn drain_waiters(&self) -> Vec<AckWaiter> {
        let mut state = self.lock();
        let mut waiters: Vec<_> = state.sent.drain().map(|(_, waiter)| waiter).collect();
        waiters.extend(state.queued.drain(..));
        waiters
    }

    /// Track a shadow request until it is answered or expires.
    pub(crate) fn track_operation(&self, token: ClientToken, operation: PendingOperation) {
        self.lock().operations.insert(token, operation);
    }

    /// Stop tracking the request identified by `token`.
    pub(crate) fn complete_operation(&self, token: &ClientToken) -> Option<PendingOperation> {
        self.lock().operations.remove(token)
    }

    /// Remove and return every request whose deadline is at or before `now`,
    /// oldest first.
    pub(crate) fn expire(&self, now: Instant) -> Vec<(ClientToken, PendingOperation)> {
        let mut state = self.lock();
        let expired: Vec<ClientToken> = state
            .operations
            .iter()
            .filter(|(_, operation)| operation.deadline <= now)
            .map(|(token, _)| token.clone())
            .collect();
        let mut removed: Vec<_> = expired
            .into_iter()
            .filter_map(|token| state.operations.remove(&token).map(|op| (token, op)))
            .collect();
        removed.sort_by_key(|(_, operation)| operation.deadline);
        removed
    }

    /// Release the answer topics of `token` once it is answered.
    pub(crate) fn mark_transient(&self, token: &ClientToken) {
        if let Some(operation) = self.lock().operations.get_mut(token) {
            operation.transient = true;
        }
    }

    /// Earliest deadline among tracked requests.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.lock().operations.values().map(|operation| operation.deadline).min()
    }

    /// Number of tracked requests.
    pub(crate) fn pending_operations(&self) -> usize { self.lock().operations.len() }

    /// Record a registered thing.
    pub(crate) fn register_thing(&self, thing: &str, options: &RegisterOptions) {
        self.lock().things.insert(
            thing.to_owned(),
            ThingState {
                persistent: options.persistent_subscribe,
                discard_stale: options.discard_stale,
                versioning: options.enable_versioning,
                version: None,
            },
        );
    }

    /// Forget a registered thing.
    pub(crate) fn forget_thing(&self, thing: &str) -> Option<ThingState> { self.lock().things.remove(thing) }

    /// Registration state of `thing`.
    pub(crate) fn thing(&self, thing: &str) -> Option<ThingState> { self.lock().things.get(thing).copied() }

    /// Record the version of a document received for `thing`.
    ///
    /// Returns `false` when the document is older than the last one seen and
    /// the thing discards stale documents.
    pub(crate) fn observe_version(&self, thing: &str, version: u64) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.things.get_mut(thing) else {
            return true;
        };
        if entry.discard_stale && entry.version.is_some_and(|seen| version < seen) {
            return false;
        }
        entry.version = Some(entry.version.map_or(version, |seen| seen.max(version)));
        true
    }
}
