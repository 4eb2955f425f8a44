//! Thing shadow sessions for one connection.
//!
//! [`ThingSessionRegistry`] tracks which things have a registered shadow
//! session, so registration is requested once per name and every session is
//! torn down exactly once when the connection closes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    config::ClientMode,
    correlation::ClientToken,
    metrics,
    service::{Completion, Service},
};

/// Longest thing name the shadow service accepts.
pub const MAX_THING_NAME_LEN: usize = 128;

/// Options attached to a thing registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOptions {
    /// Keep the shadow response topics subscribed for the session lifetime.
    #[serde(default = "default_persistent_subscribe")]
    pub persistent_subscribe: bool,
    /// Drop shadow documents older than the last one seen.
    #[serde(default)]
    pub discard_stale: bool,
    /// Attach the last seen version to updates.
    #[serde(default)]
    pub enable_versioning: bool,
    /// Transport-specific options passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_persistent_subscribe() -> bool { true }

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            persistent_subscribe: true,
            discard_stale: false,
            enable_versioning: false,
            extra: Map::new(),
        }
    }
}

impl RegisterOptions {
    /// Set whether response topics stay subscribed.
    #[must_use]
    pub fn with_persistent_subscribe(mut self, persistent: bool) -> Self {
        self.persistent_subscribe = persistent;
        self
    }

    /// Set whether stale documents are discarded.
    #[must_use]
    pub fn with_discard_stale(mut self, discard: bool) -> Self {
        self.discard_stale = discard;
        self
    }

    /// Set whether updates carry a version.
    #[must_use]
    pub fn with_versioning(mut self, enabled: bool) -> Self {
        self.enable_versioning = enabled;
        self
    }

    /// Attach an extra transport option.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Behaviour of [`ThingSessionRegistry::add_thing`] for a name that is
/// already registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateRegistration {
    /// Do nothing.
    Ignore,
    /// Report the thing as connected again without a network call.
    #[default]
    Renotify,
}

/// Outcome of [`ThingSessionRegistry::add_thing`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum Registration {
    /// A register request was issued.
    Registered,
    /// Already registered; the caller should re-notify observers.
    Renotify,
    /// Already registered; nothing to do.
    AlreadyRegistered,
    /// Things are not available in device mode.
    Unsupported,
    /// The name cannot be used as a thing name.
    Invalid,
}

/// Whether `name` is usable as a thing name.
///
/// Thing names are non-empty, at most [`MAX_THING_NAME_LEN`] bytes and may
/// contain only ASCII alphanumerics, `:`, `_` and `-`. This rules out the
/// topic separators and wildcards that would corrupt shadow topics.
///
/// # Examples
///
/// ```
/// use thingwire::session::is_valid_thing_name;
///
/// assert!(is_valid_thing_name("lamp-01"));
/// assert!(!is_valid_thing_name(""));
/// assert!(!is_valid_thing_name("a/b"));
/// ```
#[must_use]
pub fn is_valid_thing_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_THING_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b':' | b'_' | b'-'))
}

/// Owned map of registered things keyed by name.
#[derive(Debug)]
pub struct ThingSessionRegistry {
    mode: ClientMode,
    duplicates: DuplicateRegistration,
    things: BTreeMap<String, RegisterOptions>,
}

impl ThingSessionRegistry {
    /// Create an empty registry for a client in `mode`.
    #[must_use]
    pub fn new(mode: ClientMode, duplicates: DuplicateRegistration) -> Self {
        Self {
            mode,
            duplicates,
            things: BTreeMap::new(),
        }
    }

    /// Client mode the registry was built for.
    #[must_use]
    pub fn mode(&self) -> ClientMode { self.mode }

    /// Configured duplicate handling.
    #[must_use]
    pub fn duplicate_registration(&self) -> DuplicateRegistration { self.duplicates }

    /// Register `name` once.
    ///
    /// `done` is only consumed when a register request is issued; for every
    /// other outcome it is dropped unused.
    pub fn add_thing<S: Service + ?Sized>(
        &mut self,
        service: &mut S,
        name: &str,
        options: Option<RegisterOptions>,
        done: Completion<()>,
    ) -> Registration {
        if self.mode == ClientMode::Device {
            warn!(thing = name, "thing registration requires shadow mode");
            return Registration::Unsupported;
        }
        if !is_valid_thing_name(name) {
            warn!(thing = name, "refusing to register invalid thing name");
            return Registration::Invalid;
        }
        if self.things.contains_key(name) {
            debug!(thing = name, "thing already registered");
            return match self.duplicates {
                DuplicateRegistration::Ignore => Registration::AlreadyRegistered,
                DuplicateRegistration::Renotify => Registration::Renotify,
            };
        }
        let options = options.unwrap_or_default();
        service.register(name, &options, done);
        self.things.insert(name.to_owned(), options);
        metrics::set_things_registered(self.things.len());
        Registration::Registered
    }

    /// Tear down every registered thing.
    ///
    /// Issues one unregister per entry and empties the registry, so repeated
    /// calls do nothing. Returns the number of things unregistered.
    pub fn on_close<S: Service + ?Sized>(&mut self, service: &mut S) -> usize {
        let things = std::mem::take(&mut self.things);
        let count = things.len();
        for name in things.into_keys() {
            service.unregister(&name);
        }
        if count > 0 {
            debug!(count, "unregistered things on close");
            metrics::set_things_registered(0);
        }
        count
    }

    /// Request the shadow document of `name`.
    ///
    /// Unregistered things are still forwarded after a warning. Whether a
    /// name can be addressed at all is for the transport to decide.
    pub fn get<S: Service + ?Sized>(&mut self, service: &mut S, name: &str) -> Option<ClientToken> {
        if !self.things.contains_key(name) {
            warn!(thing = name, "shadow get for unregistered thing");
        }
        service.get(name)
    }

    /// Request a shadow update of `name` with `state`.
    ///
    /// Forwarded unconditionally; registration is not required.
    pub fn update<S: Service + ?Sized>(
        &mut self,
        service: &mut S,
        name: &str,
        state: &Value,
    ) -> Option<ClientToken> {
        service.update(name, state)
    }

    /// Remove `name` and issue the underlying unregister.
    ///
    /// Returns `false`, with no call, for an invalid name.
    pub fn unregister<S: Service + ?Sized>(&mut self, service: &mut S, name: &str) -> bool {
        if !is_valid_thing_name(name) {
            debug!(thing = name, "ignoring unregister of invalid thing name");
            return false;
        }
        self.remove(name);
        service.unregister(name);
        true
    }

    /// Remove `name` and request deletion of its shadow document.
    pub fn delete<S: Service + ?Sized>(
        &mut self,
        service: &mut S,
        name: &str,
    ) -> Option<ClientToken> {
        if !is_valid_thing_name(name) {
            debug!(thing = name, "ignoring delete of invalid thing name");
            return None;
        }
        self.remove(name);
        service.delete(name)
    }

    fn remove(&mut self, name: &str) {
        if self.things.remove(name).is_some() {
            metrics::set_things_registered(self.things.len());
        }
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool { self.things.contains_key(name) }

    /// Options stored for `name`.
    #[must_use]
    pub fn options(&self, name: &str) -> Option<&RegisterOptions> { self.things.get(name) }

    /// Registered thing names in lexical order.
    pub fn things(&self) -> impl Iterator<Item = &str> { self.things.keys().map(String::as_str) }

    /// Number of registered things.
    #[must_use]
    pub fn len(&self) -> usize { self.things.len() }

    /// Whether no thing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.things.is_empty() }
}
