//! Thing shadow topic layout and request documents.
//!
//! Requests are published to `$aws/things/<thing>/shadow/<op>`. Answers
//! arrive on `<request topic>/accepted` or `<request topic>/rejected`, and
//! divergence between desired and reported state on
//! `$aws/things/<thing>/shadow/update/delta`.

use serde_json::{Map, Value};

use crate::{correlation::ClientToken, service::ShadowStatus};

const PREFIX: &str = "$aws/things/";
const SHADOW: &str = "/shadow/";

/// Shadow request kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShadowOp {
    /// Fetch the document.
    Get,
    /// Merge a new state.
    Update,
    /// Remove the document.
    Delete,
}

impl ShadowOp {
    /// Every request kind.
    pub const ALL: [Self; 3] = [Self::Get, Self::Update, Self::Delete];

    /// Topic segment naming the request.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn parse(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == segment)
    }
}

/// Topic a request is published on.
#[must_use]
pub fn request_topic(thing: &str, op: ShadowOp) -> String {
    format!("{PREFIX}{thing}{SHADOW}{}", op.as_str())
}

/// Topic carrying one kind of answer to `op`.
#[must_use]
pub fn response_topic(thing: &str, op: ShadowOp, status: ShadowStatus) -> String {
    format!("{}/{}", request_topic(thing, op), status.as_str())
}

/// Topic carrying shadow deltas.
#[must_use]
pub fn delta_topic(thing: &str) -> String { format!("{}/delta", request_topic(thing, ShadowOp::Update)) }

/// Both answer topics of `op`.
#[must_use]
pub fn operation_topics(thing: &str, op: ShadowOp) -> [String; 2] {
    [
        response_topic(thing, op, ShadowStatus::Accepted),
        response_topic(thing, op, ShadowStatus::Rejected),
    ]
}

/// Topics subscribed while `thing` is registered.
///
/// The delta topic is always included; the answer topics of every request
/// kind only when subscriptions are persistent.
#[must_use]
pub fn registration_topics(thing: &str, persistent: bool) -> Vec<String> {
    let mut topics = Vec::with_capacity(7);
    if persistent {
        for op in ShadowOp::ALL {
            topics.extend(operation_topics(thing, op));
        }
    }
    topics.push(delta_topic(thing));
    topics
}

/// A parsed inbound shadow topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowTopic<'a> {
    /// Answer to a request.
    Response {
        /// Thing the answer concerns.
        thing: &'a str,
        /// Request kind answered.
        op: ShadowOp,
        /// Accepted or rejected.
        status: ShadowStatus,
    },
    /// Delta notification.
    Delta {
        /// Thing whose shadow diverged.
        thing: &'a str,
    },
}

/// Recognise a shadow answer or delta topic.
///
/// # Examples
///
/// ```
/// use thingwire::{
///     mqtt::shadow::{ShadowOp, ShadowTopic, parse_topic},
///     service::ShadowStatus,
/// };
///
/// assert_eq!(
///     parse_topic("$aws/things/lamp/shadow/get/accepted"),
///     Some(ShadowTopic::Response {
///         thing: "lamp",
///         op: ShadowOp::Get,
///         status: ShadowStatus::Accepted,
///     })
/// );
/// assert_eq!(parse_topic("sensors/lamp"), None);
/// ```
#[must_use]
pub fn parse_topic(topic: &str) -> Option<ShadowTopic<'_>> {
    let rest = topic.strip_prefix(PREFIX)?;
    let (thing, rest) = rest.split_once(SHADOW)?;
    if thing.is_empty() || thing.contains('/') {
        return None;
    }
    let (op, suffix) = rest.split_once('/')?;
    let op = ShadowOp::parse(op)?;
    match suffix {
        "accepted" => Some(ShadowTopic::Response {
            thing,
            op,
            status: ShadowStatus::Accepted,
        }),
        "rejected" => Some(ShadowTopic::Response {
            thing,
            op,
            status: ShadowStatus::Rejected,
        }),
        "delta" if op == ShadowOp::Update => Some(ShadowTopic::Delta { thing }),
        _ => None,
    }
}

/// Errors building a request document.
#[derive(Debug, thiserror::Error)]
pub enum RequestBodyError {
    /// Update state must be a JSON object.
    #[error("shadow update state must be a JSON object")]
    NotAnObject,
    /// The document could not be serialised.
    #[error("failed to serialise shadow request: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialise a request document carrying `token`.
///
/// `state` is the caller's update document; its top-level fields are kept
/// and `clientToken` (plus `version` when given) is added.
///
/// # Errors
///
/// Returns [`RequestBodyError::NotAnObject`] when `state` is not an object.
pub fn request_body(
    token: &ClientToken,
    state: Option<&Value>,
    version: Option<u64>,
) -> Result<Vec<u8>, RequestBodyError> {
    let mut document = match state {
        Some(Value::Object(fields)) => fields.clone(),
        Some(_) => return Err(RequestBodyError::NotAnObject),
        None => Map::new(),
    };
    document.insert("clientToken".into(), Value::from(token.as_str()));
    if let Some(version) = version {
        document.insert("version".into(), Value::from(version));
    }
    Ok(serde_json::to_vec(&document)?)
}

/// Token echoed in an answer document.
#[must_use]
pub fn response_token(document: &Value) -> Option<ClientToken> {
    document
        .get("clientToken")
        .and_then(Value::as_str)
        .map(ClientToken::from)
}

/// Version carried by a shadow document.
#[must_use]
pub fn document_version(document: &Value) -> Option<u64> { document.get("version").and_then(Value::as_u64) }
