//! Correlation tokens linking shadow requests to their eventual outcome.
//!
//! A [`ClientToken`] is returned by `get`, `update` and `delete`. The runtime
//! never interprets it: callers compare it with the token carried by later
//! status and timeout events.

use std::fmt;

/// Opaque identifier for one in-flight shadow request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientToken(String);

impl ClientToken {
    /// Wrap an existing token value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    /// Borrow the token text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<String> for ClientToken {
    fn from(value: String) -> Self { Self(value) }
}

impl From<&str> for ClientToken {
    fn from(value: &str) -> Self { Self(value.to_owned()) }
}

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Issues `<prefix>-<sequence>` tokens, unique for the generator's lifetime.
///
/// # Examples
///
/// ```
/// use thingwire::correlation::ClientTokenGenerator;
///
/// let mut tokens = ClientTokenGenerator::new("dev-1");
/// assert_eq!(tokens.next_token().as_str(), "dev-1-0");
/// assert_eq!(tokens.next_token().as_str(), "dev-1-1");
/// ```
#[derive(Clone, Debug)]
pub struct ClientTokenGenerator {
    prefix: String,
    sequence: u64,
}

impl ClientTokenGenerator {
    /// Create a generator whose tokens start with `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sequence: 0,
        }
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> ClientToken {
        let token = ClientToken(format!("{}-{}", self.prefix, self.sequence));
        self.sequence = self.sequence.wrapping_add(1);
        token
    }
}
