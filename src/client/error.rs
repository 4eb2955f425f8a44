//! Error types surfaced by a [`Connection`](crate::client::Connection).

use crate::{codec::DecodeFault, config::ConfigError, service::BrokerError};

/// Errors delivered to the error observer or returned by connection setup.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Inbound bytes could not be deframed.
    #[error("failed to decode inbound data: {0}")]
    Decode(#[from] DecodeFault),
    /// The broker or transport rejected a request.
    #[error(transparent)]
    Broker(#[from] BrokerError),
    /// The transport reported a failure outside any single request.
    #[error("transport error: {reason}")]
    Transport {
        /// Transport-provided description.
        reason: String,
    },
    /// The connection configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Build a [`ClientError::Transport`] from any displayable reason.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}
