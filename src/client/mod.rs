//! Connection facade over a broker transport.
//!
//! A [`Connection`] composes the subscription registry, the thing session
//! registry and the inbound deframer over one [`Service`](crate::service::Service)
//! handle, and routes transport events to [`Observers`]. Connections are
//! assembled by [`ConnectionBuilder`].

mod builder;
mod error;
mod hooks;
mod runtime;

pub use builder::ConnectionBuilder;
pub use error::ClientError;
pub use hooks::{
    DeltaHandler,
    ErrorHandler,
    EventHandler,
    MessageHandler,
    Observers,
    StatusHandler,
    SubscriptionHandler,
    ThingHandler,
    TimeoutHandler,
};
pub use runtime::{Connection, SharedConnection, lock};

#[cfg(test)]
mod tests;
