// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for ezmq
//!
//! Two layers of errors live here. `BrokerError` is what the broker capability
//! interface (see [`crate::broker`]) reports when an underlying RPC fails, and
//! `AmqpError` is what every public ezmq operation returns, naming the step that
//! failed (connecting, declaring, publishing, acknowledging...) and carrying the
//! broker's error as its source where there is one.

use std::{fmt, sync::Arc};
use thiserror::Error;

/// A failure reported by the underlying broker client.
///
/// The capability traits are implementation-agnostic, so the error always carries
/// the client's rendered message. When it came from a real client error, that
/// error is kept as the [`std::error::Error::source`] and can be downcast, e.g.
/// to [`lapin::Error`].
///
/// Equality only compares messages.
#[derive(Debug, Clone)]
pub struct BrokerError {
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BrokerError {
    pub fn new(msg: impl Into<String>) -> Self {
        BrokerError {
            message: msg.into(),
            source: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl PartialEq for BrokerError {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
    }
}

impl Eq for BrokerError {}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BrokerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        BrokerError {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

/// Represents errors that can occur during ezmq operations.
///
/// Declaration and publish errors are always returned to the caller. Errors in a
/// running delivery loop only surface through the subscription's ack-error
/// handler or through [`crate::consumer::Subscription::wait`].
#[derive(Error, Debug)]
pub enum AmqpError {
    /// The connection identity has no host to dial
    #[error("a host is required to connect")]
    MissingHost,

    /// Error establishing a connection to the broker
    #[error("failure to connect: {0}")]
    ConnectionError(#[source] BrokerError),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(#[source] BrokerError),

    /// The owning context was closed or dropped
    #[error("context is closed")]
    ContextClosed,

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{name}`")]
    DeclareQueueError {
        name: String,
        #[source]
        source: BrokerError,
    },

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos: {0}")]
    QoSDeclarationError(#[source] BrokerError),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{name}`")]
    DeclareExchangeError {
        name: String,
        #[source]
        source: BrokerError,
    },

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{queue}` to exchange `{exchange}`")]
    BindingExchangeToQueueError {
        exchange: String,
        queue: String,
        #[source]
        source: BrokerError,
    },

    /// An exchange was asked to bind a queue that was declared with a name
    #[error("queue `{0}` was not declared as a transient bind target (empty name)")]
    BindTargetNotTransient(String),

    /// Error encoding a payload to JSON
    #[error("failure to serialize payload: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Error publishing a message
    #[error("failure to publish: {0}")]
    PublishingError(#[source] BrokerError),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer on queue `{queue}`")]
    ConsumerDeclarationError {
        queue: String,
        #[source]
        source: BrokerError,
    },

    /// Error acknowledging a message
    #[error("failure to ack message: {0}")]
    AckMessageError(#[source] BrokerError),

    /// One or both of the channel and connection failed to close
    #[error("failure to close (channel: {channel:?}, connection: {connection:?})")]
    CloseError {
        channel: Option<BrokerError>,
        connection: Option<BrokerError>,
    },

    /// Error loading configuration
    #[error("failure to load configuration: {0}")]
    ConfigError(#[from] ::config::ConfigError),

    /// Internal errors that don't fit into other categories
    #[error("internal error: {0}")]
    InternalError(String),
}
