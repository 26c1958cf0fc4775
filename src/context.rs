// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Context
//!
//! A `Context` owns one broker connection and one channel, shared by every
//! [`crate::queue::Queue`] and [`crate::exchange::Exchange`] declared through it.
//! Nothing is dialed until the first declare, publish or subscribe. Later calls
//! reuse the same connection and channel until [`Context::close`].
//!
//! Queues and exchanges only keep a weak reference back to their context.
//! Once the context is closed, or every `Context` handle is dropped, their
//! operations fail with [`AmqpError::ContextClosed`].

use crate::{
    broker::{BrokerChannel, BrokerConnection, Connector},
    channel::LapinConnector,
    config::ConnectionConfig,
    errors::AmqpError,
    publisher::{new_publishing, PubConfig},
};
use serde::Serialize;
use std::{
    fmt,
    sync::{Arc, Weak},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Handle to a lazily connected broker session. Cloning it is cheap and every
/// clone shares the same connection and channel.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextInner {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    session: Mutex<Session>,
}

#[derive(Default)]
struct Session {
    connection: Option<Box<dyn BrokerConnection>>,
    channel: Option<Arc<dyn BrokerChannel>>,
    closed: bool,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// A context that dials RabbitMQ through lapin.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, Arc::new(LapinConnector))
    }

    /// `guest:guest@localhost:5672`, for local prototyping and testing.
    pub fn local() -> Self {
        Self::new(ConnectionConfig::local())
    }

    /// A context whose identity comes from the `RABBITMQ_*` environment variables.
    pub fn from_env() -> Result<Self, AmqpError> {
        Ok(Self::new(ConnectionConfig::from_env()?))
    }

    pub fn with_connector(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        Context {
            inner: Arc::new(ContextInner {
                config,
                connector,
                session: Mutex::new(Session::default()),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Whether a live connection and channel are currently held.
    pub async fn is_connected(&self) -> bool {
        self.inner.session.lock().await.channel.is_some()
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<ContextInner>) -> Result<Context, AmqpError> {
        inner
            .upgrade()
            .map(|inner| Context { inner })
            .ok_or(AmqpError::ContextClosed)
    }

    /// Returns the shared channel, dialing the connection and opening the channel
    /// first if needed.
    ///
    /// The connection and channel are only kept when both were established, so a
    /// failed attempt leaves nothing behind and the next call dials again.
    pub(crate) async fn channel(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError> {
        let mut session = self.inner.session.lock().await;
        if session.closed {
            return Err(AmqpError::ContextClosed);
        }
        if let Some(channel) = &session.channel {
            return Ok(channel.clone());
        }

        let uri = self.inner.config.uri()?;
        debug!(host = self.inner.config.host.as_str(), "connecting...");

        let connection = self
            .inner
            .connector
            .dial(&uri, &self.inner.config.connection_name)
            .await
            .map_err(AmqpError::ConnectionError)?;

        let channel: Arc<dyn BrokerChannel> = match connection.channel().await {
            Ok(channel) => Arc::from(channel),
            Err(err) => {
                if let Err(close_err) = connection.close().await {
                    warn!(
                        error = close_err.to_string(),
                        "error to close connection after channel failure"
                    );
                }
                return Err(AmqpError::ChannelError(err));
            }
        };

        session.connection = Some(connection);
        session.channel = Some(channel.clone());
        debug!("connected");

        Ok(channel)
    }

    /// Encodes `payload` and publishes it to `exchange` with `routing_key`.
    ///
    /// Connects first if this context is not connected yet.
    pub(crate) async fn publish<P>(
        &self,
        payload: &P,
        exchange: &str,
        routing_key: &str,
        cfg: &PubConfig,
    ) -> Result<(), AmqpError>
    where
        P: Serialize + ?Sized,
    {
        let channel = self.channel().await?;
        let message = new_publishing(payload, cfg)?;

        channel
            .basic_publish(exchange, routing_key, cfg.options(), message)
            .await
            .map_err(AmqpError::PublishingError)
    }

    /// Closes the channel, then the connection.
    ///
    /// Both are attempted even when the first fails, and both failures are
    /// reported. Closing an already closed (or never connected) context is a no-op.
    pub async fn close(&self) -> Result<(), AmqpError> {
        let mut session = self.inner.session.lock().await;
        session.closed = true;

        let channel = match session.channel.take() {
            Some(channel) => channel.close().await.err(),
            None => None,
        };
        let connection = match session.connection.take() {
            Some(connection) => connection.close().await.err(),
            None => None,
        };

        if channel.is_none() && connection.is_none() {
            debug!("context closed");
            return Ok(());
        }

        Err(AmqpError::CloseError {
            channel,
            connection,
        })
    }
}
