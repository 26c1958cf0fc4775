// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchanges
//!
//! Exchanges fan published messages out to several subscribers. Each
//! subscriber declares its own transient queue (empty name) and an exchange
//! bound to it. Messages published through any such [`Exchange`] then reach
//! every bound queue, according to the exchange kind.

use crate::{
    config::{exchange_defaults, pub_defaults},
    context::{Context, ContextInner},
    errors::AmqpError,
    publisher::PubConfig,
    queue::Queue,
};
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions},
    types::FieldTable,
};
use serde::Serialize;
use std::{
    fmt,
    sync::{Arc, Weak},
};
use tracing::{debug, error};

/// Represents the types of exchanges available in RabbitMQ.
///
/// Each exchange type has specific routing behavior:
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Headers: Routes based on message header values instead of routing keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    #[default]
    Fanout,
    Topic,
    Headers,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

/// How the bind target queue is bound to the exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueBindConfig {
    /// Used both for the binding and for every publish through the exchange.
    pub routing_key: String,
    pub no_wait: bool,
    pub args: FieldTable,
}

/// Specialist tweaks for declaring an [`Exchange`].
///
/// The default is a durable fanout exchange, with the current [`pub_defaults`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeConfig {
    pub kind: ExchangeKind,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub args: FieldTable,
    pub pub_cfg: PubConfig,
    pub queue_bind: QueueBindConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            kind: ExchangeKind::Fanout,
            durable: true,
            auto_delete: false,
            internal: false,
            no_wait: false,
            args: FieldTable::default(),
            pub_cfg: *pub_defaults(),
            queue_bind: QueueBindConfig::default(),
        }
    }
}

impl ExchangeConfig {
    /// Sets the routing strategy.
    ///
    /// # Returns
    ///
    /// The updated config, for chaining.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declares the exchange non-durable.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Lets the broker delete the exchange once no queue is bound to it.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Internal exchanges can't be published to directly, only from other exchanges.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Declares without waiting for the broker's confirmation.
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Sets the key used for the binding and for every publish.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.queue_bind.routing_key = key.to_owned();
        self
    }

    /// Replaces the publish tweaks used by [`Exchange::publish`].
    pub fn publish_with(mut self, cfg: PubConfig) -> Self {
        self.pub_cfg = cfg;
        self
    }
}

/// A declared exchange with its bound queue. Only built by [`Context::exchange`].
#[derive(Clone)]
pub struct Exchange {
    name: String,
    config: Arc<ExchangeConfig>,
    ctx: Weak<ContextInner>,
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Declares the exchange `name` and binds `bind_to` to it. `None` uses the
    /// current [`exchange_defaults`].
    ///
    /// `bind_to` must be a transient queue, declared with an empty name.
    /// Binding a named queue is rejected before anything reaches the broker.
    pub async fn exchange(
        &self,
        name: &str,
        cfg: Option<Arc<ExchangeConfig>>,
        bind_to: &Queue,
    ) -> Result<Exchange, AmqpError> {
        if !bind_to.is_transient() {
            error!(
                exchange = name,
                queue = bind_to.name(),
                "only queues declared with an empty name can be bound"
            );
            return Err(AmqpError::BindTargetNotTransient(bind_to.name().to_owned()));
        }

        let cfg = cfg.unwrap_or_else(exchange_defaults);
        let channel = self.channel().await?;

        debug!("creating exchange: {}", name);

        channel
            .exchange_declare(
                name,
                cfg.kind.into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: cfg.durable,
                    auto_delete: cfg.auto_delete,
                    internal: cfg.internal,
                    nowait: cfg.no_wait,
                },
                cfg.args.clone(),
            )
            .await
            .map_err(|source| AmqpError::DeclareExchangeError {
                name: name.to_owned(),
                source,
            })?;

        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            bind_to.name(),
            name,
            cfg.queue_bind.routing_key
        );

        channel
            .queue_bind(
                bind_to.name(),
                name,
                &cfg.queue_bind.routing_key,
                QueueBindOptions {
                    nowait: cfg.queue_bind.no_wait,
                },
                cfg.queue_bind.args.clone(),
            )
            .await
            .map_err(|source| AmqpError::BindingExchangeToQueueError {
                exchange: name.to_owned(),
                queue: bind_to.name().to_owned(),
                source,
            })?;

        Ok(Exchange {
            name: name.to_owned(),
            config: cfg,
            ctx: self.downgrade(),
        })
    }
}

impl Exchange {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Arc<ExchangeConfig> {
        &self.config
    }

    /// Encodes `payload` as JSON and publishes it to this exchange with the
    /// configured routing key.
    pub async fn publish<P>(&self, payload: &P) -> Result<(), AmqpError>
    where
        P: Serialize + ?Sized,
    {
        Context::upgrade(&self.ctx)?
            .publish(
                payload,
                &self.name,
                &self.config.queue_bind.routing_key,
                &self.config.pub_cfg,
            )
            .await
    }
}
