// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queues
//!
//! Declaring queues through a [`Context`], publishing to them through the
//! broker's default exchange, and subscribing to them with typed callbacks.
//!
//! A queue declared with an empty name gets a broker-assigned name and is meant
//! only as the bind target of an [`crate::exchange::Exchange`]. Such queues are
//! always declared non-durable and exclusive, whatever the config passed in says.

use crate::{
    config::{pub_defaults, queue_defaults, sub_defaults},
    consumer::{SubConfig, Subscription},
    context::{Context, ContextInner},
    errors::AmqpError,
    publisher::PubConfig,
};
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, LongInt, ShortString},
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fmt,
    sync::{Arc, Weak},
};
use tracing::debug;

/// Constant for the argument used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Constant for the argument used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Constant for the argument used to specify maximum queue size in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";

/// Specialist tweaks for declaring a [`Queue`], publishing to it and
/// subscribing to it.
///
/// The default is durable, with the current [`pub_defaults`] and [`sub_defaults`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub args: FieldTable,
    pub pub_cfg: PubConfig,
    pub sub_cfg: SubConfig,
    /// Limits each consumer to one unacknowledged message at a time and forces
    /// manual acks, so that several worker instances consuming the same queue
    /// share its load.
    pub qos_multiple_worker_instances: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            durable: true,
            auto_delete: false,
            exclusive: false,
            no_wait: false,
            args: FieldTable::default(),
            pub_cfg: *pub_defaults(),
            sub_cfg: (*sub_defaults()).clone(),
            qos_multiple_worker_instances: false,
        }
    }
}

impl QueueConfig {
    /// Declares the queue non-durable, so it doesn't survive a broker restart.
    ///
    /// # Returns
    ///
    /// The updated config, for chaining.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Lets the broker delete the queue once its last consumer is gone.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Restricts the queue to this connection. The broker deletes it when the
    /// connection closes. Consumers are declared exclusive as well.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Declares without waiting for the broker's confirmation.
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Adds a single declaration argument.
    pub fn arg(mut self, key: &str, value: AMQPValue) -> Self {
        self.args.insert(ShortString::from(key), value);
        self
    }

    /// Messages older than `ttl` milliseconds are dropped by the broker.
    pub fn message_ttl(self, ttl: i32) -> Self {
        self.arg(AMQP_HEADERS_MESSAGE_TTL, AMQPValue::LongInt(LongInt::from(ttl)))
    }

    /// Caps the number of ready messages, `x-max-length`.
    pub fn max_length(self, max: i32) -> Self {
        self.arg(AMQP_HEADERS_MAX_LENGTH, AMQPValue::LongInt(LongInt::from(max)))
    }

    /// Caps the total body size of ready messages, `x-max-length-bytes`.
    pub fn max_length_bytes(self, max_bytes: i32) -> Self {
        self.arg(
            AMQP_HEADERS_MAX_LENGTH_BYTES,
            AMQPValue::LongInt(LongInt::from(max_bytes)),
        )
    }

    /// Replaces the publish tweaks used by [`Queue::publish`].
    pub fn publish_with(mut self, cfg: PubConfig) -> Self {
        self.pub_cfg = cfg;
        self
    }

    /// Replaces the subscribe tweaks used by [`Queue::subscribe_to`].
    ///
    /// # Returns
    ///
    /// The updated config, for chaining.
    pub fn subscribe_with(mut self, cfg: SubConfig) -> Self {
        self.sub_cfg = cfg;
        self
    }

    /// Enables [`QueueConfig::qos_multiple_worker_instances`].
    pub fn worker_pool(mut self) -> Self {
        self.qos_multiple_worker_instances = true;
        self
    }

    /// Worker-pool mode always acks manually, so a message only leaves the queue
    /// once a worker actually handled it.
    pub fn effective_auto_ack(&self) -> bool {
        self.sub_cfg.auto_ack && !self.qos_multiple_worker_instances
    }
}

/// The config a queue named `name` is actually declared with.
///
/// Anonymous queues are forced to `durable = false, exclusive = true`. When that
/// changes anything, the result is a modified copy and `cfg` itself is left
/// untouched. Otherwise `cfg` is returned as is.
pub(crate) fn effective_config(name: &str, cfg: Arc<QueueConfig>) -> Arc<QueueConfig> {
    if !name.is_empty() || (!cfg.durable && cfg.exclusive) {
        return cfg;
    }

    Arc::new(QueueConfig {
        durable: false,
        exclusive: true,
        ..(*cfg).clone()
    })
}

/// A declared queue. Only built by [`Context::queue`]; its name and config are
/// fixed for its whole lifetime.
#[derive(Clone)]
pub struct Queue {
    name: String,
    config: Arc<QueueConfig>,
    transient: bool,
    ctx: Weak<ContextInner>,
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("transient", &self.transient)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Declares a queue named `name`, or a broker-named transient one when `name`
    /// is empty. `None` uses the current [`queue_defaults`].
    ///
    /// Connects first if needed. Nothing is returned unless the declaration (and
    /// the QoS setup in worker-pool mode) succeeded.
    pub async fn queue(
        &self,
        name: &str,
        cfg: Option<Arc<QueueConfig>>,
    ) -> Result<Queue, AmqpError> {
        let cfg = effective_config(name, cfg.unwrap_or_else(queue_defaults));
        let channel = self.channel().await?;

        debug!("creating queue: {}", name);

        let resolved = channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    passive: false,
                    durable: cfg.durable,
                    exclusive: cfg.exclusive,
                    auto_delete: cfg.auto_delete,
                    nowait: cfg.no_wait,
                },
                cfg.args.clone(),
            )
            .await
            .map_err(|source| AmqpError::DeclareQueueError {
                name: name.to_owned(),
                source,
            })?;

        if cfg.qos_multiple_worker_instances {
            channel
                .basic_qos(1, BasicQosOptions { global: false })
                .await
                .map_err(AmqpError::QoSDeclarationError)?;
        }

        debug!("queue: {} was created", resolved);

        Ok(Queue {
            name: resolved,
            config: cfg,
            transient: name.is_empty(),
            ctx: self.downgrade(),
        })
    }
}

impl Queue {
    /// The declared name, broker-assigned for transient queues.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Arc<QueueConfig> {
        &self.config
    }

    /// Whether this queue was declared with an empty name, making it a valid
    /// [`crate::exchange::Exchange`] bind target.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Encodes `payload` as JSON and publishes it to this queue through the
    /// default exchange.
    pub async fn publish<P>(&self, payload: &P) -> Result<(), AmqpError>
    where
        P: Serialize + ?Sized,
    {
        Context::upgrade(&self.ctx)?
            .publish(payload, "", &self.name, &self.config.pub_cfg)
            .await
    }

    /// Subscribes `on_message` to every message on this queue that decodes as a `T`.
    ///
    /// Messages of other shapes are skipped (and still acknowledged when acks are
    /// manual). Deliveries are handled one at a time, in order, on a spawned task.
    /// Consumer setup errors are returned here. After that, errors only reach the
    /// config's ack-error handler or [`Subscription::wait`].
    pub async fn subscribe_to<T, F>(&self, on_message: F) -> Result<Subscription, AmqpError>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) + Send + 'static,
    {
        let channel = Context::upgrade(&self.ctx)?.channel().await?;
        let sub = &self.config.sub_cfg;
        let auto_ack = self.config.effective_auto_ack();
        let consumer_tag = sub.consumer_tag();

        let deliveries = channel
            .basic_consume(
                &self.name,
                &consumer_tag,
                BasicConsumeOptions {
                    no_local: sub.no_local,
                    no_ack: auto_ack,
                    exclusive: self.config.exclusive,
                    nowait: self.config.no_wait,
                },
                self.config.args.clone(),
            )
            .await
            .map_err(|source| AmqpError::ConsumerDeclarationError {
                queue: self.name.clone(),
                source,
            })?;

        debug!(
            queue = self.name.as_str(),
            consumer = consumer_tag.as_str(),
            "consumer declared"
        );

        Ok(Subscription::spawn(
            consumer_tag,
            self.name.clone(),
            deliveries,
            !auto_ack,
            sub.on_ack_error.clone(),
            on_message,
        ))
    }
}
