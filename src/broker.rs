// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Capability Interface
//!
//! The operations ezmq needs from a message broker client, as object-safe async
//! traits. [`crate::channel`] implements them on top of lapin; tests implement them
//! in memory or mock them.
//!
//! Option structs, argument tables and message properties are lapin's own types,
//! so the lapin implementation is a thin pass-through.
//!
//! A `BrokerChannel` is shared by every queue, exchange and delivery loop of a
//! [`crate::context::Context`], so implementations must accept concurrent calls.

use crate::errors::BrokerError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use lapin::{
    options::{
        BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, ExchangeKind,
};

/// Stream of inbound deliveries for one consumer. Ends when the broker tears down
/// the channel or connection.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

/// Dials new broker connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn dial(
        &self,
        uri: &str,
        connection_name: &str,
    ) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// An open connection to the broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// An open channel on a broker connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declares a queue, returning the name the broker resolved for it (the
    /// broker assigns one when `name` is empty).
    async fn queue_declare(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        args: FieldTable,
    ) -> Result<String, BrokerError>;

    async fn basic_qos(
        &self,
        prefetch_count: u16,
        options: BasicQosOptions,
    ) -> Result<(), BrokerError>;

    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        args: FieldTable,
    ) -> Result<(), BrokerError>;

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        options: QueueBindOptions,
        args: FieldTable,
    ) -> Result<(), BrokerError>;

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        message: Publishing,
    ) -> Result<(), BrokerError>;

    async fn basic_consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: BasicConsumeOptions,
        args: FieldTable,
    ) -> Result<DeliveryStream, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// Acknowledges a single delivery back to the broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self, multiple: bool) -> Result<(), BrokerError>;
}

/// An outbound message.
#[derive(Debug, Clone, Default)]
pub struct Publishing {
    pub body: Vec<u8>,
    pub properties: BasicProperties,
}

/// One unit of message data handed to a consumer.
pub struct Delivery {
    pub data: Vec<u8>,
    pub properties: BasicProperties,
    pub acker: Box<dyn Acker>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("data", &String::from_utf8_lossy(&self.data))
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}
