// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! The lapin-backed implementation of the [`crate::broker`] capability traits.
//! [`LapinConnector`] dials RabbitMQ, and the connection and channel wrappers
//! forward each operation to lapin, logging failures before handing them back as
//! [`BrokerError`]s.

use crate::{
    broker::{Acker, BrokerChannel, BrokerConnection, Connector, Delivery, DeliveryStream, Publishing},
    errors::BrokerError,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{FieldTable, LongString},
    Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tracing::{debug, error};

const REPLY_SUCCESS: u16 = 200;

/// Dials RabbitMQ through lapin.
#[derive(Debug, Clone, Copy, Default)]
pub struct LapinConnector;

#[async_trait]
impl Connector for LapinConnector {
    async fn dial(
        &self,
        uri: &str,
        connection_name: &str,
    ) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        debug!("creating amqp connection...");
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(connection_name.to_owned()));

        match Connection::connect(uri, options).await {
            Ok(conn) => {
                debug!("amqp connected");
                Ok(Box::new(LapinConnection(conn)))
            }
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(err.into())
            }
        }
    }
}

struct LapinConnection(Connection);

#[async_trait]
impl BrokerConnection for LapinConnection {
    async fn channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        debug!("creating amqp channel...");
        match self.0.create_channel().await {
            Ok(ch) => {
                debug!("channel created");
                Ok(Box::new(LapinChannel(ch)))
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(err.into())
            }
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.0.close(REPLY_SUCCESS, "OK").await.map_err(|err| {
            error!(error = err.to_string(), "error to close the connection");
            err.into()
        })
    }
}

struct LapinChannel(Channel);

#[async_trait]
impl BrokerChannel for LapinChannel {
    async fn queue_declare(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        args: FieldTable,
    ) -> Result<String, BrokerError> {
        match self.0.queue_declare(name, options, args).await {
            Ok(queue) => Ok(queue.name().as_str().to_owned()),
            Err(err) => {
                error!(error = err.to_string(), queue = name, "error to declare the queue");
                Err(err.into())
            }
        }
    }

    async fn basic_qos(
        &self,
        prefetch_count: u16,
        options: BasicQosOptions,
    ) -> Result<(), BrokerError> {
        self.0
            .basic_qos(prefetch_count, options)
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to configure qos");
                err.into()
            })
    }

    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        args: FieldTable,
    ) -> Result<(), BrokerError> {
        self.0
            .exchange_declare(name, kind, options, args)
            .await
            .map_err(|err| {
                error!(error = err.to_string(), exchange = name, "error to declare the exchange");
                err.into()
            })
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        options: QueueBindOptions,
        args: FieldTable,
    ) -> Result<(), BrokerError> {
        self.0
            .queue_bind(queue, exchange, routing_key, options, args)
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to bind queue to exchange");
                err.into()
            })
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        message: Publishing,
    ) -> Result<(), BrokerError> {
        match self
            .0
            .basic_publish(
                exchange,
                routing_key,
                options,
                &message.body,
                message.properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(err.into())
            }
            _ => Ok(()),
        }
    }

    async fn basic_consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: BasicConsumeOptions,
        args: FieldTable,
    ) -> Result<DeliveryStream, BrokerError> {
        let consumer = match self
            .0
            .basic_consume(queue, consumer_tag, options, args)
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(BrokerError::from(err))
            }
            Ok(c) => Ok(c),
        }?;

        Ok(consumer
            .map(|result| result.map(into_delivery).map_err(BrokerError::from))
            .boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.0.close(REPLY_SUCCESS, "OK").await.map_err(|err| {
            error!(error = err.to_string(), "error to close the channel");
            err.into()
        })
    }
}

fn into_delivery(mut delivery: lapin::message::Delivery) -> Delivery {
    let data = std::mem::take(&mut delivery.data);
    let properties = delivery.properties.clone();

    Delivery {
        data,
        properties,
        acker: Box::new(LapinAcker(delivery)),
    }
}

struct LapinAcker(lapin::message::Delivery);

#[async_trait]
impl Acker for LapinAcker {
    async fn ack(&self, multiple: bool) -> Result<(), BrokerError> {
        self.0
            .ack(BasicAckOptions { multiple })
            .await
            .map_err(BrokerError::from)
    }
}
