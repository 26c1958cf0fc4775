// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker for integration tests.
//!
//! Queues buffer messages until a consumer attaches, consumers of one queue get
//! deliveries round-robin, and exchanges route to their bound queues. Closing a
//! channel ends every delivery stream handed out through it.

#![allow(dead_code)]

use async_trait::async_trait;
use ezmq::{
    broker::{
        Acker, BrokerChannel, BrokerConnection, Connector, Delivery, DeliveryStream, Publishing,
    },
    config::ConnectionConfig,
    errors::BrokerError,
    Context,
};
use futures_util::{stream, StreamExt};
use lapin::{
    options::{
        BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, ExchangeKind,
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc;

type DeliverySender = mpsc::UnboundedSender<Result<Delivery, BrokerError>>;

#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, MemoryQueue>,
    exchanges: HashMap<String, MemoryExchange>,
    generated: usize,
    dials: usize,
    acks: usize,
    fail_acks: bool,
    prefetch: Vec<u16>,
    consumers: Vec<(String, BasicConsumeOptions)>,
}

#[derive(Default)]
struct MemoryQueue {
    pending: VecDeque<(Vec<u8>, BasicProperties)>,
    consumers: Vec<DeliverySender>,
    next: usize,
}

struct MemoryExchange {
    kind: ExchangeKind,
    bindings: Vec<(String, String)>,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A context dialing this broker.
    pub fn context(self: &Arc<Self>) -> Context {
        Context::with_connector(ConnectionConfig::local(), Arc::new(MemoryConnector(self.clone())))
    }

    pub fn dials(&self) -> usize {
        self.state.lock().dials
    }

    pub fn acks(&self) -> usize {
        self.state.lock().acks
    }

    pub fn fail_acks(&self) {
        self.state.lock().fail_acks = true;
    }

    pub fn prefetch(&self) -> Vec<u16> {
        self.state.lock().prefetch.clone()
    }

    /// `(queue, options)` of every consumer registered so far.
    pub fn consumers(&self) -> Vec<(String, BasicConsumeOptions)> {
        self.state.lock().consumers.clone()
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.state.lock().queues.contains_key(name)
    }

    /// Messages sitting in `queue` with no consumer to take them.
    pub fn pending(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |queue| queue.pending.len())
    }

    fn route(self: &Arc<Self>, exchange: &str, routing_key: &str, message: Publishing) -> Result<(), BrokerError> {
        let mut state = self.state.lock();

        let targets: Vec<String> = if exchange.is_empty() {
            vec![routing_key.to_owned()]
        } else {
            let exchange = state
                .exchanges
                .get(exchange)
                .ok_or_else(|| BrokerError::new(format!("NOT_FOUND - no exchange '{exchange}'")))?;
            exchange
                .bindings
                .iter()
                .filter(|(_, key)| matches!(exchange.kind, ExchangeKind::Fanout) || key == routing_key)
                .map(|(queue, _)| queue.clone())
                .collect()
        };

        for target in targets {
            if let Some(queue) = state.queues.get_mut(&target) {
                queue.push(self, message.body.clone(), message.properties.clone());
            }
        }

        Ok(())
    }

    fn close_consumers(&self) {
        for queue in self.state.lock().queues.values_mut() {
            queue.consumers.clear();
        }
    }
}

impl MemoryQueue {
    fn push(&mut self, broker: &Arc<MemoryBroker>, data: Vec<u8>, properties: BasicProperties) {
        while !self.consumers.is_empty() {
            let idx = self.next % self.consumers.len();
            let delivery = Delivery {
                data: data.clone(),
                properties: properties.clone(),
                acker: Box::new(MemoryAcker(broker.clone())),
            };
            if self.consumers[idx].send(Ok(delivery)).is_ok() {
                self.next = idx + 1;
                return;
            }
            self.consumers.remove(idx);
        }
        self.pending.push_back((data, properties));
    }
}

pub struct MemoryConnector(Arc<MemoryBroker>);

#[async_trait]
impl Connector for MemoryConnector {
    async fn dial(
        &self,
        _uri: &str,
        _connection_name: &str,
    ) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        self.0.state.lock().dials += 1;
        Ok(Box::new(MemoryConnection(self.0.clone())))
    }
}

struct MemoryConnection(Arc<MemoryBroker>);

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        Ok(Box::new(MemoryChannel(self.0.clone())))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.0.close_consumers();
        Ok(())
    }
}

struct MemoryChannel(Arc<MemoryBroker>);

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn queue_declare(
        &self,
        name: &str,
        _options: QueueDeclareOptions,
        _args: FieldTable,
    ) -> Result<String, BrokerError> {
        let mut state = self.0.state.lock();
        let name = if name.is_empty() {
            state.generated += 1;
            format!("amq.gen-{}", state.generated)
        } else {
            name.to_owned()
        };
        state.queues.entry(name.clone()).or_default();
        Ok(name)
    }

    async fn basic_qos(
        &self,
        prefetch_count: u16,
        _options: BasicQosOptions,
    ) -> Result<(), BrokerError> {
        self.0.state.lock().prefetch.push(prefetch_count);
        Ok(())
    }

    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        _options: ExchangeDeclareOptions,
        _args: FieldTable,
    ) -> Result<(), BrokerError> {
        self.0
            .state
            .lock()
            .exchanges
            .entry(name.to_owned())
            .or_insert_with(|| MemoryExchange {
                kind,
                bindings: Vec::new(),
            });
        Ok(())
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        _options: QueueBindOptions,
        _args: FieldTable,
    ) -> Result<(), BrokerError> {
        let mut state = self.0.state.lock();
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::new(format!("NOT_FOUND - no queue '{queue}'")));
        }
        let exchange = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::new(format!("NOT_FOUND - no exchange '{exchange}'")))?;
        exchange
            .bindings
            .push((queue.to_owned(), routing_key.to_owned()));
        Ok(())
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        _options: BasicPublishOptions,
        message: Publishing,
    ) -> Result<(), BrokerError> {
        self.0.route(exchange, routing_key, message)
    }

    async fn basic_consume(
        &self,
        queue: &str,
        _consumer_tag: &str,
        options: BasicConsumeOptions,
        _args: FieldTable,
    ) -> Result<DeliveryStream, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.0.state.lock();
            state.consumers.push((queue.to_owned(), options));
            let memory_queue = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::new(format!("NOT_FOUND - no queue '{queue}'")))?;
            while let Some((data, properties)) = memory_queue.pending.pop_front() {
                let delivery = Delivery {
                    data,
                    properties,
                    acker: Box::new(MemoryAcker(self.0.clone())),
                };
                // rx is still held here, so this can't fail.
                let _ = tx.send(Ok(delivery));
            }
            memory_queue.consumers.push(tx);
        }

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (delivery, rx))
        })
        .boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.0.close_consumers();
        Ok(())
    }
}

struct MemoryAcker(Arc<MemoryBroker>);

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self, _multiple: bool) -> Result<(), BrokerError> {
        let mut state = self.0.state.lock();
        if state.fail_acks {
            return Err(BrokerError::new("PRECONDITION_FAILED - unknown delivery tag"));
        }
        state.acks += 1;
        Ok(())
    }
}

/// Polls `check` until it holds, failing the test after a second.
pub async fn eventually<F>(check: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
