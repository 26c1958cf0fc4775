// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Typed publish/subscribe over RabbitMQ.
//!
//! A [`Context`] lazily connects and hands out [`Queue`]s and [`Exchange`]s.
//! Payloads are JSON encoded on publish and decoded into the subscriber's type
//! on delivery. Messages of any other shape are skipped.

mod otel;

pub mod biz;
pub mod broker;
pub mod channel;
pub mod config;
pub mod consumer;
pub mod context;
pub mod errors;
pub mod exchange;
pub mod publisher;
pub mod queue;

pub use consumer::{SubConfig, Subscription};
pub use context::Context;
pub use errors::AmqpError;
pub use exchange::{Exchange, ExchangeConfig, ExchangeKind};
pub use publisher::PubConfig;
pub use queue::{Queue, QueueConfig};
