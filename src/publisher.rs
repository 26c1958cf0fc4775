// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publishing
//!
//! Per-publish tweaks and how an outgoing message is built: the payload is
//! JSON-encoded and stamped with a content type, a message id, a delivery mode and
//! the caller's trace context.

use crate::{broker::Publishing, errors::AmqpError, otel};
use lapin::{options::BasicPublishOptions, types::ShortString, BasicProperties};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// AMQP delivery mode for messages the broker may drop on restart
pub const DELIVERY_MODE_TRANSIENT: u8 = 1;
/// AMQP delivery mode for messages the broker writes to disk
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Specialist tweaks for publishing via a [`crate::queue::Queue`] or an
/// [`crate::exchange::Exchange`]. All `false` by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PubConfig {
    /// Ask the broker to return the message if no queue is bound to receive it.
    pub mandatory: bool,
    /// Ask the broker to return the message if no consumer can take it right away.
    pub immediate: bool,
    /// Publish with the persistent delivery mode.
    pub persistent: bool,
}

impl PubConfig {
    /// Sets [`PubConfig::mandatory`].
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Sets [`PubConfig::immediate`].
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Sets [`PubConfig::persistent`].
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub(crate) fn options(&self) -> BasicPublishOptions {
        BasicPublishOptions {
            mandatory: self.mandatory,
            immediate: self.immediate,
        }
    }

    pub(crate) fn delivery_mode(&self) -> u8 {
        if self.persistent {
            DELIVERY_MODE_PERSISTENT
        } else {
            DELIVERY_MODE_TRANSIENT
        }
    }
}

/// Encodes `payload` and wraps it with the properties every ezmq message carries.
pub(crate) fn new_publishing<P>(payload: &P, cfg: &PubConfig) -> Result<Publishing, AmqpError>
where
    P: Serialize + ?Sized,
{
    let body = serde_json::to_vec(payload).map_err(|err| {
        error!(error = err.to_string(), "error serializing payload");
        AmqpError::SerializationError(err)
    })?;

    Ok(Publishing {
        body,
        properties: BasicProperties::default()
            .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
            .with_delivery_mode(cfg.delivery_mode())
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(otel::current_context_headers()),
    })
}
