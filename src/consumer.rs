// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Consumer
//!
//! The delivery loop behind [`crate::queue::Queue::subscribe_to`]. For each
//! inbound delivery it:
//! 1. Decodes the body into the subscriber's type
//! 2. Acknowledges it when the subscription uses manual ack, whether or not it
//!    decoded
//! 3. Passes decoded values to the subscriber, in delivery order
//!
//! A body that doesn't decode belongs to some other subscriber's type and is
//! skipped without being reported. Ack failures go to the subscription's
//! [`AckErrorHandler`]. Without one, an ack failure ends the loop and the error is
//! returned from [`Subscription::wait`].

use crate::{broker::DeliveryStream, errors::AmqpError, otel};
use futures_util::StreamExt;
use opentelemetry::{
    global,
    trace::{Span, Status},
};
use serde::de::DeserializeOwned;
use std::{borrow::Cow, fmt, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Called with a manual-ack failure. Return `true` to keep the subscription
/// going (the decoded value, if any, is still dispatched) or `false` to stop it.
pub type AckErrorHandler = Arc<dyn Fn(&AmqpError) -> bool + Send + Sync>;

/// Specialist tweaks used by [`crate::queue::Queue::subscribe_to`].
///
/// Defaults to auto-ack and a generated consumer tag.
#[derive(Clone)]
pub struct SubConfig {
    /// Consumer tag; a random `ezmq-<uuid>` tag is used when empty.
    pub consumer: String,
    pub auto_ack: bool,
    pub no_local: bool,
    /// Only consulted when acks are manual, that is when `auto_ack` is off or the
    /// queue runs in worker-pool mode.
    pub on_ack_error: Option<AckErrorHandler>,
}

impl Default for SubConfig {
    fn default() -> Self {
        SubConfig {
            consumer: String::new(),
            auto_ack: true,
            no_local: false,
            on_ack_error: None,
        }
    }
}

impl fmt::Debug for SubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubConfig")
            .field("consumer", &self.consumer)
            .field("auto_ack", &self.auto_ack)
            .field("no_local", &self.no_local)
            .field("on_ack_error", &self.on_ack_error.is_some())
            .finish()
    }
}

impl SubConfig {
    pub fn consumer(mut self, tag: &str) -> Self {
        self.consumer = tag.to_owned();
        self
    }

    pub fn manual_ack(mut self) -> Self {
        self.auto_ack = false;
        self
    }

    pub fn no_local(mut self) -> Self {
        self.no_local = true;
        self
    }

    pub fn on_ack_error<H>(mut self, handler: H) -> Self
    where
        H: Fn(&AmqpError) -> bool + Send + Sync + 'static,
    {
        self.on_ack_error = Some(Arc::new(handler));
        self
    }

    pub(crate) fn consumer_tag(&self) -> String {
        if self.consumer.is_empty() {
            format!("ezmq-{}", Uuid::new_v4())
        } else {
            self.consumer.clone()
        }
    }
}

/// A running subscription.
///
/// Dropping it detaches the delivery loop, which keeps running until the broker
/// closes the stream or the ack-error handler stops it.
#[derive(Debug)]
pub struct Subscription {
    consumer_tag: String,
    handle: JoinHandle<Result<(), AmqpError>>,
}

impl Subscription {
    pub(crate) fn spawn<T, F>(
        consumer_tag: String,
        queue: String,
        deliveries: DeliveryStream,
        manual_ack: bool,
        on_ack_error: Option<AckErrorHandler>,
        on_message: F,
    ) -> Subscription
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) + Send + 'static,
    {
        let handle = tokio::spawn(run_delivery_loop(
            queue,
            deliveries,
            manual_ack,
            on_ack_error,
            on_message,
        ));

        Subscription {
            consumer_tag,
            handle,
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the delivery loop to end.
    ///
    /// Resolves with `Ok(())` when the stream closed or the ack-error handler
    /// stopped the loop, and with the ack error when it failed with no handler.
    pub async fn wait(self) -> Result<(), AmqpError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(error = err.to_string(), "delivery loop task failed");
                Err(AmqpError::InternalError(err.to_string()))
            }
        }
    }
}

pub(crate) async fn run_delivery_loop<T, F>(
    queue: String,
    mut deliveries: DeliveryStream,
    manual_ack: bool,
    on_ack_error: Option<AckErrorHandler>,
    on_message: F,
) -> Result<(), AmqpError>
where
    T: DeserializeOwned,
    F: Fn(T),
{
    let tracer = global::tracer(otel::TRACER_NAME);

    while let Some(result) = deliveries.next().await {
        let delivery = match result {
            Ok(delivery) => delivery,
            Err(err) => {
                warn!(error = err.to_string(), queue = queue.as_str(), "errors consume msg");
                continue;
            }
        };

        let mut span = otel::new_span(&delivery.properties, &tracer, &queue);
        let decoded = serde_json::from_slice::<T>(&delivery.data);

        if manual_ack {
            if let Err(err) = delivery.acker.ack(false).await {
                let err = AmqpError::AckMessageError(err);
                span.record_error(&err);
                span.set_status(Status::Error {
                    description: Cow::from("error to ack msg"),
                });

                match &on_ack_error {
                    Some(handler) => {
                        if !handler(&err) {
                            debug!(queue = queue.as_str(), "subscription stopped after ack error");
                            return Ok(());
                        }
                    }
                    None => {
                        error!(
                            error = err.to_string(),
                            queue = queue.as_str(),
                            "error whiling ack msg, stopping subscription"
                        );
                        return Err(err);
                    }
                }
            }
        }

        match decoded {
            Ok(msg) => {
                on_message(msg);
                span.set_status(Status::Ok);
            }
            Err(err) => debug!(
                error = err.to_string(),
                queue = queue.as_str(),
                "skipping message not meant for this subscriber"
            ),
        }
    }

    debug!(queue = queue.as_str(), "delivery stream closed");
    Ok(())
}
