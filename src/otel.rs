// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration
//!
//! Trace context travels in the AMQP message headers. Published messages carry
//! the caller's current context, and each delivery a subscription handles gets a
//! consumer span that continues it.

use lapin::{
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties,
};
use opentelemetry::{
    global::{self, BoxedSpan, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::{borrow::Cow, collections::BTreeMap};
use tracing::error;

pub(crate) const TRACER_NAME: &str = "ezmq consumer";

struct HeaderInjector<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

struct HeaderExtractor<'a> {
    headers: &'a BTreeMap<ShortString, AMQPValue>,
}

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| {
            if let AMQPValue::LongString(header_value) = header_value {
                std::str::from_utf8(header_value.as_bytes())
                    .map_err(|e| error!("Error decoding header value {:?}", e))
                    .ok()
            } else {
                None
            }
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Headers carrying the caller's current trace context.
pub(crate) fn current_context_headers() -> FieldTable {
    let mut headers = BTreeMap::<ShortString, AMQPValue>::default();

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(
            &Context::current(),
            &mut HeaderInjector {
                headers: &mut headers,
            },
        )
    });

    FieldTable::from(headers)
}

/// Starts a consumer span continuing the trace found in `props`' headers.
pub(crate) fn new_span(props: &BasicProperties, tracer: &BoxedTracer, name: &str) -> BoxedSpan {
    let headers = props.headers().clone().unwrap_or_default();

    let ctx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor {
            headers: headers.inner(),
        })
    });

    tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx)
}
