// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Line-of-business message types and their typed subscriptions.
//!
//! Any `Serialize + DeserializeOwned` type can travel through a [`Queue`] or
//! [`crate::exchange::Exchange`]. These two show how an in-house wrapper adds its own
//! message types on top of [`Queue::subscribe_to`].
//!
//! On the wire both use PascalCase keys, e.g. `{"Id":"evt1","Name":"DisEvent"}`.
//! Missing fields take their zero value, unknown fields reject the message, so a
//! `BizFoo` never decodes as a `BizEvent` or the other way around.

use crate::{consumer::Subscription, errors::AmqpError, queue::Queue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Handler for one decoded message of type `T`.
pub type BizHandler<T> = Box<dyn Fn(&T) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default, deny_unknown_fields)]
pub struct BizEvent {
    pub id: String,
    pub name: String,
    /// RFC 3339 on the wire. The Unix epoch when absent.
    pub date: DateTime<Utc>,
}

impl BizEvent {
    /// An event dated now.
    pub fn new(id: &str, name: &str) -> Self {
        Self::new_at(id, name, Utc::now())
    }

    pub fn new_at(id: &str, name: &str, date: DateTime<Utc>) -> Self {
        BizEvent {
            id: id.to_owned(),
            name: name.to_owned(),
            date,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default, deny_unknown_fields)]
pub struct BizFoo {
    pub bar: bool,
    pub baz: i64,
}

impl Queue {
    /// Hands every [`BizEvent`] arriving on this queue to each of `subscribers`, in order.
    pub async fn subscribe_to_biz_events(
        &self,
        subscribers: Vec<BizHandler<BizEvent>>,
    ) -> Result<Subscription, AmqpError> {
        self.subscribe_to(move |evt: BizEvent| fan_out(&subscribers, &evt))
            .await
    }

    /// Hands every [`BizFoo`] arriving on this queue to each of `subscribers`, in order.
    pub async fn subscribe_to_biz_foos(
        &self,
        subscribers: Vec<BizHandler<BizFoo>>,
    ) -> Result<Subscription, AmqpError> {
        self.subscribe_to(move |foo: BizFoo| fan_out(&subscribers, &foo))
            .await
    }
}

fn fan_out<T>(subscribers: &[BizHandler<T>], value: &T) {
    for on_value in subscribers {
        on_value(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn may_day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn event_decodes_to_an_equal_value() {
        let evt = BizEvent::new_at("123", "DisEvent", may_day());

        let json = serde_json::to_vec(&evt).unwrap();

        assert_eq!(serde_json::from_slice::<BizEvent>(&json).unwrap(), evt);
    }

    #[test]
    fn wire_keys_are_pascal_case_with_rfc3339_date() {
        let value = serde_json::to_value(BizEvent::new_at("evt1", "DisEvent", may_day())).unwrap();

        assert_eq!(value["Id"], "evt1");
        assert_eq!(value["Name"], "DisEvent");
        assert!(value["Date"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));
        assert_eq!(
            serde_json::to_value(BizFoo { bar: true, baz: 2 }).unwrap(),
            json!({"Bar": true, "Baz": 2})
        );
        let decoded: BizEvent =
            serde_json::from_value(json!({"Id": "e", "Name": "n", "Date": "2024-05-01T12:00:00Z"}))
                .unwrap();
        assert_eq!(decoded.date, may_day());
    }

    #[test]
    fn missing_fields_take_zero_values() {
        let evt: BizEvent = serde_json::from_value(json!({"Id": "evt1", "Name": "DisEvent"})).unwrap();
        let foo: BizFoo = serde_json::from_value(json!({"Bar": true})).unwrap();

        assert_eq!(evt.name, "DisEvent");
        assert_eq!(evt.date, DateTime::<Utc>::default());
        assert_eq!(foo, BizFoo { bar: true, baz: 0 });
    }

    #[test]
    fn shapes_do_not_cross_decode() {
        let foo = serde_json::to_vec(&BizFoo { bar: true, baz: 42 }).unwrap();
        let evt = serde_json::to_vec(&BizEvent::new("1", "x")).unwrap();

        assert!(serde_json::from_slice::<BizEvent>(&foo).is_err());
        assert!(serde_json::from_slice::<BizFoo>(&evt).is_err());
        assert!(serde_json::from_value::<BizFoo>(json!({"Bar": true, "Qux": 2})).is_err());
    }

    #[test]
    fn fan_out_calls_every_subscriber_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);
        let subscribers: Vec<BizHandler<BizFoo>> = vec![
            Box::new(move |foo: &BizFoo| first.lock().unwrap().push(("first", foo.baz))),
            Box::new(move |foo: &BizFoo| second.lock().unwrap().push(("second", foo.baz))),
        ];

        fan_out(&subscribers, &BizFoo { bar: false, baz: 7 });

        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }
}
