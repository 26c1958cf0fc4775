// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Identity and Process-Wide Defaults
//!
//! [`ConnectionConfig`] is the identity a [`crate::context::Context`] dials with.
//! It can be built in code or loaded from `RABBITMQ_*` environment variables.
//!
//! The `*_defaults` functions hold the configs used when a declaration is passed
//! `None`. Each one starts out with the values listed on its config type. The
//! application can replace them with the `set_*_defaults` functions, which only
//! affects declarations made afterwards. Queues and exchanges that already exist
//! keep the `Arc` they were handed.

use crate::{
    consumer::SubConfig, errors::AmqpError, exchange::ExchangeConfig, publisher::PubConfig,
    queue::QueueConfig,
};
use ::config::{Config, Environment};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;

const URI_SCHEME: &str = "amqp://";
const ENV_PREFIX: &str = "RABBITMQ";

/// Who and where to connect to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub host: String,
    /// `0` leaves the port out of the URI so the client default applies.
    #[serde(default)]
    pub port: u16,
    /// Left out of the URI when empty.
    #[serde(default)]
    pub vhost: String,
    /// Reported to the broker as the connection name.
    #[serde(default = "default_connection_name")]
    pub connection_name: String,
}

fn default_connection_name() -> String {
    "ezmq".to_owned()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: 0,
            vhost: String::new(),
            connection_name: default_connection_name(),
        }
    }
}

impl ConnectionConfig {
    /// An identity with only `host` set. No credentials, no port and no vhost.
    pub fn new(host: &str) -> Self {
        ConnectionConfig {
            host: host.to_owned(),
            ..Default::default()
        }
    }

    /// `guest:guest@localhost:5672`, for local prototyping and testing.
    pub fn local() -> Self {
        ConnectionConfig {
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            host: "localhost".to_owned(),
            port: 5672,
            ..Default::default()
        }
    }

    /// Sets the user and password. An empty password leaves `:password` out of the URI.
    pub fn credentials(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_owned();
        self.password = password.to_owned();
        self
    }

    /// Sets the port; `0` leaves it out.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the virtual host, e.g. `/` or `staging`.
    pub fn vhost(mut self, vhost: &str) -> Self {
        self.vhost = vhost.to_owned();
        self
    }

    /// Sets the name the broker shows for this connection.
    pub fn connection_name(mut self, name: &str) -> Self {
        self.connection_name = name.to_owned();
        self
    }

    /// Loads the identity from `RABBITMQ_USER`, `RABBITMQ_PASSWORD`,
    /// `RABBITMQ_HOST`, `RABBITMQ_PORT`, `RABBITMQ_VHOST` and
    /// `RABBITMQ_CONNECTION_NAME`. Unset variables fall back to [`ConnectionConfig::local`].
    pub fn from_env() -> Result<Self, AmqpError> {
        let local = ConnectionConfig::local();

        let cfg = Config::builder()
            .set_default("user", local.user)?
            .set_default("password", local.password)?
            .set_default("host", local.host)?
            .set_default("port", i64::from(local.port))?
            .set_default("vhost", local.vhost)?
            .set_default("connection_name", local.connection_name)?
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        Ok(cfg.try_deserialize()?)
    }

    /// Builds `amqp://[user[:password]@]host[:port][/vhost]`.
    ///
    /// The password is only written when a user is present.
    pub fn uri(&self) -> Result<String, AmqpError> {
        if self.host.is_empty() {
            return Err(AmqpError::MissingHost);
        }

        let mut uri = String::from(URI_SCHEME);
        if !self.user.is_empty() {
            uri.push_str(&self.user);
            if !self.password.is_empty() {
                uri.push(':');
                uri.push_str(&self.password);
            }
            uri.push('@');
        }
        uri.push_str(&self.host);
        if self.port > 0 {
            uri.push_str(&format!(":{}", self.port));
        }
        if !self.vhost.is_empty() {
            uri.push('/');
            uri.push_str(&self.vhost.replace('/', "%2f"));
        }

        Ok(uri)
    }
}

static QUEUE_DEFAULTS: Lazy<RwLock<Arc<QueueConfig>>> =
    Lazy::new(|| RwLock::new(Arc::new(QueueConfig::default())));
static EXCHANGE_DEFAULTS: Lazy<RwLock<Arc<ExchangeConfig>>> =
    Lazy::new(|| RwLock::new(Arc::new(ExchangeConfig::default())));
static PUB_DEFAULTS: Lazy<RwLock<Arc<PubConfig>>> =
    Lazy::new(|| RwLock::new(Arc::new(PubConfig::default())));
static SUB_DEFAULTS: Lazy<RwLock<Arc<SubConfig>>> =
    Lazy::new(|| RwLock::new(Arc::new(SubConfig::default())));

/// The config used by [`crate::context::Context::queue`] when given `None`.
pub fn queue_defaults() -> Arc<QueueConfig> {
    QUEUE_DEFAULTS.read().clone()
}

/// Replaces the defaults used by later [`crate::context::Context::queue`] calls given `None`.
///
/// Queues and exchanges already declared keep the config they were declared with.
pub fn set_queue_defaults(cfg: QueueConfig) {
    *QUEUE_DEFAULTS.write() = Arc::new(cfg);
}

/// The config used by [`crate::context::Context::exchange`] when given `None`.
pub fn exchange_defaults() -> Arc<ExchangeConfig> {
    EXCHANGE_DEFAULTS.read().clone()
}

/// Replaces the defaults used by later [`crate::context::Context::exchange`] calls given `None`.
///
/// Queues and exchanges already declared keep the config they were declared with.
pub fn set_exchange_defaults(cfg: ExchangeConfig) {
    *EXCHANGE_DEFAULTS.write() = Arc::new(cfg);
}

/// Publish tweaks that newly built [`QueueConfig`]s and [`ExchangeConfig`]s start from.
pub fn pub_defaults() -> Arc<PubConfig> {
    PUB_DEFAULTS.read().clone()
}

/// Replaces the publish tweaks that configs built from now on start from.
pub fn set_pub_defaults(cfg: PubConfig) {
    *PUB_DEFAULTS.write() = Arc::new(cfg);
}

/// Subscribe tweaks that newly built [`QueueConfig`]s start from.
pub fn sub_defaults() -> Arc<SubConfig> {
    SUB_DEFAULTS.read().clone()
}

/// Replaces the subscribe tweaks that configs built from now on start from.
pub fn set_sub_defaults(cfg: SubConfig) {
    *SUB_DEFAULTS.write() = Arc::new(cfg);
}
