//! Inbound consumption metadata.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::duration_ms;
use super::message::RoutingKey;

/// Unique name of a subscription inside one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionName(String);

impl SubscriptionName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SubscriptionName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Name of the broker-side queue a subscription reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which handler chain a pump drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePumpType {
    /// Blocking handlers, run on the blocking pool.
    Reactor,
    /// Async handlers.
    #[default]
    Proactor,
}

/// What a performer does when a handler fails with an unexpected error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerErrorPolicy {
    /// Requeue, counting against `requeue_count`.
    #[default]
    Defer,
    /// Reject to the dead-letter path on first failure.
    DeadLetter,
}

/// How to consume one channel.
///
/// Everything is fixed at startup except the performer count, which the
/// dispatcher can change at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub name: SubscriptionName,
    pub channel_name: ChannelName,
    pub routing_key: RoutingKey,
    /// `Request::TYPE` that messages on this channel map to.
    pub request_type: String,
    #[serde(default = "default_no_of_performers")]
    pub no_of_performers: usize,
    /// Upper bound on one blocking receive, so stop is observed promptly.
    #[serde(
        default = "default_timeout",
        rename = "timeout_ms",
        with = "duration_ms"
    )]
    pub timeout: Duration,
    /// Redeliveries allowed for a deferred message. `None` = unlimited.
    #[serde(default = "default_requeue_count")]
    pub requeue_count: Option<u32>,
    #[serde(default, rename = "requeue_delay_ms", with = "duration_ms")]
    pub requeue_delay: Duration,
    /// Unacceptable messages tolerated before the performer stops. 0 = unlimited.
    #[serde(default)]
    pub unacceptable_message_limit: u32,
    #[serde(
        default = "default_empty_channel_delay",
        rename = "empty_channel_delay_ms",
        with = "duration_ms"
    )]
    pub empty_channel_delay: Duration,
    #[serde(
        default = "default_channel_failure_delay",
        rename = "channel_failure_delay_ms",
        with = "duration_ms"
    )]
    pub channel_failure_delay: Duration,
    #[serde(default)]
    pub pump_type: MessagePumpType,
    #[serde(default)]
    pub on_handler_error: HandlerErrorPolicy,
}

fn default_no_of_performers() -> usize {
    1
}

fn default_timeout() -> Duration {
    Duration::from_millis(300)
}

fn default_requeue_count() -> Option<u32> {
    Some(3)
}

fn default_empty_channel_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_channel_failure_delay() -> Duration {
    Duration::from_millis(1000)
}

impl Subscription {
    pub fn new(
        name: impl Into<String>,
        channel_name: impl Into<String>,
        routing_key: impl Into<RoutingKey>,
        request_type: impl Into<String>,
    ) -> Self {
        Self {
            name: SubscriptionName::new(name),
            channel_name: ChannelName::new(channel_name),
            routing_key: routing_key.into(),
            request_type: request_type.into(),
            no_of_performers: default_no_of_performers(),
            timeout: default_timeout(),
            requeue_count: default_requeue_count(),
            requeue_delay: Duration::ZERO,
            unacceptable_message_limit: 0,
            empty_channel_delay: default_empty_channel_delay(),
            channel_failure_delay: default_channel_failure_delay(),
            pump_type: MessagePumpType::default(),
            on_handler_error: HandlerErrorPolicy::default(),
        }
    }

    pub fn with_no_of_performers(mut self, n: usize) -> Self {
        self.no_of_performers = n;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_requeue_count(mut self, requeue_count: Option<u32>) -> Self {
        self.requeue_count = requeue_count;
        self
    }

    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    pub fn with_unacceptable_message_limit(mut self, limit: u32) -> Self {
        self.unacceptable_message_limit = limit;
        self
    }

    pub fn with_empty_channel_delay(mut self, delay: Duration) -> Self {
        self.empty_channel_delay = delay;
        self
    }

    pub fn with_channel_failure_delay(mut self, delay: Duration) -> Self {
        self.channel_failure_delay = delay;
        self
    }

    pub fn with_pump_type(mut self, pump_type: MessagePumpType) -> Self {
        self.pump_type = pump_type;
        self
    }

    pub fn with_on_handler_error(mut self, policy: HandlerErrorPolicy) -> Self {
        self.on_handler_error = policy;
        self
    }

    /// Problems that make the subscription unusable, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.as_str().is_empty() {
            return Err("subscription name is empty".to_string());
        }
        if self.timeout.is_zero() {
            return Err(format!("subscription {}: receive timeout must be > 0", self.name));
        }
        Ok(())
    }
}
