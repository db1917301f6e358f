//! Transport-neutral message envelope.
//!
//! A `Message` is what crosses the broker boundary and what the outbox stores:
//! a header with routing and identity data plus an opaque body. Apart from the
//! header bag and the redelivery bookkeeping (`handled_count`, `delayed`) a
//! message is immutable once a mapper has produced it.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CorrelationId, MessageId};

/// Bag key holding the id of the message this one was copied from.
pub const ORIGINAL_MESSAGE_ID_HEADER: &str = "x-original-message-id";

/// Topic / routing key a message is published to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingKey(String);

impl RoutingKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RoutingKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RoutingKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What the producer meant by sending the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// The transport delivered something that could not be read.
    Unacceptable,
    /// Nothing was received (empty channel).
    None,
    /// Point-to-point: exactly one consumer should act on it.
    Command,
    /// Notification; zero or more listeners.
    Event,
    /// Event that carries the changed data.
    Document,
    /// Ask a performer to stop.
    Quit,
}

impl MessageType {
    /// Whether a performer should dispatch this message to the pipeline.
    pub fn is_serviceable(self) -> bool {
        matches!(
            self,
            MessageType::Command | MessageType::Event | MessageType::Document
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    id: MessageId,
    topic: RoutingKey,
    message_type: MessageType,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    partition_key: Option<String>,
    /// Times this message has been handed to a handler and deferred.
    #[serde(default)]
    handled_count: u32,
    /// Delay requested on the most recent requeue.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::domain::duration_ms::option"
    )]
    delayed: Option<Duration>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    bag: HashMap<String, serde_json::Value>,
}

impl MessageHeader {
    pub fn new(
        id: MessageId,
        topic: RoutingKey,
        message_type: MessageType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            topic,
            message_type,
            timestamp,
            correlation_id: None,
            reply_to: None,
            content_type: "application/json".to_string(),
            partition_key: None,
            handled_count: 0,
            delayed: None,
            bag: HashMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn with_bag_item(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.bag.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn topic(&self) -> &RoutingKey {
        &self.topic
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }

    pub fn handled_count(&self) -> u32 {
        self.handled_count
    }

    pub fn delayed(&self) -> Option<Duration> {
        self.delayed
    }

    pub fn bag(&self) -> &HashMap<String, serde_json::Value> {
        &self.bag
    }

    pub fn bag_mut(&mut self) -> &mut HashMap<String, serde_json::Value> {
        &mut self.bag
    }
}

/// Raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageBody(Vec<u8>);

impl MessageBody {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy UTF-8 view, for logs.
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub body: MessageBody,
}

impl Message {
    pub fn new(header: MessageHeader, body: MessageBody) -> Self {
        Self { header, body }
    }

    /// A message a transport hands back when it could not parse what it read.
    pub fn unacceptable(id: MessageId, topic: RoutingKey, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            MessageHeader::new(id, topic, MessageType::Unacceptable, timestamp),
            MessageBody::default(),
        )
    }

    /// A message that tells the receiving performer to stop.
    pub fn quit(topic: RoutingKey, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            MessageHeader::new(MessageId::generate(), topic, MessageType::Quit, timestamp),
            MessageBody::default(),
        )
    }

    pub fn id(&self) -> MessageId {
        self.header.id
    }

    /// Record one more deferral of this message.
    pub fn update_handled_count(&mut self) {
        self.header.handled_count += 1;
    }

    /// Record the delay requested for the next delivery.
    pub fn set_delayed(&mut self, delay: Option<Duration>) {
        self.header.delayed = delay;
    }

    /// True once the message has been deferred more often than `requeue_count` allows.
    pub fn requeue_limit_exceeded(&self, requeue_count: Option<u32>) -> bool {
        requeue_count.is_some_and(|limit| self.header.handled_count > limit)
    }
}
