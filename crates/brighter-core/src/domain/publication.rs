//! Outbound routing metadata.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::message::RoutingKey;

/// Binds a request type to the topic its messages are produced on.
///
/// Publications are configured at startup and never change afterwards. Mappers
/// read them to fill in the message header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub topic: RoutingKey,
    /// `Request::TYPE` of the requests published here.
    pub request_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    /// Copied into the header bag of every message.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub default_headers: HashMap<String, serde_json::Value>,
    /// Delivery delay requested from the transport, if it supports one.
    #[serde(
        default,
        rename = "delay_ms",
        skip_serializing_if = "Option::is_none",
        with = "crate::domain::duration_ms::option"
    )]
    pub delay: Option<Duration>,
}

impl Publication {
    pub fn new(topic: impl Into<RoutingKey>, request_type: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            request_type: request_type.into(),
            reply_to: None,
            partition_key: None,
            default_headers: HashMap::new(),
            delay: None,
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn with_default_header(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.default_headers.insert(key.into(), value);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_millisecond_delay() {
        let json = r#"{"topic":"greetings","request_type":"greetings.add","delay_ms":1500}"#;
        let publication: Publication = serde_json::from_str(json).unwrap();
        assert_eq!(publication.topic.as_str(), "greetings");
        assert_eq!(publication.delay, Some(Duration::from_millis(1500)));
        assert!(publication.default_headers.is_empty());
    }
}
