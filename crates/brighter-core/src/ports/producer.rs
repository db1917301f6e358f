//! Outbound transport port.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{BrighterError, Message, RoutingKey};

/// Sends messages to one topic on an external bus.
///
/// A failed `send` must return an error rather than drop the message; the
/// outbox keeps it outstanding and the sweeper tries again.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), BrighterError>;

    /// Back-pressure hint: how many undispatched messages the producer will
    /// accept before callers should wait. `None` means no limit.
    fn max_outstanding(&self) -> Option<usize> {
        None
    }
}

/// Producers keyed by topic.
#[derive(Default, Clone)]
pub struct ProducerRegistry {
    producers: HashMap<RoutingKey, Arc<dyn MessageProducer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, topic: impl Into<RoutingKey>, producer: Arc<dyn MessageProducer>) {
        self.producers.insert(topic.into(), producer);
    }

    pub fn get(&self, topic: &RoutingKey) -> Result<Arc<dyn MessageProducer>, BrighterError> {
        self.producers.get(topic).cloned().ok_or_else(|| {
            BrighterError::configuration(format!("no producer registered for topic {topic}"))
        })
    }

    pub fn topics(&self) -> impl Iterator<Item = &RoutingKey> {
        self.producers.keys()
    }
}
