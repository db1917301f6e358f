//! Inbound transport port.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{BrighterError, Message, RejectionReason, Subscription};

/// One consumer's view of a broker queue.
///
/// `receive` must return within `timeout`. An empty channel yields `Ok(None)`;
/// a transport hiccup is `Err(BrighterError::ChannelFailure(_))` and the pump
/// backs off and tries again; `Err(BrighterError::ConnectionLost(_))` ends the
/// performer.
///
/// Redelivery bookkeeping lives in the message header (`handled_count`), which
/// the transport must carry across `requeue`.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn receive(&self, timeout: Duration) -> Result<Option<Message>, BrighterError>;

    async fn acknowledge(&self, message: &Message) -> Result<(), BrighterError>;

    /// Remove the message for good, to a dead-letter queue if the transport has one.
    async fn reject(&self, message: &Message, reason: RejectionReason) -> Result<(), BrighterError>;

    /// Put the message back; it becomes visible again after `delay`.
    async fn requeue(&self, message: Message, delay: Duration) -> Result<(), BrighterError>;

    /// Wake any receiver blocked in `receive`, typically by queueing a quit message.
    async fn stop(&self) -> Result<(), BrighterError>;

    fn name(&self) -> &str;
}

/// Opens channels for subscriptions. One channel per performer.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn create_channel(
        &self,
        subscription: &Subscription,
    ) -> Result<Arc<dyn Channel>, BrighterError>;
}
