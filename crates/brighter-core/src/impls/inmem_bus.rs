//! In-memory message bus.
//!
//! Topics fan out to the channels bound to them. Each channel is a queue of
//! ready messages plus a min-heap of requeued messages waiting out their
//! delay. Consumers wait on a `Notify` and wake either on a push or when the
//! next delayed message becomes due.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{
    BrighterError, ChannelName, Message, MessageId, RejectionReason, RoutingKey, Subscription,
};
use crate::ports::{Channel, ChannelFactory, Clock, MessageProducer, SystemClock};

/// A rejected message and why.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message: Message,
    pub reason: RejectionReason,
}

/// Requeued message waiting for its delay.
///
/// Reverse ordering so BinaryHeap pops the earliest due first; `seq` keeps
/// equal due times in requeue order.
struct Delayed {
    due: Instant,
    seq: u64,
    message: Message,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Message>,
    delayed: BinaryHeap<Delayed>,
    seq: u64,
    acknowledged: Vec<MessageId>,
    dead_letters: Vec<DeadLetter>,
    /// Receives still to fail with a channel failure.
    receive_faults: u32,
    connection_lost: bool,
}

impl QueueState {
    fn promote_due(&mut self, now: Instant) {
        while self.delayed.peek().is_some_and(|d| d.due <= now) {
            if let Some(d) = self.delayed.pop() {
                self.ready.push_back(d.message);
            }
        }
    }

    fn schedule(&mut self, message: Message, due: Instant) {
        self.seq += 1;
        let seq = self.seq;
        self.delayed.push(Delayed { due, seq, message });
    }
}

#[derive(Default)]
struct Queue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Queue {
    fn push(&self, message: Message) {
        self.state.lock().ready.push_back(message);
        self.notify.notify_one();
    }
}

#[derive(Default)]
struct Bindings {
    topics: HashMap<RoutingKey, Vec<ChannelName>>,
    queues: HashMap<ChannelName, Arc<Queue>>,
}

/// Process-local broker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InMemoryBus {
    bindings: Arc<Mutex<Bindings>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryBus {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            bindings: Arc::new(Mutex::new(Bindings::default())),
            clock,
        }
    }

    fn queue(&self, channel: &ChannelName) -> Arc<Queue> {
        Arc::clone(self.bindings.lock().queues.entry(channel.clone()).or_default())
    }

    /// Route messages published on `topic` to `channel`. Idempotent.
    pub fn bind(&self, topic: &RoutingKey, channel: &ChannelName) {
        let mut bindings = self.bindings.lock();
        bindings.queues.entry(channel.clone()).or_default();
        let bound = bindings.topics.entry(topic.clone()).or_default();
        if !bound.contains(channel) {
            bound.push(channel.clone());
        }
    }

    /// Copy `message` onto every channel bound to its topic.
    ///
    /// Returns how many channels received it; zero means nobody was listening.
    pub fn publish(&self, message: &Message) -> usize {
        let targets: Vec<Arc<Queue>> = {
            let bindings = self.bindings.lock();
            bindings
                .topics
                .get(message.header.topic())
                .into_iter()
                .flatten()
                .filter_map(|name| bindings.queues.get(name).cloned())
                .collect()
        };
        if targets.is_empty() {
            debug!(
                topic = %message.header.topic(),
                message_id = %message.id(),
                "no channel bound, message dropped"
            );
        }
        for queue in &targets {
            queue.push(message.clone());
        }
        targets.len()
    }

    /// Put a message straight onto a channel, bypassing topic routing.
    pub fn enqueue(&self, channel: &ChannelName, message: Message) {
        self.queue(channel).push(message);
    }

    /// Messages ready or waiting out a requeue delay.
    pub fn depth(&self, channel: &ChannelName) -> usize {
        let queue = self.queue(channel);
        let state = queue.state.lock();
        state.ready.len() + state.delayed.len()
    }

    pub fn acknowledged(&self, channel: &ChannelName) -> Vec<MessageId> {
        self.queue(channel).state.lock().acknowledged.clone()
    }

    pub fn dead_letters(&self, channel: &ChannelName) -> Vec<DeadLetter> {
        self.queue(channel).state.lock().dead_letters.clone()
    }

    /// Make the next `count` receives on `channel` fail with a channel failure.
    pub fn inject_receive_failures(&self, channel: &ChannelName, count: u32) {
        self.queue(channel).state.lock().receive_faults += count;
    }

    /// Every later receive on `channel` reports a lost connection.
    pub fn drop_connection(&self, channel: &ChannelName) {
        let queue = self.queue(channel);
        queue.state.lock().connection_lost = true;
        queue.notify.notify_waiters();
    }

    pub fn channel(&self, topic: &RoutingKey, channel: &ChannelName) -> InMemoryChannel {
        self.bind(topic, channel);
        InMemoryChannel {
            name: channel.clone(),
            topic: topic.clone(),
            queue: self.queue(channel),
            stopped: AtomicBool::new(false),
            clock: Arc::clone(&self.clock),
        }
    }
}

#[async_trait]
impl ChannelFactory for InMemoryBus {
    async fn create_channel(
        &self,
        subscription: &Subscription,
    ) -> Result<Arc<dyn Channel>, BrighterError> {
        Ok(Arc::new(self.channel(
            &subscription.routing_key,
            &subscription.channel_name,
        )))
    }
}

/// One consumer's handle on a bus queue.
///
/// Several channels with the same name compete for the same messages.
pub struct InMemoryChannel {
    name: ChannelName,
    topic: RoutingKey,
    queue: Arc<Queue>,
    stopped: AtomicBool,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl Channel for InMemoryChannel {
    async fn receive(&self, timeout: Duration) -> Result<Option<Message>, BrighterError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return Ok(Some(Message::quit(self.topic.clone(), self.clock.now())));
            }

            let wake_at = {
                let mut state = self.queue.state.lock();
                if state.connection_lost {
                    return Err(BrighterError::ConnectionLost(self.name.to_string()));
                }
                if state.receive_faults > 0 {
                    state.receive_faults -= 1;
                    return Err(BrighterError::ChannelFailure(format!(
                        "{}: receive failed",
                        self.name
                    )));
                }
                state.promote_due(Instant::now());
                if let Some(message) = state.ready.pop_front() {
                    return Ok(Some(message));
                }
                state
                    .delayed
                    .peek()
                    .map_or(deadline, |d| d.due.min(deadline))
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }

            tokio::select! {
                _ = self.queue.notify.notified() => {},
                _ = tokio::time::sleep_until(wake_at) => {},
            }
        }
    }

    async fn acknowledge(&self, message: &Message) -> Result<(), BrighterError> {
        self.queue.state.lock().acknowledged.push(message.id());
        Ok(())
    }

    async fn reject(
        &self,
        message: &Message,
        reason: RejectionReason,
    ) -> Result<(), BrighterError> {
        debug!(channel = %self.name, message_id = %message.id(), ?reason, "message dead-lettered");
        self.queue.state.lock().dead_letters.push(DeadLetter {
            message: message.clone(),
            reason,
        });
        Ok(())
    }

    async fn requeue(&self, message: Message, delay: Duration) -> Result<(), BrighterError> {
        if delay.is_zero() {
            self.queue.push(message);
        } else {
            self.queue
                .state
                .lock()
                .schedule(message, Instant::now() + delay);
            self.queue.notify.notify_one();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrighterError> {
        self.stopped.store(true, Ordering::Release);
        self.queue.notify.notify_waiters();
        Ok(())
    }

    fn name(&self) -> &str {
        self.name.as_str()
    }
}

/// Producer that publishes onto an [`InMemoryBus`].
pub struct InMemoryProducer {
    bus: InMemoryBus,
    sent: Mutex<Vec<Message>>,
    failures: AtomicU32,
}

impl InMemoryProducer {
    pub fn new(bus: InMemoryBus) -> Self {
        Self {
            bus,
            sent: Mutex::new(Vec::new()),
            failures: AtomicU32::new(0),
        }
    }

    /// Fail the next `count` sends.
    pub fn fail_next(&self, count: u32) {
        self.failures.fetch_add(count, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl MessageProducer for InMemoryProducer {
    async fn send(&self, message: &Message) -> Result<(), BrighterError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BrighterError::Producer(format!(
                "send of {} to {} failed",
                message.id(),
                message.header.topic()
            )));
        }
        self.bus.publish(message);
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageBody, MessageHeader, MessageType};
    use chrono::Utc;

    fn topic() -> RoutingKey {
        RoutingKey::new("greetings")
    }

    fn message() -> Message {
        Message::new(
            MessageHeader::new(MessageId::generate(), topic(), MessageType::Command, Utc::now()),
            MessageBody::new(b"{}".to_vec()),
        )
    }

    #[tokio::test]
    async fn publish_fans_out_to_bound_channels() {
        let bus = InMemoryBus::default();
        let a = bus.channel(&topic(), &ChannelName::new("a"));
        let b = bus.channel(&topic(), &ChannelName::new("b"));
        let msg = message();

        assert_eq!(bus.publish(&msg), 2);
        let got_a = a.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        let got_b = b.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(got_a.id(), msg.id());
        assert_eq!(got_b.id(), msg.id());
    }

    #[tokio::test]
    async fn unbound_topic_drops_the_message() {
        let bus = InMemoryBus::default();
        assert_eq!(bus.publish(&message()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_channel_times_out() {
        let bus = InMemoryBus::default();
        let channel = bus.channel(&topic(), &ChannelName::new("a"));
        let got = channel.receive(Duration::from_millis(100)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn requeued_message_waits_out_its_delay() {
        let bus = InMemoryBus::default();
        let name = ChannelName::new("a");
        let channel = bus.channel(&topic(), &name);
        let msg = message();

        channel.requeue(msg.clone(), Duration::from_secs(1)).await.unwrap();
        assert!(channel.receive(Duration::from_millis(500)).await.unwrap().is_none());
        assert_eq!(bus.depth(&name), 1);

        let got = channel.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(got.id(), msg.id());
        assert_eq!(bus.depth(&name), 0);
    }

    #[tokio::test]
    async fn push_wakes_waiting_receiver() {
        let bus = InMemoryBus::default();
        let channel = Arc::new(bus.channel(&topic(), &ChannelName::new("a")));
        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.receive(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let msg = message();
        bus.publish(&msg);

        let got = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(got.id(), msg.id());
    }

    #[tokio::test]
    async fn stop_hands_back_a_quit_message() {
        let bus = InMemoryBus::default();
        let channel = bus.channel(&topic(), &ChannelName::new("a"));
        channel.stop().await.unwrap();
        let got = channel.receive(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(got.header.message_type(), MessageType::Quit);
    }

    #[tokio::test]
    async fn injected_faults_surface_as_errors() {
        let bus = InMemoryBus::default();
        let name = ChannelName::new("a");
        let channel = bus.channel(&topic(), &name);

        bus.inject_receive_failures(&name, 1);
        let err = channel.receive(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, BrighterError::ChannelFailure(_)));

        bus.drop_connection(&name);
        let err = channel.receive(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, BrighterError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn producer_failures_are_counted_down() {
        let bus = InMemoryBus::default();
        let producer = InMemoryProducer::new(bus.clone());
        producer.fail_next(1);

        assert!(producer.send(&message()).await.is_err());
        assert!(producer.send(&message()).await.is_ok());
        assert_eq!(producer.sent_count(), 1);
    }
}
