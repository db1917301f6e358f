//! Dispatcher: owns the subscriptions and their performer pools.
//!
//! Each subscription has a pool guarded by its own async mutex, so two
//! concurrent resizes of one subscription run one after the other while
//! different subscriptions resize independently. Status reads a snapshot
//! that a resize refreshes before it waits on any performer, so it never
//! queues behind a drain.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{info, warn};

use super::builder::BuildError;
use super::command_processor::CommandProcessor;
use super::message_pump::{MessagePump, direction_of};
use super::performer::{Performer, PumpRun};
use super::status::{DispatcherStateItem, PerformerInformation};
use crate::domain::{
    BrighterError, ConsumerState, DispatcherState, Request, Subscription, SubscriptionName,
};
use crate::ports::{Channel, ChannelFactory};

/// Builds a pump for a new performer of one subscription.
type PumpFactory = Arc<
    dyn Fn(String, Arc<dyn Channel>, watch::Receiver<bool>) -> Result<PumpRun, BrighterError>
        + Send
        + Sync,
>;

struct Consumer {
    subscription: Arc<Subscription>,
    factory: PumpFactory,
    pool: tokio::sync::Mutex<Vec<Performer>>,
    snapshot: Mutex<Snapshot>,
}

/// What `status` reports for one subscription.
#[derive(Default)]
struct Snapshot {
    expected: usize,
    performers: Vec<(String, Arc<Mutex<ConsumerState>>)>,
}

impl Consumer {
    fn new<R: Request>(processor: &Arc<CommandProcessor>, subscription: Subscription) -> Self {
        let subscription = Arc::new(subscription);
        let factory: PumpFactory = {
            let processor = Arc::clone(processor);
            let subscription = Arc::clone(&subscription);
            Arc::new(move |name, channel, stop| {
                let pump = MessagePump::<R>::new(
                    name,
                    Arc::clone(&processor),
                    channel,
                    Arc::clone(&subscription),
                )?;
                Ok(Box::pin(pump.run(stop)) as PumpRun)
            })
        };
        Self {
            subscription,
            factory,
            pool: tokio::sync::Mutex::new(Vec::new()),
            snapshot: Mutex::new(Snapshot::default()),
        }
    }

    fn publish(&self, expected: usize, performers: &[Performer]) {
        let mut snapshot = self.snapshot.lock();
        snapshot.expected = expected;
        snapshot.performers = performers
            .iter()
            .map(|p| (p.name().to_string(), p.state_handle()))
            .collect();
    }

    fn status(&self) -> DispatcherStateItem {
        let snapshot = self.snapshot.lock();
        DispatcherStateItem {
            name: self.subscription.name.clone(),
            expected_performers: snapshot.expected,
            performers: snapshot
                .performers
                .iter()
                .map(|(name, state)| PerformerInformation {
                    name: name.clone(),
                    state: *state.lock(),
                })
                .collect(),
        }
    }
}

/// Check that `subscription` can be served as `R` by `processor`.
fn validate<R: Request>(
    processor: &CommandProcessor,
    subscription: &Subscription,
) -> Result<(), BuildError> {
    let invalid = |reason: String| BuildError::InvalidSubscription {
        name: subscription.name.clone(),
        reason,
    };
    subscription.validate().map_err(invalid)?;
    if subscription.request_type != R::TYPE {
        return Err(invalid(format!(
            "request type {} does not match {}",
            subscription.request_type,
            R::TYPE
        )));
    }
    if !processor.mappers().contains(R::TYPE) {
        return Err(BuildError::MissingMapper(R::TYPE.to_string()));
    }
    let direction = direction_of(subscription.pump_type);
    if processor.pipelines().registry().registrations::<R>(direction).is_empty() {
        return Err(invalid(format!("no {direction:?} handler registered for {}", R::TYPE)));
    }
    Ok(())
}

pub struct Dispatcher {
    processor: Arc<CommandProcessor>,
    channels: Arc<dyn ChannelFactory>,
    consumers: RwLock<BTreeMap<SubscriptionName, Arc<Consumer>>>,
    state: Mutex<DispatcherState>,
    sequence: AtomicUsize,
}

impl Dispatcher {
    pub fn state(&self) -> DispatcherState {
        *self.state.lock()
    }

    pub fn processor(&self) -> &Arc<CommandProcessor> {
        &self.processor
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.consumers
            .read()
            .values()
            .map(|c| c.subscription.as_ref().clone())
            .collect()
    }

    fn consumer(&self, name: &SubscriptionName) -> Result<Arc<Consumer>, BrighterError> {
        self.consumers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BrighterError::configuration(format!("unknown subscription {name}")))
    }

    fn all_consumers(&self) -> Vec<Arc<Consumer>> {
        self.consumers.read().values().cloned().collect()
    }

    /// Start every subscription with its configured number of performers.
    pub async fn receive(&self) -> Result<(), BrighterError> {
        {
            let mut state = self.state.lock();
            match *state {
                DispatcherState::Awaiting => *state = DispatcherState::Running,
                DispatcherState::NotReady => {
                    return Err(BrighterError::configuration("dispatcher has no subscriptions"));
                }
                DispatcherState::Running => {
                    return Err(BrighterError::configuration("dispatcher is already running"));
                }
                DispatcherState::Stopped => {
                    return Err(BrighterError::configuration("dispatcher has ended"));
                }
            }
        }

        info!("dispatcher starting");
        for consumer in self.all_consumers() {
            self.resize(&consumer, consumer.subscription.no_of_performers)
                .await?;
        }
        Ok(())
    }

    /// Add a subscription at runtime. It starts at once if the dispatcher is running.
    pub async fn open<R: Request>(&self, subscription: Subscription) -> Result<(), BrighterError> {
        validate::<R>(&self.processor, &subscription)?;
        let consumer = {
            let mut consumers = self.consumers.write();
            if consumers.contains_key(&subscription.name) {
                return Err(BuildError::DuplicateSubscription(subscription.name).into());
            }
            let consumer = Arc::new(Consumer::new::<R>(&self.processor, subscription));
            consumers.insert(consumer.subscription.name.clone(), Arc::clone(&consumer));
            consumer
        };

        let running = {
            let mut state = self.state.lock();
            match *state {
                DispatcherState::NotReady => *state = DispatcherState::Awaiting,
                DispatcherState::Stopped => {
                    return Err(BrighterError::configuration("dispatcher has ended"));
                }
                DispatcherState::Awaiting | DispatcherState::Running => {}
            }
            *state == DispatcherState::Running
        };
        if running {
            self.resize(&consumer, consumer.subscription.no_of_performers)
                .await?;
        }
        Ok(())
    }

    /// Stop every performer of one subscription, waiting for in-flight messages.
    pub async fn shut(&self, name: &SubscriptionName) -> Result<(), BrighterError> {
        let consumer = self.consumer(name)?;
        self.resize(&consumer, 0).await
    }

    /// Stop everything and wait for it to drain.
    pub async fn end(&self) -> Result<(), BrighterError> {
        for consumer in self.all_consumers() {
            self.resize(&consumer, 0).await?;
        }
        *self.state.lock() = DispatcherState::Stopped;
        info!("dispatcher stopped");
        Ok(())
    }

    /// Scale one subscription to `count` running performers.
    ///
    /// Performers that already exited are cleared out first. Scaling down
    /// stops the newest performers and waits for each to finish its message.
    pub async fn set_active_performers(
        &self,
        name: &SubscriptionName,
        count: usize,
    ) -> Result<(), BrighterError> {
        if self.state() != DispatcherState::Running {
            return Err(BrighterError::configuration("dispatcher is not running"));
        }
        let consumer = self.consumer(name)?;
        self.resize(&consumer, count).await
    }

    async fn resize(&self, consumer: &Consumer, count: usize) -> Result<(), BrighterError> {
        let mut performers = consumer.pool.lock().await;

        let (running, exited): (Vec<Performer>, Vec<Performer>) = std::mem::take(&mut *performers)
            .into_iter()
            .partition(Performer::is_running);
        *performers = running;
        consumer.publish(count, &performers);
        for performer in exited {
            performer.stop().await;
        }

        while performers.len() < count {
            let performer = self.spawn_performer(consumer).await?;
            performers.push(performer);
            consumer.publish(count, &performers);
        }
        while performers.len() > count {
            if let Some(performer) = performers.pop() {
                consumer.publish(count, &performers);
                let name = performer.name().to_string();
                let state = performer.stop().await;
                info!(performer = %name, ?state, "performer stopped");
            }
        }

        info!(
            subscription = %consumer.subscription.name,
            performers = performers.len(),
            "subscription resized"
        );
        Ok(())
    }

    async fn spawn_performer(&self, consumer: &Consumer) -> Result<Performer, BrighterError> {
        let subscription = &consumer.subscription;
        let channel = self.channels.create_channel(subscription).await?;
        let name = format!(
            "{}-{}",
            subscription.name,
            self.sequence.fetch_add(1, Ordering::Relaxed) + 1
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let pump = (consumer.factory)(name.clone(), Arc::clone(&channel), stop_rx).inspect_err(|e| {
            warn!(subscription = %subscription.name, error = %e, "cannot start performer");
        })?;
        Ok(Performer::start(name, channel, stop_tx, pump))
    }

    /// Expected versus actual performers, per subscription.
    ///
    /// Answers at once, even while a resize is waiting for a performer to
    /// finish its message.
    pub fn status(&self) -> Vec<DispatcherStateItem> {
        self.all_consumers().iter().map(|c| c.status()).collect()
    }
}

/// Builds a [`Dispatcher`], checking every subscription up front.
pub struct DispatcherBuilder {
    processor: Arc<CommandProcessor>,
    channels: Arc<dyn ChannelFactory>,
    consumers: Vec<Result<Consumer, BuildError>>,
}

impl DispatcherBuilder {
    pub fn new(processor: Arc<CommandProcessor>, channels: Arc<dyn ChannelFactory>) -> Self {
        Self {
            processor,
            channels,
            consumers: Vec::new(),
        }
    }

    /// Consume `subscription`, mapping its messages to `R`.
    pub fn consumer<R: Request>(mut self, subscription: Subscription) -> Self {
        let consumer = validate::<R>(&self.processor, &subscription)
            .map(|()| Consumer::new::<R>(&self.processor, subscription));
        self.consumers.push(consumer);
        self
    }

    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let mut consumers = BTreeMap::new();
        for consumer in self.consumers {
            let consumer = consumer?;
            let name = consumer.subscription.name.clone();
            if consumers.contains_key(&name) {
                return Err(BuildError::DuplicateSubscription(name));
            }
            consumers.insert(name, Arc::new(consumer));
        }

        let state = if consumers.is_empty() {
            DispatcherState::NotReady
        } else {
            DispatcherState::Awaiting
        };
        Ok(Dispatcher {
            processor: self.processor,
            channels: self.channels,
            consumers: RwLock::new(consumers),
            state: Mutex::new(state),
            sequence: AtomicUsize::new(0),
        })
    }
}
