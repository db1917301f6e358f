//! MessagePump - the receive / translate / dispatch / settle loop of one performer.
//!
//! Every received message ends in exactly one of acknowledge, requeue or
//! reject. Handler failures never escape the loop; only a lost connection
//! does, and the performer supervising the pump turns that into `Closed`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::command_processor::CommandProcessor;
use crate::domain::{
    BrighterError, ConsumerState, Disposition, HandlerErrorPolicy, LoopControl, Message,
    MessagePumpType, MessageType, RejectionReason, Request, Subscription,
};
use crate::pipeline::PipelineDirection;
use crate::ports::{AsyncMessageMapper, Channel};

pub struct MessagePump<R: Request> {
    performer: String,
    processor: Arc<CommandProcessor>,
    channel: Arc<dyn Channel>,
    subscription: Arc<Subscription>,
    mapper: Arc<dyn AsyncMessageMapper<R>>,
    unacceptable: u32,
}

/// Reactors drive blocking handlers, proactors async ones.
pub(crate) fn direction_of(pump_type: MessagePumpType) -> PipelineDirection {
    match pump_type {
        MessagePumpType::Reactor => PipelineDirection::Sync,
        MessagePumpType::Proactor => PipelineDirection::Async,
    }
}

/// The delay a failed dispatch asked for, if it was a deferral.
///
/// A fan-out counts as deferred when any of its handlers deferred.
fn deferral(error: &BrighterError) -> Option<Option<Duration>> {
    match error {
        BrighterError::Defer { delay } => Some(*delay),
        BrighterError::Publish { failures, .. } => failures
            .iter()
            .filter_map(|f| deferral(&f.error))
            .max(),
        _ => None,
    }
}

impl<R: Request> MessagePump<R> {
    /// Fails with a configuration error when no mapper is registered for `R`.
    pub fn new(
        performer: impl Into<String>,
        processor: Arc<CommandProcessor>,
        channel: Arc<dyn Channel>,
        subscription: Arc<Subscription>,
    ) -> Result<Self, BrighterError> {
        let mapper = processor.mappers().get::<R>()?;
        Ok(Self {
            performer: performer.into(),
            processor,
            channel,
            subscription,
            mapper,
            unacceptable: 0,
        })
    }

    /// Pump until stopped, told to quit, or the channel is lost.
    ///
    /// A stop request is honoured between messages, never in the middle of
    /// a dispatch.
    pub async fn run(
        mut self,
        mut stop: watch::Receiver<bool>,
    ) -> Result<ConsumerState, BrighterError> {
        info!(
            performer = %self.performer,
            subscription = %self.subscription.name,
            "performer started"
        );
        loop {
            if *stop.borrow() {
                return Ok(ConsumerState::Shut);
            }

            let received = tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        return Ok(ConsumerState::Shut);
                    }
                    continue;
                }
                received = self.channel.receive(self.subscription.timeout) => received,
            };

            match received {
                Ok(Some(message)) => match self.handle(message).await {
                    LoopControl::Continue => {}
                    LoopControl::Quit => return Ok(ConsumerState::Shut),
                    LoopControl::Close => return Ok(ConsumerState::Closed),
                },
                Ok(None) => {
                    if pause(&mut stop, self.subscription.empty_channel_delay).await {
                        return Ok(ConsumerState::Shut);
                    }
                }
                Err(e @ BrighterError::ConnectionLost(_)) => {
                    error!(performer = %self.performer, error = %e, "channel connection lost");
                    return Err(e);
                }
                Err(e) => {
                    warn!(performer = %self.performer, error = %e, "channel failure, backing off");
                    if pause(&mut stop, self.subscription.channel_failure_delay).await {
                        return Ok(ConsumerState::Shut);
                    }
                }
            }
        }
    }

    async fn handle(&mut self, mut message: Message) -> LoopControl {
        match message.header.message_type() {
            MessageType::Quit => {
                info!(performer = %self.performer, "quit message received");
                return LoopControl::Quit;
            }
            MessageType::None => return LoopControl::Continue,
            MessageType::Unacceptable => {
                warn!(
                    performer = %self.performer,
                    message_id = %message.id(),
                    "unacceptable message"
                );
                self.settle(message, Disposition::Reject(RejectionReason::Unacceptable))
                    .await;
                return self.count_unacceptable();
            }
            MessageType::Command | MessageType::Event | MessageType::Document => {}
        }

        let request = match self.mapper.map_to_request(&message).await {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    performer = %self.performer,
                    message_id = %message.id(),
                    error = %e,
                    "failed to map message"
                );
                self.settle(message, Disposition::Reject(RejectionReason::Unacceptable))
                    .await;
                return self.count_unacceptable();
            }
        };

        let direction = direction_of(self.subscription.pump_type);
        let (disposition, control) = match self.processor.dispatch(request, direction).await {
            Ok(()) => (Disposition::Acknowledge, LoopControl::Continue),
            Err(e) => self.on_failure(&mut message, e),
        };
        self.settle(message, disposition).await;
        control
    }

    fn on_failure(
        &self,
        message: &mut Message,
        error: BrighterError,
    ) -> (Disposition, LoopControl) {
        let message_id = message.id();
        if error.is_configuration() {
            error!(
                performer = %self.performer,
                %message_id,
                error = %error,
                "cannot dispatch, stopping performer"
            );
            return (
                Disposition::Reject(RejectionReason::DeliveryError),
                LoopControl::Close,
            );
        }

        let requested = match deferral(&error) {
            Some(delay) => {
                debug!(performer = %self.performer, %message_id, "message deferred");
                delay
            }
            None if self.subscription.on_handler_error == HandlerErrorPolicy::DeadLetter => {
                error!(
                    performer = %self.performer,
                    %message_id,
                    error = %error,
                    "handler failed, dead-lettering"
                );
                return (
                    Disposition::Reject(RejectionReason::DeliveryError),
                    LoopControl::Continue,
                );
            }
            None => {
                error!(
                    performer = %self.performer,
                    %message_id,
                    error = %error,
                    "handler failed, deferring"
                );
                None
            }
        };

        message.update_handled_count();
        if message.requeue_limit_exceeded(self.subscription.requeue_count) {
            warn!(
                performer = %self.performer,
                %message_id,
                handled = message.header.handled_count(),
                "requeue limit exceeded"
            );
            return (
                Disposition::Reject(RejectionReason::RequeueLimitExceeded),
                LoopControl::Continue,
            );
        }

        let delay = requested.unwrap_or(self.subscription.requeue_delay);
        (Disposition::Requeue { delay }, LoopControl::Continue)
    }

    async fn settle(&self, mut message: Message, disposition: Disposition) {
        let message_id = message.id();
        let result = match disposition {
            Disposition::Acknowledge => self.channel.acknowledge(&message).await,
            Disposition::Reject(reason) => self.channel.reject(&message, reason).await,
            Disposition::Requeue { delay } => {
                message.set_delayed(Some(delay));
                self.channel.requeue(message, delay).await
            }
        };
        if let Err(e) = result {
            error!(
                performer = %self.performer,
                %message_id,
                ?disposition,
                error = %e,
                "failed to settle message"
            );
        }
    }

    fn count_unacceptable(&mut self) -> LoopControl {
        self.unacceptable += 1;
        let limit = self.subscription.unacceptable_message_limit;
        if limit > 0 && self.unacceptable >= limit {
            warn!(
                performer = %self.performer,
                limit,
                "unacceptable message limit reached, stopping performer"
            );
            return LoopControl::Close;
        }
        LoopControl::Continue
    }
}

/// Sleep for `delay` unless stopped first. Returns true when stopped.
async fn pause(stop: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
        _ = tokio::time::sleep(delay) => false,
    }
}
