//! CommandProcessor: the one entry point for dispatching requests.
//!
//! In-process paths (`send`, `send_sync`, `publish`) run handler pipelines
//! directly. Durable paths (`deposit_post*`, `clear_outbox`, `post`) go
//! through the outbox: a request is mapped to a message, stored, and only
//! then handed to a producer.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    BrighterError, ClearFailure, HandlerFailure, Message, MessageId, Publication, Request,
};
use crate::pipeline::{Pipeline, PipelineBuilder, PipelineDirection};
use crate::policy::{CIRCUIT_BREAKER, PolicyAction, PolicyRegistry, RETRY_POLICY, execute_all};
use crate::ports::{BoxTransaction, Clock, MessageMapperRegistry, Outbox, ProducerRegistry};

pub struct CommandProcessor {
    pipelines: PipelineBuilder,
    mappers: MessageMapperRegistry,
    producers: ProducerRegistry,
    publications: HashMap<String, Publication>,
    outbox: Option<Arc<dyn Outbox>>,
    clock: Arc<dyn Clock>,
    clearing: Mutex<HashSet<MessageId>>,
}

/// Marks a message id as being cleared until dropped.
struct ClearClaim<'a> {
    clearing: &'a Mutex<HashSet<MessageId>>,
    id: MessageId,
}

impl Drop for ClearClaim<'_> {
    fn drop(&mut self) {
        self.clearing.lock().remove(&self.id);
    }
}

impl CommandProcessor {
    pub(crate) fn new(
        pipelines: PipelineBuilder,
        mappers: MessageMapperRegistry,
        producers: ProducerRegistry,
        publications: HashMap<String, Publication>,
        outbox: Option<Arc<dyn Outbox>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pipelines,
            mappers,
            producers,
            publications,
            outbox,
            clock,
            clearing: Mutex::new(HashSet::new()),
        }
    }

    pub fn pipelines(&self) -> &PipelineBuilder {
        &self.pipelines
    }

    pub fn mappers(&self) -> &MessageMapperRegistry {
        &self.mappers
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.pipelines.services().policies
    }

    pub fn outbox(&self) -> Result<&Arc<dyn Outbox>, BrighterError> {
        self.outbox
            .as_ref()
            .ok_or_else(|| BrighterError::configuration("no outbox configured"))
    }

    /// Async handlers when any are registered for `R`, blocking ones otherwise.
    fn direction_for<R: Request>(&self) -> PipelineDirection {
        let registry = self.pipelines.registry();
        if registry.registrations::<R>(PipelineDirection::Async).is_empty()
            && !registry.registrations::<R>(PipelineDirection::Sync).is_empty()
        {
            PipelineDirection::Sync
        } else {
            PipelineDirection::Async
        }
    }

    /// The one pipeline a point-to-point request goes through.
    ///
    /// Handlers are counted across both directions, so a blocking handler
    /// next to an async one is as ambiguous as two async ones.
    fn single_pipeline<R: Request>(
        &self,
        direction: PipelineDirection,
    ) -> Result<Pipeline<R>, BrighterError> {
        let registered = self.pipelines.registry().handler_count(R::TYPE);
        if registered > 1 {
            return Err(BrighterError::configuration(format!(
                "{registered} handlers registered for {}; send needs exactly one",
                R::TYPE
            )));
        }
        let mut pipelines = self.pipelines.build::<R>(direction)?;
        match pipelines.len() {
            1 => pipelines
                .pop()
                .ok_or_else(|| BrighterError::configuration("pipeline vanished")),
            0 => Err(BrighterError::configuration(format!(
                "no handler registered for {}",
                R::TYPE
            ))),
            n => Err(BrighterError::configuration(format!(
                "{n} handlers registered for {}; send needs exactly one",
                R::TYPE
            ))),
        }
    }

    /// Dispatch to the single handler for `R` and return the request it hands back.
    #[instrument(skip_all, fields(request_type = R::TYPE, request_id = %request.id()))]
    pub async fn send<R: Request>(&self, request: R) -> Result<R, BrighterError> {
        let pipeline = self.single_pipeline::<R>(self.direction_for::<R>())?;
        pipeline.dispatch(request).await
    }

    /// Blocking `send` through the blocking handlers registered for `R`.
    ///
    /// Must not be called from a current-thread runtime.
    pub fn send_sync<R: Request>(&self, request: R) -> Result<R, BrighterError> {
        let pipeline = self.single_pipeline::<R>(PipelineDirection::Sync)?;
        block_on(pipeline.dispatch(request))?
    }

    /// Run every handler for `R`, one after another.
    ///
    /// A failing handler does not stop the others; failures come back together
    /// as [`BrighterError::Publish`].
    #[instrument(skip_all, fields(request_type = R::TYPE, request_id = %event.id()))]
    pub async fn publish<R: Request>(&self, event: R) -> Result<(), BrighterError> {
        self.publish_in(event, self.direction_for::<R>()).await
    }

    async fn publish_in<R: Request>(
        &self,
        event: R,
        direction: PipelineDirection,
    ) -> Result<(), BrighterError> {
        let pipelines = self.pipelines.build::<R>(direction)?;
        if pipelines.is_empty() {
            debug!("no handlers for event");
            return Ok(());
        }

        let attempted = pipelines.len();
        let mut failures = Vec::new();
        for pipeline in pipelines {
            let handler = pipeline.handler().to_string();
            if let Err(error) = pipeline.dispatch(event.clone()).await {
                warn!(handler = %handler, error = %error, "event handler failed");
                failures.push(HandlerFailure { handler, error });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BrighterError::Publish {
                attempted,
                failures,
            })
        }
    }

    /// Route a request received from a channel through the handlers of
    /// `direction`: events fan out, everything else goes to its single handler.
    #[instrument(skip_all, fields(request_type = R::TYPE, request_id = %request.id()))]
    pub async fn dispatch<R: Request>(
        &self,
        request: R,
        direction: PipelineDirection,
    ) -> Result<(), BrighterError> {
        if R::KIND.is_point_to_point() {
            let pipeline = self.single_pipeline::<R>(direction)?;
            pipeline.dispatch(request).await.map(drop)
        } else {
            self.publish_in(request, direction).await
        }
    }

    fn publication<R: Request>(&self) -> Result<&Publication, BrighterError> {
        self.publications.get(R::TYPE).ok_or_else(|| {
            BrighterError::configuration(format!("no publication declared for {}", R::TYPE))
        })
    }

    async fn map_to_message<R: Request>(&self, request: &R) -> Result<Message, BrighterError> {
        let publication = self.publication::<R>()?;
        self.producers.get(&publication.topic)?;
        let mapper = self.mappers.get::<R>()?;
        mapper.map_to_message(request, publication).await
    }

    /// Store the request's message in the outbox without sending it.
    #[instrument(skip_all, fields(request_type = R::TYPE, request_id = %request.id()))]
    pub async fn deposit_post<R: Request>(&self, request: &R) -> Result<MessageId, BrighterError> {
        let outbox = self.outbox()?;
        let message = self.map_to_message(request).await?;
        let id = message.id();
        outbox.add(message, None).await?;
        debug!(message_id = %id, "deposited");
        Ok(id)
    }

    /// As [`deposit_post`](Self::deposit_post), enlisted in the caller's
    /// transaction. The message becomes visible when the caller commits.
    pub async fn deposit_post_in<R: Request>(
        &self,
        request: &R,
        transaction: &dyn BoxTransaction,
    ) -> Result<MessageId, BrighterError> {
        let outbox = self.outbox()?;
        let message = self.map_to_message(request).await?;
        let id = message.id();
        outbox.add(message, Some(transaction)).await?;
        Ok(id)
    }

    /// Deposit several requests. Stops at the first failure.
    pub async fn deposit_post_batch<R: Request>(
        &self,
        requests: &[R],
    ) -> Result<Vec<MessageId>, BrighterError> {
        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            ids.push(self.deposit_post(request).await?);
        }
        Ok(ids)
    }

    /// Send deposited messages and mark them dispatched. Returns how many were sent.
    ///
    /// Ids already dispatched, or being cleared by another caller, are skipped
    /// and not counted. Every id is attempted; failures are collected into
    /// [`BrighterError::ClearOutbox`].
    #[instrument(skip_all, fields(count = ids.len()))]
    pub async fn clear_outbox(&self, ids: &[MessageId]) -> Result<usize, BrighterError> {
        let outbox = self.outbox()?;
        let policies = self
            .policies()
            .resolve(&[RETRY_POLICY.to_string(), CIRCUIT_BREAKER.to_string()])?;

        let mut cleared = 0;
        let mut failures = Vec::new();
        for &id in ids {
            let Some(_claim) = self.claim(id) else {
                debug!(message_id = %id, "already being cleared");
                continue;
            };
            match self.clear_one(outbox.as_ref(), &policies, id).await {
                Ok(true) => cleared += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(message_id = %id, error = %error, "failed to clear message");
                    failures.push(ClearFailure {
                        message_id: id,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(cleared)
        } else {
            Err(BrighterError::ClearOutbox { cleared, failures })
        }
    }

    fn claim(&self, id: MessageId) -> Option<ClearClaim<'_>> {
        self.clearing.lock().insert(id).then_some(ClearClaim {
            clearing: &self.clearing,
            id,
        })
    }

    async fn clear_one(
        &self,
        outbox: &dyn Outbox,
        policies: &[Arc<crate::policy::Policy>],
        id: MessageId,
    ) -> Result<bool, BrighterError> {
        let entry = outbox
            .get(id)
            .await?
            .ok_or_else(|| BrighterError::Storage(format!("message {id} not found in outbox")))?;
        if entry.is_dispatched() {
            debug!(message_id = %id, "already dispatched");
            return Ok(false);
        }

        let producer = self.producers.get(entry.message.header.topic())?;
        let action: &PolicyAction<'_, ()> = &|| producer.send(&entry.message);
        execute_all(policies, action).await?;

        outbox.mark_dispatched(id, self.clock.now()).await?;
        info!(message_id = %id, topic = %entry.message.header.topic(), "message dispatched");
        Ok(true)
    }

    /// Deposit then clear at once.
    ///
    /// The deposit is durable. If the send fails the message stays
    /// outstanding for the sweeper and the caller gets a transient error.
    #[instrument(skip_all, fields(request_type = R::TYPE, request_id = %request.id()))]
    pub async fn post<R: Request>(&self, request: &R) -> Result<MessageId, BrighterError> {
        let id = self.deposit_post(request).await?;
        self.clear_outbox(&[id]).await.map_err(|error| {
            BrighterError::transient(format!(
                "message {id} deposited but not sent, left for the sweeper: {error}"
            ))
        })?;
        Ok(id)
    }

    /// Ids of messages older than `min_age` that were never dispatched.
    pub async fn outstanding(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<MessageId>, BrighterError> {
        let messages = self.outbox()?.outstanding_messages(min_age, limit).await?;
        Ok(messages.iter().map(Message::id).collect())
    }
}

fn block_on<F: Future>(future: F) -> Result<F::Output, BrighterError> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(future)))
        }
        Ok(_) => Err(BrighterError::configuration(
            "send_sync cannot block a current-thread runtime; use send",
        )),
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map(|runtime| runtime.block_on(future))
            .map_err(|e| BrighterError::transient(format!("cannot start runtime: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::CommandProcessorBuilder;
    use crate::app::builder::BuildError;
    use crate::app::testing::{AddGreeting, Calls, Failing, GreetingMade, PassThrough, Slow};
    use crate::impls::{
        InMemoryBus, InMemoryInbox, InMemoryOutbox, InMemoryProducer, InMemoryTransaction,
        JsonMessageMapper,
    };
    use crate::pipeline::{Decoration, HandlerRegistration, OnceOnlyAction};
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    struct Durable {
        processor: CommandProcessor,
        outbox: Arc<InMemoryOutbox>,
        producer: Arc<InMemoryProducer>,
        clock: Arc<FixedClock>,
    }

    fn durable() -> Durable {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()));
        let outbox = Arc::new(InMemoryOutbox::new(clock.clone()));
        let producer = Arc::new(InMemoryProducer::new(InMemoryBus::default()));
        let processor = CommandProcessorBuilder::new()
            .mapper::<AddGreeting, _>(JsonMessageMapper::<AddGreeting>::with_clock(clock.clone()))
            .producer("greetings", producer.clone())
            .publication(Publication::new("greetings", AddGreeting::TYPE))
            .outbox(outbox.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        Durable {
            processor,
            outbox,
            producer,
            clock,
        }
    }

    #[tokio::test]
    async fn send_hands_back_the_command_unchanged() {
        let calls = Calls::default();
        let handler_calls = calls.clone();
        let processor = CommandProcessorBuilder::new()
            .handle(HandlerRegistration::<AddGreeting>::of(move || {
                PassThrough(handler_calls.clone())
            }))
            .unwrap()
            .build()
            .unwrap();

        let command = AddGreeting::new("Ian", "Hello");
        let returned = processor.send(command.clone()).await.unwrap();

        assert_eq!(returned, command);
        assert_eq!(calls.count(), 1);
    }

    #[tokio::test]
    async fn send_needs_exactly_one_handler() {
        let none = CommandProcessorBuilder::new().build().unwrap();
        let err = none.send(AddGreeting::new("Ian", "Hello")).await.unwrap_err();
        assert!(err.is_configuration());

        let calls = Calls::default();
        let (a, b) = (calls.clone(), calls.clone());
        let two = CommandProcessorBuilder::new()
            .handle(
                HandlerRegistration::<AddGreeting>::of(move || PassThrough(a.clone()))
                    .named("first"),
            )
            .unwrap()
            .handle(
                HandlerRegistration::<AddGreeting>::of(move || PassThrough(b.clone()))
                    .named("second"),
            )
            .unwrap()
            .build()
            .unwrap();
        let err = two.send(AddGreeting::new("Ian", "Hello")).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(calls.count(), 0);
    }

    #[tokio::test]
    async fn send_rejects_an_async_and_a_blocking_handler_together() {
        let calls = Calls::default();
        let (a, b) = (calls.clone(), calls.clone());
        let processor = CommandProcessorBuilder::new()
            .handle(
                HandlerRegistration::<AddGreeting>::of(move || PassThrough(a.clone()))
                    .named("async"),
            )
            .unwrap()
            .handle(
                HandlerRegistration::<AddGreeting>::of_sync(move || PassThrough(b.clone()))
                    .named("blocking"),
            )
            .unwrap()
            .build()
            .unwrap();

        let command = AddGreeting::new("Ian", "Hello");
        assert!(processor.send(command.clone()).await.unwrap_err().is_configuration());
        let err = processor
            .dispatch(command, PipelineDirection::Sync)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(calls.count(), 0);
    }

    #[tokio::test]
    async fn publish_runs_every_handler_and_reports_the_failure() {
        let ok = Calls::default();
        let bad = Calls::default();
        let (first, second, failing) = (ok.clone(), ok.clone(), bad.clone());
        let processor = CommandProcessorBuilder::new()
            .handle(
                HandlerRegistration::<GreetingMade>::of(move || PassThrough(first.clone()))
                    .named("audit"),
            )
            .unwrap()
            .handle(
                HandlerRegistration::<GreetingMade>::of(move || Failing(failing.clone()))
                    .named("mailer"),
            )
            .unwrap()
            .handle(
                HandlerRegistration::<GreetingMade>::of(move || PassThrough(second.clone()))
                    .named("stats"),
            )
            .unwrap()
            .build()
            .unwrap();

        let err = processor.publish(GreetingMade::new("Hello Ian")).await.unwrap_err();

        assert_eq!(ok.count(), 2);
        assert_eq!(bad.count(), 1);
        match err {
            BrighterError::Publish { attempted, failures } => {
                assert_eq!(attempted, 3);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].handler, "mailer");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn publish_without_handlers_is_a_no_op() {
        let processor = CommandProcessorBuilder::new().build().unwrap();
        processor.publish(GreetingMade::new("Hello")).await.unwrap();
    }

    #[test]
    fn send_sync_runs_the_blocking_handler() {
        let calls = Calls::default();
        let handler_calls = calls.clone();
        let processor = CommandProcessorBuilder::new()
            .handle(HandlerRegistration::<AddGreeting>::of_sync(move || {
                PassThrough(handler_calls.clone())
            }))
            .unwrap()
            .build()
            .unwrap();

        let command = AddGreeting::new("Ian", "Hello");
        assert_eq!(processor.send_sync(command.clone()).unwrap(), command);
        assert_eq!(calls.count(), 1);
    }

    #[tokio::test]
    async fn once_only_handler_runs_once_per_request() {
        let calls = Calls::default();
        let handler_calls = calls.clone();
        let processor = CommandProcessorBuilder::new()
            .handle(
                HandlerRegistration::<AddGreeting>::of(move || PassThrough(handler_calls.clone()))
                    .decorate(Decoration::use_inbox(1, "greetings", true, OnceOnlyAction::Warn)),
            )
            .unwrap()
            .inbox(Arc::new(InMemoryInbox::new()))
            .build()
            .unwrap();

        let command = AddGreeting::new("Ian", "Hello");
        processor.send(command.clone()).await.unwrap();
        processor.send(command.clone()).await.unwrap();
        assert_eq!(calls.count(), 1);

        processor.send(AddGreeting::new("Ian", "Hello")).await.unwrap();
        assert_eq!(calls.count(), 2);
    }

    #[tokio::test]
    async fn concurrent_duplicates_run_once() {
        let (started, done) = (Calls::default(), Calls::default());
        let (s, d) = (started.clone(), done.clone());
        let inbox = Arc::new(InMemoryInbox::new());
        let processor = CommandProcessorBuilder::new()
            .handle(
                HandlerRegistration::<AddGreeting>::of(move || Slow {
                    delay: Duration::from_millis(50),
                    started: s.clone(),
                    done: d.clone(),
                })
                .decorate(Decoration::use_inbox(1, "greetings", true, OnceOnlyAction::Warn)),
            )
            .unwrap()
            .inbox(inbox.clone())
            .build()
            .unwrap();

        let command = AddGreeting::new("Ian", "Hello");
        let (first, second) = tokio::join!(
            processor.send(command.clone()),
            processor.send(command.clone())
        );

        assert_eq!(first.unwrap(), command);
        assert_eq!(second.unwrap(), command);
        assert_eq!(started.count(), 1);
        assert_eq!(done.count(), 1);
        assert_eq!(inbox.len(), 1);
    }

    #[tokio::test]
    async fn once_only_throw_reports_the_duplicate() {
        let processor = CommandProcessorBuilder::new()
            .handle(
                HandlerRegistration::<AddGreeting>::of(|| PassThrough(Calls::default()))
                    .decorate(Decoration::use_inbox(1, "greetings", true, OnceOnlyAction::Throw)),
            )
            .unwrap()
            .inbox(Arc::new(InMemoryInbox::new()))
            .build()
            .unwrap();

        let command = AddGreeting::new("Ian", "Hello");
        processor.send(command.clone()).await.unwrap();
        let err = processor.send(command).await.unwrap_err();
        assert!(matches!(err, BrighterError::OnceOnly { .. }));
    }

    #[tokio::test]
    async fn cleared_message_is_never_sent_twice() {
        let d = durable();
        let id = d.processor.deposit_post(&AddGreeting::new("Ian", "Hello")).await.unwrap();

        let entry = d.outbox.get(id).await.unwrap().unwrap();
        assert!(entry.dispatched_at.is_none());
        assert_eq!(d.producer.sent_count(), 0);

        assert_eq!(d.processor.clear_outbox(&[id]).await.unwrap(), 1);
        let entry = d.outbox.get(id).await.unwrap().unwrap();
        assert_eq!(entry.dispatched_at, Some(d.clock.now()));

        assert_eq!(d.processor.clear_outbox(&[id]).await.unwrap(), 0);
        assert_eq!(d.producer.sent_count(), 1);
    }

    #[tokio::test]
    async fn outstanding_lists_old_undispatched_messages() {
        let d = durable();
        let id = d.processor.deposit_post(&AddGreeting::new("Ian", "Hello")).await.unwrap();
        let threshold = Duration::from_secs(30);

        assert!(d.processor.outstanding(threshold, 10).await.unwrap().is_empty());
        d.clock.advance(chrono::Duration::seconds(31));
        assert_eq!(d.processor.outstanding(threshold, 10).await.unwrap(), vec![id]);

        d.processor.clear_outbox(&[id]).await.unwrap();
        assert!(d.processor.outstanding(threshold, 10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_post_leaves_the_message_outstanding() {
        let d = durable();
        d.producer.fail_next(3);

        let err = d.processor.post(&AddGreeting::new("Ian", "Hello")).await.unwrap_err();
        assert!(err.is_transient());

        let outstanding = d.processor.outstanding(Duration::ZERO, 10).await.unwrap();
        assert_eq!(outstanding.len(), 1);

        d.processor.clear_outbox(&outstanding).await.unwrap();
        assert_eq!(d.producer.sent_count(), 1);
    }

    #[tokio::test]
    async fn clear_outbox_reports_unknown_ids_and_keeps_going() {
        let d = durable();
        let known = d.processor.deposit_post(&AddGreeting::new("Ian", "Hello")).await.unwrap();
        let unknown = MessageId::generate();

        let err = d.processor.clear_outbox(&[unknown, known]).await.unwrap_err();
        match err {
            BrighterError::ClearOutbox { cleared, failures } => {
                assert_eq!(cleared, 1);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].message_id, unknown);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(d.producer.sent_count(), 1);
    }

    #[tokio::test]
    async fn deposit_in_transaction_waits_for_commit() {
        let d = durable();
        let tx = InMemoryTransaction::new();
        let id = d
            .processor
            .deposit_post_in(&AddGreeting::new("Ian", "Hello"), &tx)
            .await
            .unwrap();
        assert!(d.outbox.get(id).await.unwrap().is_none());

        tx.commit();
        assert!(d.outbox.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn batch_deposit_returns_every_id() {
        let d = durable();
        let requests = vec![AddGreeting::new("Ian", "Hello"), AddGreeting::new("Ann", "Hi")];
        let ids = d.processor.deposit_post_batch(&requests).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(d.outbox.len(), 2);
    }

    #[tokio::test]
    async fn unpublished_request_cannot_be_deposited() {
        let d = durable();
        let err = d.processor.deposit_post(&GreetingMade::new("Hello")).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn build_fails_fast_on_missing_wiring() {
        let missing = CommandProcessorBuilder::new()
            .expect_requests(&[AddGreeting::TYPE])
            .build();
        assert!(matches!(
            missing,
            Err(BuildError::MissingRequestTypes(t)) if t == vec![AddGreeting::TYPE.to_string()]
        ));

        let clock = Arc::new(FixedClock::new(Utc::now()));
        let no_mapper = CommandProcessorBuilder::new()
            .producer("greetings", Arc::new(InMemoryProducer::new(InMemoryBus::default())))
            .publication(Publication::new("greetings", AddGreeting::TYPE))
            .outbox(Arc::new(InMemoryOutbox::new(clock)))
            .build();
        assert!(matches!(no_mapper, Err(BuildError::MissingMapper(_))));

        let no_outbox = CommandProcessorBuilder::new()
            .mapper::<AddGreeting, _>(JsonMessageMapper::<AddGreeting>::new())
            .publication(Publication::new("greetings", AddGreeting::TYPE))
            .build();
        assert!(matches!(no_outbox, Err(BuildError::MissingOutbox)));
    }
}
