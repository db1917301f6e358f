//! CommandProcessorBuilder: wiring and startup validation.
//!
//! Handlers, mappers, producers, publications and stores are collected here;
//! `build()` checks that everything declared can actually be served and fails
//! fast with a [`BuildError`] otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use super::command_processor::CommandProcessor;
use crate::domain::{BrighterError, Publication, Request, RoutingKey, SubscriptionName};
use crate::pipeline::{
    HandlerRegistration, PipelineBuilder, PipelineServices, RegistryError, SubscriberRegistry,
};
use crate::policy::{Policy, PolicyRegistry};
use crate::ports::{
    AsyncMessageMapper, Clock, Inbox, MessageMapper, MessageMapperRegistry, MessageProducer, Outbox,
    ProducerRegistry, SystemClock,
};

/// Builds a [`CommandProcessor`].
///
/// # Example
/// ```ignore
/// let processor = CommandProcessorBuilder::new()
///     .handle(HandlerRegistration::<AddGreeting>::of(|| AddGreetingHandler))?
///     .mapper::<AddGreeting, _>(JsonMessageMapper::new())
///     .producer("greetings", producer)
///     .publication(Publication::new("greetings", AddGreeting::TYPE))
///     .outbox(outbox)
///     .expect_requests(&[AddGreeting::TYPE])
///     .build()?;
/// ```
pub struct CommandProcessorBuilder {
    registry: SubscriberRegistry,
    policies: PolicyRegistry,
    mappers: MessageMapperRegistry,
    producers: ProducerRegistry,
    publications: Vec<Publication>,
    outbox: Option<Arc<dyn Outbox>>,
    inbox: Option<Arc<dyn Inbox>>,
    clock: Arc<dyn Clock>,
    expected_requests: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing handlers for request types: {0:?}")]
    MissingRequestTypes(Vec<String>),

    #[error("no message mapper registered for {0}")]
    MissingMapper(String),

    #[error("no producer registered for topic {0}")]
    MissingProducer(RoutingKey),

    #[error("publications are declared but no outbox is configured")]
    MissingOutbox,

    #[error("{0} is published twice")]
    DuplicatePublication(String),

    #[error("subscription {name} is invalid: {reason}")]
    InvalidSubscription { name: SubscriptionName, reason: String },

    #[error("subscription {0} is declared twice")]
    DuplicateSubscription(SubscriptionName),
}

impl From<BuildError> for BrighterError {
    fn from(error: BuildError) -> Self {
        BrighterError::configuration(error.to_string())
    }
}

impl CommandProcessorBuilder {
    pub fn new() -> Self {
        Self {
            registry: SubscriberRegistry::new(),
            policies: PolicyRegistry::with_defaults(),
            mappers: MessageMapperRegistry::new(),
            producers: ProducerRegistry::new(),
            publications: Vec::new(),
            outbox: None,
            inbox: None,
            clock: Arc::new(SystemClock),
            expected_requests: None,
        }
    }

    pub fn handle<R: Request>(
        mut self,
        registration: HandlerRegistration<R>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(registration)?;
        Ok(self)
    }

    /// Replace the whole policy registry.
    pub fn policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    pub fn policy(mut self, name: impl Into<String>, policy: Policy) -> Self {
        self.policies.add(name, policy);
        self
    }

    pub fn mapper<R: Request, M: MessageMapper<R> + 'static>(mut self, mapper: M) -> Self {
        self.mappers.register::<R, M>(mapper);
        self
    }

    pub fn async_mapper<R: Request, M: AsyncMessageMapper<R> + 'static>(
        mut self,
        mapper: M,
    ) -> Self {
        self.mappers.register_async::<R, M>(mapper);
        self
    }

    pub fn producer(
        mut self,
        topic: impl Into<RoutingKey>,
        producer: Arc<dyn MessageProducer>,
    ) -> Self {
        self.producers.register(topic, producer);
        self
    }

    pub fn publication(mut self, publication: Publication) -> Self {
        self.publications.push(publication);
        self
    }

    pub fn outbox(mut self, outbox: Arc<dyn Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn inbox(mut self, inbox: Arc<dyn Inbox>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Request types that must have at least one handler when `build` runs.
    pub fn expect_requests(mut self, request_types: &[&str]) -> Self {
        self.expected_requests = Some(request_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<CommandProcessor, BuildError> {
        if let Some(expected) = &self.expected_requests {
            let registered = self.registry.registered_types();
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !registered.contains(&t.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingRequestTypes(missing));
            }
        }

        if !self.publications.is_empty() && self.outbox.is_none() {
            return Err(BuildError::MissingOutbox);
        }
        let mut publications = HashMap::new();
        for publication in self.publications {
            if !self.mappers.contains(&publication.request_type) {
                return Err(BuildError::MissingMapper(publication.request_type));
            }
            if self.producers.get(&publication.topic).is_err() {
                return Err(BuildError::MissingProducer(publication.topic));
            }
            if publications.contains_key(&publication.request_type) {
                return Err(BuildError::DuplicatePublication(publication.request_type));
            }
            publications.insert(publication.request_type.clone(), publication);
        }

        let mut services = PipelineServices::new(Arc::new(self.policies), Arc::clone(&self.clock));
        if let Some(inbox) = self.inbox {
            services = services.with_inbox(inbox);
        }
        let pipelines = PipelineBuilder::new(Arc::new(self.registry), services);

        Ok(CommandProcessor::new(
            pipelines,
            self.mappers,
            self.producers,
            publications,
            self.outbox,
            self.clock,
        ))
    }
}

impl Default for CommandProcessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
