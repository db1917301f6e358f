//! Pipeline builder and cache.
//!
//! The *shape* of a chain (which decorators, in which order, around which
//! handler) is computed once per (request type, direction) and cached. The
//! *instances* are created fresh for every dispatch from that shape, and the
//! handler is handed back to its factory when the dispatch ends.
//!
//! Ordering: Before-timed decorations by ascending step, then the handler,
//! then After-timed decorations by ascending step. Equal steps keep their
//! declaration order.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::chain::{Next, Step};
use super::decoration::{Decoration, DecoratorContext, Timing};
use super::registry::{HandlerRegistration, HandlerSource, PipelineDirection, SubscriberRegistry};
use super::PipelineServices;
use crate::domain::{BrighterError, Request};

enum StepDescriptor<R: Request> {
    Around(Decoration<R>),
    Target,
}

/// Cached shape of one handler's chain.
pub struct ChainDescriptor<R: Request> {
    handler: String,
    source: HandlerSource<R>,
    steps: Vec<StepDescriptor<R>>,
}

impl<R: Request> ChainDescriptor<R> {
    fn from_registration(registration: &HandlerRegistration<R>) -> Self {
        let sorted = |timing: Timing| {
            let mut picked: Vec<&Decoration<R>> = registration
                .decorations()
                .iter()
                .filter(|d| d.timing() == timing)
                .collect();
            picked.sort_by_key(|d| d.step());
            picked
        };

        let mut steps: Vec<StepDescriptor<R>> = sorted(Timing::Before)
            .into_iter()
            .map(|d| StepDescriptor::Around(d.clone()))
            .collect();
        steps.push(StepDescriptor::Target);
        steps.extend(
            sorted(Timing::After)
                .into_iter()
                .map(|d| StepDescriptor::Around(d.clone())),
        );

        Self {
            handler: registration.name().to_string(),
            source: registration.source().clone(),
            steps,
        }
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Step names in execution order; the handler appears under its own name.
    pub fn step_names(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|s| match s {
                StepDescriptor::Around(d) => format!("{}@{}", d.name(), d.step()),
                StepDescriptor::Target => self.handler.clone(),
            })
            .collect()
    }
}

/// A ready-to-run chain for one dispatch.
pub struct Pipeline<R: Request> {
    handler: String,
    steps: Vec<Step<R>>,
    source: HandlerSource<R>,
}

impl<R: Request> Pipeline<R> {
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Run the chain, then release the handler instance.
    pub async fn dispatch(self, request: R) -> Result<R, BrighterError> {
        let result = Next::new(&self.steps).run(request).await;
        release(&self.source, self.steps);
        result
    }
}

fn release<R: Request>(source: &HandlerSource<R>, steps: Vec<Step<R>>) {
    for step in steps {
        if let Step::Target(target) = step {
            source.release(target);
        }
    }
}

type CacheKey = (&'static str, PipelineDirection);

pub struct PipelineBuilder {
    registry: Arc<SubscriberRegistry>,
    services: PipelineServices,
    cache: RwLock<HashMap<CacheKey, Arc<dyn Any + Send + Sync>>>,
}

impl PipelineBuilder {
    pub fn new(registry: Arc<SubscriberRegistry>, services: PipelineServices) -> Self {
        Self {
            registry,
            services,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    /// Chain shapes for `R`, from the cache or built now.
    ///
    /// Two callers racing on the first build both compute the shape; the first
    /// to store it wins and both get the stored value.
    pub fn describe<R: Request>(
        &self,
        direction: PipelineDirection,
    ) -> Arc<Vec<ChainDescriptor<R>>> {
        let key = (R::TYPE, direction);
        let cached = self.cache.read().get(&key).cloned();
        let chains = cached.and_then(|entry| entry.downcast::<Vec<ChainDescriptor<R>>>().ok());
        if let Some(chains) = chains {
            return chains;
        }

        let built: Arc<Vec<ChainDescriptor<R>>> = Arc::new(
            self.registry
                .registrations::<R>(direction)
                .iter()
                .map(ChainDescriptor::from_registration)
                .collect(),
        );
        let stored = {
            let mut cache = self.cache.write();
            Arc::clone(
                cache
                    .entry(key)
                    .or_insert_with(|| Arc::clone(&built) as Arc<dyn Any + Send + Sync>),
            )
        };
        stored.downcast::<Vec<ChainDescriptor<R>>>().unwrap_or(built)
    }

    /// One fresh pipeline per registered handler for `R`.
    pub fn build<R: Request>(
        &self,
        direction: PipelineDirection,
    ) -> Result<Vec<Pipeline<R>>, BrighterError> {
        self.describe::<R>(direction)
            .iter()
            .map(|chain| self.instantiate(chain))
            .collect()
    }

    fn instantiate<R: Request>(
        &self,
        chain: &ChainDescriptor<R>,
    ) -> Result<Pipeline<R>, BrighterError> {
        let ctx = DecoratorContext {
            services: &self.services,
            handler: &chain.handler,
        };
        let mut steps = Vec::with_capacity(chain.steps.len());
        for descriptor in &chain.steps {
            let step = match descriptor {
                StepDescriptor::Around(decoration) => {
                    decoration.instantiate(&ctx).map(Step::Around)
                }
                StepDescriptor::Target => chain.source.create().map(Step::Target),
            };
            match step {
                Ok(step) => steps.push(step),
                Err(error) => {
                    release(&chain.source, steps);
                    return Err(error);
                }
            }
        }
        Ok(Pipeline {
            handler: chain.handler.clone(),
            steps,
            source: chain.source.clone(),
        })
    }

    /// Drop every cached shape.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RequestId, RequestKind};
    use crate::pipeline::{Decorator, Flow, RequestHandler, SyncRequestHandler};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    struct Traced {
        id: RequestId,
        trail: Vec<String>,
    }

    impl Traced {
        fn new() -> Self {
            Self {
                id: RequestId::generate(),
                trail: Vec::new(),
            }
        }
    }

    impl crate::domain::Request for Traced {
        const TYPE: &'static str = "test.traced";
        const KIND: RequestKind = RequestKind::Command;

        fn id(&self) -> RequestId {
            self.id
        }
    }

    struct Mark(String);

    #[async_trait]
    impl Decorator<Traced> for Mark {
        async fn handle(
            &self,
            mut request: Traced,
            next: Next<'_, Traced>,
        ) -> Result<Traced, BrighterError> {
            request.trail.push(self.0.clone());
            next.run(request).await
        }
    }

    struct Guard;

    #[async_trait]
    impl Decorator<Traced> for Guard {
        async fn handle(
            &self,
            mut request: Traced,
            _next: Next<'_, Traced>,
        ) -> Result<Traced, BrighterError> {
            request.trail.push("guard".into());
            Ok(request)
        }
    }

    fn mark(label: &str, step: u32, timing: Timing) -> Decoration<Traced> {
        let label = label.to_string();
        Decoration::custom(label.clone(), step, timing, move |_| {
            Ok(Box::new(Mark(label.clone())))
        })
    }

    struct Recorder {
        short_circuit: bool,
    }

    #[async_trait]
    impl RequestHandler<Traced> for Recorder {
        async fn handle(&self, mut request: Traced) -> Result<Flow<Traced>, BrighterError> {
            request.trail.push("handler".into());
            Ok(if self.short_circuit {
                Flow::ShortCircuit(request)
            } else {
                Flow::Continue(request)
            })
        }
    }

    struct BlockingRecorder;

    impl SyncRequestHandler<Traced> for BlockingRecorder {
        fn handle(&self, mut request: Traced) -> Result<Flow<Traced>, BrighterError> {
            request.trail.push("blocking".into());
            Ok(Flow::Continue(request))
        }
    }

    fn builder(registration: HandlerRegistration<Traced>) -> PipelineBuilder {
        let mut registry = SubscriberRegistry::new();
        registry.register(registration).unwrap();
        PipelineBuilder::new(Arc::new(registry), PipelineServices::default())
    }

    async fn run(
        builder: &PipelineBuilder,
        direction: PipelineDirection,
    ) -> Result<Traced, BrighterError> {
        let mut pipelines = builder.build::<Traced>(direction)?;
        assert_eq!(pipelines.len(), 1);
        pipelines.remove(0).dispatch(Traced::new()).await
    }

    #[tokio::test]
    async fn before_and_after_steps_run_in_ascending_order() {
        let registration = HandlerRegistration::of(|| Recorder { short_circuit: false })
            .decorate(mark("before-2", 2, Timing::Before))
            .decorate(mark("after-2", 2, Timing::After))
            .decorate(mark("before-1", 1, Timing::Before))
            .decorate(mark("after-1", 1, Timing::After));
        let builder = builder(registration);

        let traced = run(&builder, PipelineDirection::Async).await.unwrap();
        assert_eq!(
            traced.trail,
            vec!["before-1", "before-2", "handler", "after-1", "after-2"]
        );
    }

    #[tokio::test]
    async fn handler_short_circuit_skips_after_steps() {
        let registration = HandlerRegistration::of(|| Recorder { short_circuit: true })
            .decorate(mark("before", 1, Timing::Before))
            .decorate(mark("after", 1, Timing::After));
        let builder = builder(registration);

        let traced = run(&builder, PipelineDirection::Async).await.unwrap();
        assert_eq!(traced.trail, vec!["before", "handler"]);
    }

    #[tokio::test]
    async fn decorator_can_refuse_to_continue() {
        let registration = HandlerRegistration::of(|| Recorder { short_circuit: false })
            .decorate(Decoration::custom("guard", 1, Timing::Before, |_| Ok(Box::new(Guard))));
        let builder = builder(registration);

        let traced = run(&builder, PipelineDirection::Async).await.unwrap();
        assert_eq!(traced.trail, vec!["guard"]);
    }

    #[tokio::test]
    async fn blocking_handlers_form_the_sync_pipeline() {
        let registration = HandlerRegistration::of_sync(|| BlockingRecorder)
            .decorate(mark("before", 1, Timing::Before));
        let builder = builder(registration);

        assert!(builder.build::<Traced>(PipelineDirection::Async).unwrap().is_empty());
        let traced = run(&builder, PipelineDirection::Sync).await.unwrap();
        assert_eq!(traced.trail, vec!["before", "blocking"]);
    }

    #[test]
    fn shapes_are_cached_until_cleared() {
        let builder = builder(
            HandlerRegistration::of(|| Recorder { short_circuit: false })
                .decorate(Decoration::logging(1, Timing::Before)),
        );

        let first = builder.describe::<Traced>(PipelineDirection::Async);
        let second = builder.describe::<Traced>(PipelineDirection::Async);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builder.cached_entries(), 1);
        assert_eq!(first[0].step_names(), vec!["request_logging@1", "Recorder"]);

        builder.clear_cache();
        assert_eq!(builder.cached_entries(), 0);
        let third = builder.describe::<Traced>(PipelineDirection::Async);
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn unknown_policy_fails_at_build_time_of_the_dispatch() {
        let builder = builder(
            HandlerRegistration::of(|| Recorder { short_circuit: false })
                .decorate(Decoration::policy(1, &["missing"])),
        );
        let err = builder.build::<Traced>(PipelineDirection::Async).err().unwrap();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn handler_is_released_after_dispatch() {
        struct Counting(Arc<AtomicUsize>);

        impl crate::ports::HandlerFactory<dyn RequestHandler<Traced>> for Counting {
            fn create(&self) -> Result<Box<dyn RequestHandler<Traced>>, BrighterError> {
                Ok(Box::new(Recorder { short_circuit: false }))
            }

            fn release(&self, handler: Box<dyn RequestHandler<Traced>>) {
                self.0.fetch_add(1, Ordering::SeqCst);
                drop(handler);
            }
        }

        let released = Arc::new(AtomicUsize::new(0));
        let builder = builder(HandlerRegistration::from_factory(
            "recorder",
            Arc::new(Counting(Arc::clone(&released))),
        ));

        run(&builder, PipelineDirection::Async).await.unwrap();
        run(&builder, PipelineDirection::Async).await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }
}
