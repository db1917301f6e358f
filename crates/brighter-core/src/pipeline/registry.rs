//! Subscriber registry: which handlers serve which request type.
//!
//! Registrations are keyed by (`Request::TYPE`, direction). Each one carries
//! a handler factory and the decorations declared for it.

use std::any::{type_name, Any};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::chain::Target;
use super::decoration::Decoration;
use super::handler::{RequestHandler, SyncRequestHandler};
use crate::domain::{BrighterError, Request};
use crate::ports::HandlerFactory;

/// Which handler flavour a chain is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineDirection {
    /// `SyncRequestHandler`s.
    Sync,
    /// `RequestHandler`s.
    Async,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler '{handler}' is already registered for request type '{request_type}'")]
    AlreadyRegistered {
        request_type: String,
        handler: String,
    },

    #[error("request type name '{0}' is used by two different Rust types")]
    TypeCollision(String),
}

impl From<RegistryError> for BrighterError {
    fn from(error: RegistryError) -> Self {
        BrighterError::configuration(error.to_string())
    }
}

pub(crate) enum HandlerSource<R: Request> {
    Async(Arc<dyn HandlerFactory<dyn RequestHandler<R>>>),
    Blocking(Arc<dyn HandlerFactory<dyn SyncRequestHandler<R>>>),
}

impl<R: Request> Clone for HandlerSource<R> {
    fn clone(&self) -> Self {
        match self {
            HandlerSource::Async(f) => HandlerSource::Async(Arc::clone(f)),
            HandlerSource::Blocking(f) => HandlerSource::Blocking(Arc::clone(f)),
        }
    }
}

impl<R: Request> HandlerSource<R> {
    pub(crate) fn direction(&self) -> PipelineDirection {
        match self {
            HandlerSource::Async(_) => PipelineDirection::Async,
            HandlerSource::Blocking(_) => PipelineDirection::Sync,
        }
    }

    pub(crate) fn create(&self) -> Result<Target<R>, BrighterError> {
        Ok(match self {
            HandlerSource::Async(factory) => Target::Async(factory.create()?),
            HandlerSource::Blocking(factory) => Target::Blocking(factory.create()?),
        })
    }

    pub(crate) fn release(&self, target: Target<R>) {
        match (self, target) {
            (HandlerSource::Async(factory), Target::Async(handler)) => factory.release(handler),
            (HandlerSource::Blocking(factory), Target::Blocking(handler)) => {
                factory.release(handler)
            }
            (_, target) => drop(target),
        }
    }
}

/// One handler for one request type, with its decorations.
pub struct HandlerRegistration<R: Request> {
    name: String,
    source: HandlerSource<R>,
    decorations: Vec<Decoration<R>>,
}

impl<R: Request> Clone for HandlerRegistration<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            source: self.source.clone(),
            decorations: self.decorations.clone(),
        }
    }
}

fn short_type_name<T: ?Sized>() -> String {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

impl<R: Request> HandlerRegistration<R> {
    /// Async handler built by `make` for every dispatch.
    pub fn of<H, F>(make: F) -> Self
    where
        H: RequestHandler<R> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let factory = move || Box::new(make()) as Box<dyn RequestHandler<R>>;
        Self {
            name: short_type_name::<H>(),
            source: HandlerSource::Async(Arc::new(factory)),
            decorations: Vec::new(),
        }
    }

    /// Blocking handler built by `make` for every dispatch.
    pub fn of_sync<H, F>(make: F) -> Self
    where
        H: SyncRequestHandler<R> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let factory = move || Box::new(make()) as Box<dyn SyncRequestHandler<R>>;
        Self {
            name: short_type_name::<H>(),
            source: HandlerSource::Blocking(Arc::new(factory)),
            decorations: Vec::new(),
        }
    }

    /// Async handler from a container-backed factory.
    pub fn from_factory(
        name: impl Into<String>,
        factory: Arc<dyn HandlerFactory<dyn RequestHandler<R>>>,
    ) -> Self {
        Self {
            name: name.into(),
            source: HandlerSource::Async(factory),
            decorations: Vec::new(),
        }
    }

    /// Blocking handler from a container-backed factory.
    pub fn from_sync_factory(
        name: impl Into<String>,
        factory: Arc<dyn HandlerFactory<dyn SyncRequestHandler<R>>>,
    ) -> Self {
        Self {
            name: name.into(),
            source: HandlerSource::Blocking(factory),
            decorations: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn decorate(mut self, decoration: Decoration<R>) -> Self {
        self.decorations.push(decoration);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PipelineDirection {
        self.source.direction()
    }

    pub fn decorations(&self) -> &[Decoration<R>] {
        &self.decorations
    }

    pub(crate) fn source(&self) -> &HandlerSource<R> {
        &self.source
    }
}

/// All handler registrations, by request type and direction.
#[derive(Default)]
pub struct SubscriberRegistry {
    entries: HashMap<(&'static str, PipelineDirection), Box<dyn Any + Send + Sync>>,
    counts: HashMap<(&'static str, PipelineDirection), usize>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R: Request>(
        &mut self,
        registration: HandlerRegistration<R>,
    ) -> Result<(), RegistryError> {
        let key = (R::TYPE, registration.direction());
        let list = self
            .entries
            .entry(key)
            .or_insert_with(|| Box::new(Vec::<HandlerRegistration<R>>::new()))
            .downcast_mut::<Vec<HandlerRegistration<R>>>()
            .ok_or_else(|| RegistryError::TypeCollision(R::TYPE.to_string()))?;
        if list.iter().any(|r| r.name == registration.name) {
            return Err(RegistryError::AlreadyRegistered {
                request_type: R::TYPE.to_string(),
                handler: registration.name,
            });
        }
        list.push(registration);
        *self.counts.entry(key).or_default() += 1;
        Ok(())
    }

    /// Registrations for `R` in `direction`, in registration order.
    pub fn registrations<R: Request>(
        &self,
        direction: PipelineDirection,
    ) -> &[HandlerRegistration<R>] {
        self.entries
            .get(&(R::TYPE, direction))
            .and_then(|e| e.downcast_ref::<Vec<HandlerRegistration<R>>>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of handlers for a request type across both directions.
    pub fn handler_count(&self, request_type: &str) -> usize {
        self.counts
            .iter()
            .filter(|((t, _), _)| *t == request_type)
            .map(|(_, n)| n)
            .sum()
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        let types: HashSet<&'static str> = self.counts.keys().map(|(t, _)| *t).collect();
        types.into_iter().collect()
    }
}
