//! Declarative decorator descriptors.
//!
//! A [`Decoration`] says which decorator to splice into a handler's chain, at
//! which step and on which side of the handler. Descriptors are attached when
//! the handler is registered and evaluated once per pipeline shape; the
//! decorator instance itself is created for every dispatch.

use std::fmt;
use std::sync::Arc;

use super::chain::Decorator;
use super::inbox::{OnceOnlyAction, UseInboxHandler};
use super::logging::RequestLoggingHandler;
use super::policy_handler::PolicyHandler;
use super::PipelineServices;
use crate::domain::{BrighterError, Request};

/// Side of the target handler a decorator runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timing {
    Before,
    After,
}

/// What a decorator factory gets to build its instance from.
pub struct DecoratorContext<'a> {
    pub services: &'a PipelineServices,
    /// Registered name of the handler being decorated.
    pub handler: &'a str,
}

pub type DecoratorFactory<R> =
    dyn Fn(&DecoratorContext<'_>) -> Result<Box<dyn Decorator<R>>, BrighterError> + Send + Sync;

pub struct Decoration<R: Request> {
    name: String,
    step: u32,
    timing: Timing,
    factory: Arc<DecoratorFactory<R>>,
}

impl<R: Request> Clone for Decoration<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            step: self.step,
            timing: self.timing,
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<R: Request> fmt::Debug for Decoration<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoration")
            .field("name", &self.name)
            .field("step", &self.step)
            .field("timing", &self.timing)
            .finish()
    }
}

impl<R: Request> Decoration<R> {
    /// Any decorator. `factory` runs once per dispatch.
    pub fn custom<F>(name: impl Into<String>, step: u32, timing: Timing, factory: F) -> Self
    where
        F: Fn(&DecoratorContext<'_>) -> Result<Box<dyn Decorator<R>>, BrighterError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            step,
            timing,
            factory: Arc::new(factory),
        }
    }

    /// Log request type, id, handler and elapsed time.
    pub fn logging(step: u32, timing: Timing) -> Self {
        Self::custom("request_logging", step, timing, move |ctx| {
            Ok(Box::new(RequestLoggingHandler::new(ctx.handler, timing)))
        })
    }

    /// Run the rest of the chain under the named policies, first name outermost.
    ///
    /// An unknown name fails the dispatch with a configuration error.
    pub fn policy(step: u32, names: &[&str]) -> Self {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        Self::custom("policy", step, Timing::Before, move |ctx| {
            let policies = ctx.services.policies.resolve(&names)?;
            Ok(Box::new(PolicyHandler::new(policies)))
        })
    }

    /// Record the request in the inbox after it succeeds and, when
    /// `once_only`, skip requests the inbox has already seen for `context_key`.
    pub fn use_inbox(
        step: u32,
        context_key: impl Into<String>,
        once_only: bool,
        action: OnceOnlyAction,
    ) -> Self {
        let context_key = context_key.into();
        Self::custom("use_inbox", step, Timing::Before, move |ctx| {
            let inbox = ctx.services.inbox.clone().ok_or_else(|| {
                BrighterError::configuration(format!(
                    "handler {} uses the inbox but no inbox is configured",
                    ctx.handler
                ))
            })?;
            Ok(Box::new(UseInboxHandler::new(
                inbox,
                Arc::clone(&ctx.services.once_only),
                Arc::clone(&ctx.services.clock),
                context_key.clone(),
                ctx.handler,
                once_only,
                action,
            )))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub(crate) fn instantiate(
        &self,
        ctx: &DecoratorContext<'_>,
    ) -> Result<Box<dyn Decorator<R>>, BrighterError> {
        (self.factory)(ctx)
    }
}
