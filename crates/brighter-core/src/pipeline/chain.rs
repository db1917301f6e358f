//! Executable chain.
//!
//! A chain is a slice of steps. Each decorator receives a [`Next`] for the
//! steps after it and decides whether to call it. The target handler
//! continues or short-circuits through its [`Flow`].

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::runtime::{Handle, RuntimeFlavor};

use super::handler::{Flow, RequestHandler, SyncRequestHandler};
use crate::domain::{BrighterError, Request};

/// Cross-cutting step around the rest of a chain.
///
/// Return without calling `next.run` to short-circuit. `Next` is `Copy`, so a
/// retrying decorator can run the remainder more than once.
#[async_trait]
pub trait Decorator<R: Request>: Send + Sync {
    async fn handle(&self, request: R, next: Next<'_, R>) -> Result<R, BrighterError>;
}

/// The handler instance at the centre of a chain.
pub(crate) enum Target<R: Request> {
    Async(Box<dyn RequestHandler<R>>),
    Blocking(Box<dyn SyncRequestHandler<R>>),
}

impl<R: Request> Target<R> {
    async fn handle(&self, request: R) -> Result<Flow<R>, BrighterError> {
        match self {
            Target::Async(handler) => handler.handle(request).await,
            Target::Blocking(handler) => run_blocking(|| handler.handle(request)),
        }
    }
}

fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

pub(crate) enum Step<R: Request> {
    Around(Box<dyn Decorator<R>>),
    Target(Target<R>),
}

/// The remainder of a chain.
pub struct Next<'a, R: Request> {
    steps: &'a [Step<R>],
}

impl<R: Request> Clone for Next<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: Request> Copy for Next<'_, R> {}

impl<'a, R: Request> Next<'a, R> {
    pub(crate) fn new(steps: &'a [Step<R>]) -> Self {
        Self { steps }
    }

    /// Run the remaining steps. An exhausted chain returns the request as is.
    pub fn run(self, request: R) -> BoxFuture<'a, Result<R, BrighterError>> {
        Box::pin(async move {
            let Some((step, rest)) = self.steps.split_first() else {
                return Ok(request);
            };
            let next = Next { steps: rest };
            match step {
                Step::Around(decorator) => decorator.handle(request, next).await,
                Step::Target(target) => match target.handle(request).await? {
                    Flow::Continue(request) => next.run(request).await,
                    Flow::ShortCircuit(request) => Ok(request),
                },
            }
        })
    }
}
