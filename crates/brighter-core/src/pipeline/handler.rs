//! Target handler traits.
//!
//! A handler returns the request it was given (possibly enriched, e.g. a
//! query with its result filled in) tagged with whether the rest of the chain
//! should run.

use async_trait::async_trait;

use crate::domain::{BrighterError, Request};

/// Whether the chain continues after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<R> {
    /// Run the remaining (After-timed) steps with this request.
    Continue(R),
    /// Stop here and return this request to the caller.
    ShortCircuit(R),
}

impl<R> Flow<R> {
    pub fn into_inner(self) -> R {
        match self {
            Flow::Continue(r) | Flow::ShortCircuit(r) => r,
        }
    }
}

/// Async handler for one request type.
///
/// # Example
/// ```ignore
/// struct AddGreetingHandler;
///
/// #[async_trait]
/// impl RequestHandler<AddGreeting> for AddGreetingHandler {
///     async fn handle(&self, command: AddGreeting) -> Result<Flow<AddGreeting>, BrighterError> {
///         println!("{} {}", command.greeting, command.name);
///         Ok(Flow::Continue(command))
///     }
/// }
/// ```
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync {
    async fn handle(&self, request: R) -> Result<Flow<R>, BrighterError>;
}

/// Blocking handler for one request type.
///
/// Runs on the dispatching task; on a multi-threaded runtime the worker is
/// handed over to the blocking pool for the duration of the call.
pub trait SyncRequestHandler<R: Request>: Send + Sync {
    fn handle(&self, request: R) -> Result<Flow<R>, BrighterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_inner_ignores_the_tag() {
        assert_eq!(Flow::Continue(1).into_inner(), 1);
        assert_eq!(Flow::ShortCircuit(2).into_inner(), 2);
    }
}
