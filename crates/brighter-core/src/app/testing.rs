//! Requests, handlers and wiring shared by the app tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{BrighterError, Request, RequestId, RequestKind};
use crate::pipeline::{Flow, RequestHandler, SyncRequestHandler};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddGreeting {
    pub id: RequestId,
    pub name: String,
    pub greeting: String,
}

impl AddGreeting {
    pub fn new(name: &str, greeting: &str) -> Self {
        Self {
            id: RequestId::generate(),
            name: name.to_string(),
            greeting: greeting.to_string(),
        }
    }
}

impl Request for AddGreeting {
    const TYPE: &'static str = "greetings.add_greeting";
    const KIND: RequestKind = RequestKind::Command;

    fn id(&self) -> RequestId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreetingMade {
    pub id: RequestId,
    pub text: String,
}

impl GreetingMade {
    pub fn new(text: &str) -> Self {
        Self {
            id: RequestId::generate(),
            text: text.to_string(),
        }
    }
}

impl Request for GreetingMade {
    const TYPE: &'static str = "greetings.greeting_made";
    const KIND: RequestKind = RequestKind::Event;

    fn id(&self) -> RequestId {
        self.id
    }
}

/// Shared invocation counter.
#[derive(Debug, Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Returns the request unchanged.
pub struct PassThrough(pub Calls);

#[async_trait]
impl<R: Request> RequestHandler<R> for PassThrough {
    async fn handle(&self, request: R) -> Result<Flow<R>, BrighterError> {
        self.0.hit();
        Ok(Flow::Continue(request))
    }
}

impl<R: Request> SyncRequestHandler<R> for PassThrough {
    fn handle(&self, request: R) -> Result<Flow<R>, BrighterError> {
        self.0.hit();
        Ok(Flow::Continue(request))
    }
}

/// Always fails with a permanent handler error.
pub struct Failing(pub Calls);

#[async_trait]
impl<R: Request> RequestHandler<R> for Failing {
    async fn handle(&self, _request: R) -> Result<Flow<R>, BrighterError> {
        self.0.hit();
        Err(BrighterError::handler("Failing", "boom"))
    }
}

/// Always asks for redelivery.
pub struct Deferring(pub Calls);

#[async_trait]
impl<R: Request> RequestHandler<R> for Deferring {
    async fn handle(&self, _request: R) -> Result<Flow<R>, BrighterError> {
        self.0.hit();
        Err(BrighterError::defer())
    }
}

/// Takes `delay` to finish. `started` counts entries, `done` completions.
pub struct Slow {
    pub delay: Duration,
    pub started: Calls,
    pub done: Calls,
}

#[async_trait]
impl<R: Request> RequestHandler<R> for Slow {
    async fn handle(&self, request: R) -> Result<Flow<R>, BrighterError> {
        self.started.hit();
        tokio::time::sleep(self.delay).await;
        self.done.hit();
        Ok(Flow::Continue(request))
    }
}

/// Yield until `check` holds, giving spawned tasks a chance to run.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
