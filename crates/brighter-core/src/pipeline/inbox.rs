//! Once-only handling through the inbox.
//!
//! `UseInboxHandler` checks the inbox before running the rest of the chain
//! and records the request only after the chain succeeded, so a request that
//! failed can be processed again. Concurrent duplicates of the same
//! (request id, context key) are serialized by the [`OnceOnlyGate`]: the
//! second one waits for the first, then sees the record and skips.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::chain::{Decorator, Next};
use crate::domain::{BrighterError, Request, RequestId};
use crate::ports::{Clock, Inbox, InboxRecord};

/// What to do with a request the inbox has already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnceOnlyAction {
    /// Log and return the request without running the chain.
    #[default]
    Warn,
    /// Fail with `BrighterError::OnceOnly`.
    Throw,
}

type GateKey = (RequestId, String);

/// In-flight set keyed by (request id, context key).
#[derive(Default)]
pub struct OnceOnlyGate {
    slots: Mutex<HashMap<GateKey, Arc<AsyncMutex<()>>>>,
}

impl OnceOnlyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder of the same key is in flight.
    pub async fn enter(&self, request_id: RequestId, context_key: &str) -> GatePermit<'_> {
        let key = (request_id, context_key.to_string());
        let slot = Arc::clone(self.slots.lock().entry(key.clone()).or_default());
        let guard = slot.lock_owned().await;
        GatePermit {
            gate: self,
            key,
            guard,
        }
    }

    /// Keys currently held or awaited.
    pub fn in_flight(&self) -> usize {
        self.slots.lock().len()
    }
}

pub struct GatePermit<'a> {
    gate: &'a OnceOnlyGate,
    key: GateKey,
    guard: OwnedMutexGuard<()>,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let mut slots = self.gate.slots.lock();
        // The map and this guard are the only owners: nobody is waiting.
        if Arc::strong_count(OwnedMutexGuard::mutex(&self.guard)) <= 2 {
            slots.remove(&self.key);
        }
    }
}

pub struct UseInboxHandler {
    inbox: Arc<dyn Inbox>,
    gate: Arc<OnceOnlyGate>,
    clock: Arc<dyn Clock>,
    context_key: String,
    handler: String,
    once_only: bool,
    action: OnceOnlyAction,
}

impl UseInboxHandler {
    pub fn new(
        inbox: Arc<dyn Inbox>,
        gate: Arc<OnceOnlyGate>,
        clock: Arc<dyn Clock>,
        context_key: impl Into<String>,
        handler: impl Into<String>,
        once_only: bool,
        action: OnceOnlyAction,
    ) -> Self {
        Self {
            inbox,
            gate,
            clock,
            context_key: context_key.into(),
            handler: handler.into(),
            once_only,
            action,
        }
    }

    async fn record<R: Request>(&self, request_id: RequestId) -> Result<(), BrighterError> {
        let inserted = self
            .inbox
            .add(InboxRecord {
                request_id,
                context_key: self.context_key.clone(),
                request_type: R::TYPE.to_string(),
                handler: self.handler.clone(),
                timestamp: self.clock.now(),
            })
            .await?;
        if !inserted {
            debug!(
                request_id = %request_id,
                context_key = %self.context_key,
                "inbox already held this request"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Request> Decorator<R> for UseInboxHandler {
    async fn handle(&self, request: R, next: Next<'_, R>) -> Result<R, BrighterError> {
        let request_id = request.id();

        if !self.once_only {
            let request = next.run(request).await?;
            self.record::<R>(request_id).await?;
            return Ok(request);
        }

        let _permit = self.gate.enter(request_id, &self.context_key).await;

        if self.inbox.exists(request_id, &self.context_key).await? {
            return match self.action {
                OnceOnlyAction::Warn => {
                    warn!(
                        request_type = R::TYPE,
                        request_id = %request_id,
                        context_key = %self.context_key,
                        handler = %self.handler,
                        "request already handled, skipping"
                    );
                    Ok(request)
                }
                OnceOnlyAction::Throw => Err(BrighterError::OnceOnly {
                    request_id,
                    context_key: self.context_key.clone(),
                }),
            };
        }

        let request = next.run(request).await?;
        self.record::<R>(request_id).await?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_forgets_keys_once_released() {
        let gate = OnceOnlyGate::new();
        let id = RequestId::generate();
        {
            let _permit = gate.enter(id, "ctx").await;
            assert_eq!(gate.in_flight(), 1);
        }
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn gate_serializes_the_same_key() {
        let gate = Arc::new(OnceOnlyGate::new());
        let id = RequestId::generate();

        let first = gate.enter(id, "ctx").await;
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _permit = gate.enter(id, "ctx").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn different_contexts_do_not_block_each_other() {
        let gate = OnceOnlyGate::new();
        let id = RequestId::generate();
        let _a = gate.enter(id, "billing").await;
        let _b = gate.enter(id, "shipping").await;
        assert_eq!(gate.in_flight(), 2);
    }
}
