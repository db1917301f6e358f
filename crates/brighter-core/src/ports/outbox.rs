//! Outbox port.
//!
//! The outbox is the durability boundary of the outbox pattern: a message is
//! written in the same local transaction as the business change that caused
//! it, and a separate step sends it and marks it dispatched.
//!
//! # Contract
//! - `add` with an existing id is a no-op (the first write wins).
//! - `add` with a transaction stages the row in it; nothing is visible until commit.
//! - `mark_dispatched` is set-once: marking an already dispatched message keeps
//!   the first timestamp and does not error.
//! - `outstanding_messages` returns undispatched messages at least `min_age`
//!   old, oldest first.

use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{BrighterError, Message, MessageId};

/// A caller-owned unit of work the outbox can enlist in.
///
/// Storage drivers downcast through `as_any` to their own transaction type and
/// reject anything else with a configuration error.
pub trait BoxTransaction: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// One stored outbox row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub message: Message,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn is_dispatched(&self) -> bool {
        self.dispatched_at.is_some()
    }
}

#[async_trait]
pub trait Outbox: Send + Sync {
    async fn add(
        &self,
        message: Message,
        transaction: Option<&dyn BoxTransaction>,
    ) -> Result<(), BrighterError>;

    async fn get(&self, id: MessageId) -> Result<Option<OutboxEntry>, BrighterError>;

    async fn mark_dispatched(
        &self,
        id: MessageId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<(), BrighterError>;

    /// Undispatched messages created at least `min_age` ago, oldest first, at most `limit`.
    async fn outstanding_messages(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<Message>, BrighterError>;

    /// Messages dispatched at least `min_age` ago, oldest dispatch first, at most `limit`.
    async fn dispatched_messages(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<Message>, BrighterError>;

    async fn delete(&self, ids: &[MessageId]) -> Result<(), BrighterError>;
}
