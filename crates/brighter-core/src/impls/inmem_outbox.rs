//! InMemoryOutbox - outbox for tests and single-process use.
//!
//! Rows live in a `HashMap` keyed by message id behind a `parking_lot` lock;
//! every operation is a short critical section, so concurrent adds and marks
//! are atomic. Ages are computed from the injected clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use super::transaction::InMemoryTransaction;
use crate::domain::{BrighterError, Message, MessageId};
use crate::ports::{BoxTransaction, Clock, Outbox, OutboxEntry};

type Rows = Arc<Mutex<HashMap<MessageId, OutboxEntry>>>;

pub struct InMemoryOutbox {
    rows: Rows,
    clock: Arc<dyn Clock>,
}

impl InMemoryOutbox {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    fn insert(rows: &Rows, message: Message, created_at: DateTime<Utc>) {
        rows.lock().entry(message.id()).or_insert(OutboxEntry {
            message,
            created_at,
            dispatched_at: None,
        });
    }

    fn cutoff(&self, min_age: Duration) -> Result<DateTime<Utc>, BrighterError> {
        let age = chrono::Duration::from_std(min_age)
            .map_err(|e| BrighterError::configuration(format!("outbox age out of range: {e}")))?;
        Ok(self.clock.now() - age)
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn add(
        &self,
        message: Message,
        transaction: Option<&dyn BoxTransaction>,
    ) -> Result<(), BrighterError> {
        let created_at = self.clock.now();
        match transaction {
            None => Self::insert(&self.rows, message, created_at),
            Some(tx) => {
                let tx = tx
                    .as_any()
                    .downcast_ref::<InMemoryTransaction>()
                    .ok_or_else(|| {
                        BrighterError::configuration(
                            "in-memory outbox can only enlist in an InMemoryTransaction",
                        )
                    })?;
                let rows = Arc::clone(&self.rows);
                tx.stage(move || Self::insert(&rows, message, created_at));
            }
        }
        Ok(())
    }

    async fn get(&self, id: MessageId) -> Result<Option<OutboxEntry>, BrighterError> {
        Ok(self.rows.lock().get(&id).cloned())
    }

    async fn mark_dispatched(
        &self,
        id: MessageId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<(), BrighterError> {
        match self.rows.lock().get_mut(&id) {
            Some(entry) => {
                entry.dispatched_at.get_or_insert(dispatched_at);
            }
            None => debug!(message_id = %id, "mark_dispatched on unknown message"),
        }
        Ok(())
    }

    async fn outstanding_messages(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<Message>, BrighterError> {
        let cutoff = self.cutoff(min_age)?;
        let rows = self.rows.lock();
        let mut due: Vec<&OutboxEntry> = rows
            .values()
            .filter(|e| e.dispatched_at.is_none() && e.created_at <= cutoff)
            .collect();
        due.sort_by_key(|e| (e.created_at, e.message.id()));
        Ok(due.into_iter().take(limit).map(|e| e.message.clone()).collect())
    }

    async fn dispatched_messages(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<Message>, BrighterError> {
        let cutoff = self.cutoff(min_age)?;
        let rows = self.rows.lock();
        let mut done: Vec<(DateTime<Utc>, &OutboxEntry)> = rows
            .values()
            .filter_map(|e| e.dispatched_at.map(|at| (at, e)))
            .filter(|(at, _)| *at <= cutoff)
            .collect();
        done.sort_by_key(|(at, e)| (*at, e.message.id()));
        Ok(done.into_iter().take(limit).map(|(_, e)| e.message.clone()).collect())
    }

    async fn delete(&self, ids: &[MessageId]) -> Result<(), BrighterError> {
        let mut rows = self.rows.lock();
        for id in ids {
            rows.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageBody, MessageHeader, MessageType, RoutingKey};
    use crate::ports::FixedClock;
    use chrono::TimeZone;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()))
    }

    fn message(clock: &FixedClock) -> Message {
        Message::new(
            MessageHeader::new(
                MessageId::generate(),
                RoutingKey::new("greetings"),
                MessageType::Command,
                clock.now(),
            ),
            MessageBody::new(b"{}".to_vec()),
        )
    }

    #[tokio::test]
    async fn duplicate_add_keeps_the_first_row() {
        let clock = clock();
        let outbox = InMemoryOutbox::new(clock.clone());
        let msg = message(&clock);

        outbox.add(msg.clone(), None).await.unwrap();
        clock.advance(chrono::Duration::seconds(5));
        outbox.add(msg.clone(), None).await.unwrap();

        let entry = outbox.get(msg.id()).await.unwrap().unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(entry.created_at, clock.now() - chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn mark_dispatched_is_set_once() {
        let clock = clock();
        let outbox = InMemoryOutbox::new(clock.clone());
        let msg = message(&clock);
        outbox.add(msg.clone(), None).await.unwrap();

        let first = clock.now();
        outbox.mark_dispatched(msg.id(), first).await.unwrap();
        outbox
            .mark_dispatched(msg.id(), first + chrono::Duration::seconds(10))
            .await
            .unwrap();

        let entry = outbox.get(msg.id()).await.unwrap().unwrap();
        assert_eq!(entry.dispatched_at, Some(first));
    }

    #[tokio::test]
    async fn outstanding_respects_age_and_dispatch() {
        let clock = clock();
        let outbox = InMemoryOutbox::new(clock.clone());
        let old = message(&clock);
        outbox.add(old.clone(), None).await.unwrap();
        clock.advance(chrono::Duration::seconds(10));
        let fresh = message(&clock);
        outbox.add(fresh.clone(), None).await.unwrap();

        let due = outbox
            .outstanding_messages(Duration::from_secs(5), 100)
            .await
            .unwrap();
        assert_eq!(due.iter().map(Message::id).collect::<Vec<_>>(), vec![old.id()]);

        outbox.mark_dispatched(old.id(), clock.now()).await.unwrap();
        let due = outbox
            .outstanding_messages(Duration::from_secs(5), 100)
            .await
            .unwrap();
        assert!(due.is_empty());

        clock.advance(chrono::Duration::seconds(60));
        let archived = outbox
            .dispatched_messages(Duration::from_secs(30), 100)
            .await
            .unwrap();
        assert_eq!(archived.len(), 1);
        outbox.delete(&[old.id()]).await.unwrap();
        assert!(outbox.get(old.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transactional_add_is_invisible_until_commit() {
        let clock = clock();
        let outbox = InMemoryOutbox::new(clock.clone());
        let msg = message(&clock);

        let tx = InMemoryTransaction::new();
        outbox.add(msg.clone(), Some(&tx)).await.unwrap();
        assert!(outbox.get(msg.id()).await.unwrap().is_none());

        tx.commit();
        assert!(outbox.get(msg.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rolled_back_add_never_appears() {
        let clock = clock();
        let outbox = InMemoryOutbox::new(clock.clone());
        let msg = message(&clock);

        let tx = InMemoryTransaction::new();
        outbox.add(msg.clone(), Some(&tx)).await.unwrap();
        tx.rollback();
        assert!(outbox.is_empty());
    }
}
