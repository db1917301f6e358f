//! InMemoryInbox - inbox for tests and single-process use.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{BrighterError, RequestId};
use crate::ports::{Inbox, InboxRecord};

#[derive(Default)]
pub struct InMemoryInbox {
    records: Mutex<HashMap<(RequestId, String), InboxRecord>>,
}

impl InMemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl Inbox for InMemoryInbox {
    async fn exists(
        &self,
        request_id: RequestId,
        context_key: &str,
    ) -> Result<bool, BrighterError> {
        Ok(self
            .records
            .lock()
            .contains_key(&(request_id, context_key.to_string())))
    }

    async fn add(&self, record: InboxRecord) -> Result<bool, BrighterError> {
        let key = (record.request_id, record.context_key.clone());
        Ok(match self.records.lock().entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            Entry::Occupied(_) => false,
        })
    }

    async fn get(
        &self,
        request_id: RequestId,
        context_key: &str,
    ) -> Result<Option<InboxRecord>, BrighterError> {
        Ok(self
            .records
            .lock()
            .get(&(request_id, context_key.to_string()))
            .cloned())
    }
}
