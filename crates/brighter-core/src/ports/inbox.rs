//! Inbox port: which requests a context has already handled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BrighterError, RequestId};

/// Unique per (`request_id`, `context_key`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxRecord {
    pub request_id: RequestId,
    pub context_key: String,
    pub request_type: String,
    pub handler: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Inbox: Send + Sync {
    async fn exists(&self, request_id: RequestId, context_key: &str) -> Result<bool, BrighterError>;

    /// Store the record unless one exists for the same key.
    ///
    /// Returns `false` when the key was already present; the stored record is
    /// left untouched.
    async fn add(&self, record: InboxRecord) -> Result<bool, BrighterError>;

    async fn get(
        &self,
        request_id: RequestId,
        context_key: &str,
    ) -> Result<Option<InboxRecord>, BrighterError>;
}
