//! Boundary with external systems.
//!
//! Concrete clients (HTTP, SDK, file drops) live outside the engine. Read
//! and Write handlers wrap a [`SystemApiClient`] for their system.

use crate::error::HandlerResult;
use async_trait::async_trait;
use centazio_core::{SystemEntityId, SystemEntityTypeName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw record as returned by an external system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// The payload exactly as received.
    pub data: String,
    /// When the external system last changed the record.
    pub updated: DateTime<Utc>,
}

impl RawRecord {
    /// Creates a record.
    pub fn new(data: impl Into<String>, updated: DateTime<Utc>) -> Self {
        Self {
            data: data.into(),
            updated,
        }
    }
}

/// Client for one external system.
///
/// Timeouts and retries of individual calls are the client's business; the
/// engine retries on the next scheduled tick.
#[async_trait]
pub trait SystemApiClient: Send + Sync {
    /// Returns records of `entity_type` changed after `after`.
    async fn get_updated_records_after(
        &self,
        entity_type: &SystemEntityTypeName,
        after: DateTime<Utc>,
    ) -> HandlerResult<Vec<RawRecord>>;

    /// Creates a record and returns the id the system assigned.
    async fn create(
        &self,
        entity_type: &SystemEntityTypeName,
        record: String,
    ) -> HandlerResult<SystemEntityId>;

    /// Replaces an existing record.
    async fn update(
        &self,
        entity_type: &SystemEntityTypeName,
        id: &SystemEntityId,
        record: String,
    ) -> HandlerResult<()>;
}
