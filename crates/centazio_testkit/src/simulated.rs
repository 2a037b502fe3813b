//! An in-memory external system.
//!
//! Records are JSON objects carrying an `"id"` and an `"updated"` field. The
//! simulator owns both: it assigns ids on create and stamps `updated` from
//! the shared clock on every change, so read checkpoints behave as they would
//! against a real API.

use async_trait::async_trait;
use centazio_core::{Clock, SystemEntityId, SystemEntityTypeName, SystemName};
use centazio_engine::{HandlerResult, RawRecord, SystemApiClient};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredRecord {
    fields: Map<String, Value>,
    updated: DateTime<Utc>,
}

impl StoredRecord {
    fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<(SystemEntityTypeName, SystemEntityId), StoredRecord>,
    next_id: u64,
    outage: Option<String>,
    latency: Option<std::time::Duration>,
    creates: usize,
    updates: usize,
}

/// A fake system exposing the [`SystemApiClient`] surface.
pub struct SimulatedSystem {
    name: SystemName,
    clock: Arc<dyn Clock>,
    inner: RwLock<Inner>,
}

impl SimulatedSystem {
    /// Creates an empty system.
    pub fn new(name: impl Into<SystemName>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            clock,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// The system's name.
    pub fn name(&self) -> &SystemName {
        &self.name
    }

    /// Simulates a change made directly in the external system, creating or
    /// replacing record `id`. Returns the stamped update time.
    pub fn put(
        &self,
        entity_type: impl Into<SystemEntityTypeName>,
        id: impl Into<SystemEntityId>,
        fields: Value,
    ) -> DateTime<Utc> {
        let (entity_type, id) = (entity_type.into(), id.into());
        let fields = match fields {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        let now = self.clock.now();
        let record = stamp(fields, &id, now);
        self.inner.write().records.insert((entity_type, id), record);
        now
    }

    /// Returns the current state of record `id`.
    pub fn get(&self, entity_type: &str, id: &str) -> Option<Value> {
        let key = (SystemEntityTypeName::new(entity_type), SystemEntityId::new(id));
        self.inner.read().records.get(&key).map(StoredRecord::to_value)
    }

    /// Every record of `entity_type`, ordered by id.
    pub fn records(&self, entity_type: &str) -> Vec<Value> {
        let entity_type = SystemEntityTypeName::new(entity_type);
        self.inner
            .read()
            .records
            .iter()
            .filter(|((t, _), _)| *t == entity_type)
            .map(|(_, r)| r.to_value())
            .collect()
    }

    /// Makes every call fail with `message` until cleared with `None`.
    pub fn set_outage(&self, message: Option<&str>) {
        self.inner.write().outage = message.map(str::to_string);
    }

    /// Delays every call by `latency` (wall clock) until cleared with `None`.
    pub fn set_latency(&self, latency: Option<std::time::Duration>) {
        self.inner.write().latency = latency;
    }

    /// Number of successful create calls.
    pub fn create_calls(&self) -> usize {
        self.inner.read().creates
    }

    /// Number of successful update calls.
    pub fn update_calls(&self) -> usize {
        self.inner.read().updates
    }

    async fn check_available(&self) -> HandlerResult<()> {
        let latency = self.inner.read().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match &self.inner.read().outage {
            Some(message) => Err(format!("{} unavailable: {message}", self.name).into()),
            None => Ok(()),
        }
    }
}

fn stamp(mut fields: Map<String, Value>, id: &SystemEntityId, now: DateTime<Utc>) -> StoredRecord {
    fields.insert("id".into(), Value::String(id.as_str().to_string()));
    fields.insert("updated".into(), Value::String(now.to_rfc3339()));
    StoredRecord {
        fields,
        updated: now,
    }
}

fn parse_object(record: &str) -> HandlerResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(record)? {
        Value::Object(map) => Ok(map),
        _ => Err("record is not a JSON object".into()),
    }
}

#[async_trait]
impl SystemApiClient for SimulatedSystem {
    async fn get_updated_records_after(
        &self,
        entity_type: &SystemEntityTypeName,
        after: DateTime<Utc>,
    ) -> HandlerResult<Vec<RawRecord>> {
        self.check_available().await?;
        let inner = self.inner.read();
        let mut records: Vec<&StoredRecord> = inner
            .records
            .iter()
            .filter(|((t, _), r)| t == entity_type && r.updated > after)
            .map(|(_, r)| r)
            .collect();
        records.sort_by_key(|r| r.updated);
        Ok(records
            .into_iter()
            .map(|r| RawRecord::new(r.to_value().to_string(), r.updated))
            .collect())
    }

    async fn create(
        &self,
        entity_type: &SystemEntityTypeName,
        record: String,
    ) -> HandlerResult<SystemEntityId> {
        self.check_available().await?;
        let fields = parse_object(&record)?;
        let now = self.clock.now();

        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = SystemEntityId::new(format!(
            "{}-{}",
            self.name.as_str().to_lowercase(),
            inner.next_id
        ));
        let stored = stamp(fields, &id, now);
        inner.records.insert((entity_type.clone(), id.clone()), stored);
        inner.creates += 1;
        tracing::debug!(system = %self.name, %id, "simulated create");
        Ok(id)
    }

    async fn update(
        &self,
        entity_type: &SystemEntityTypeName,
        id: &SystemEntityId,
        record: String,
    ) -> HandlerResult<()> {
        self.check_available().await?;
        let fields = parse_object(&record)?;
        let now = self.clock.now();

        let mut inner = self.inner.write();
        let key = (entity_type.clone(), id.clone());
        if !inner.records.contains_key(&key) {
            return Err(format!("{} has no {entity_type} {id}", self.name).into());
        }
        inner.records.insert(key, stamp(fields, id, now));
        inner.updates += 1;
        tracing::debug!(system = %self.name, %id, "simulated update");
        Ok(())
    }
}
