//! A sample customer domain wired through the full pipeline.
//!
//! Every simulated system stores customers as
//! `{"id", "name", "email", "updated"}` under its own entity type name.
//! [`CustomerSystem`] builds the Read, Promote and Write functions for one
//! such system.

use crate::simulated::SimulatedSystem;
use async_trait::async_trait;
use centazio_core::{
    CoreEntity, CoreEntityId, CoreEntityTypeName, LifecycleStage, SystemEntity, SystemEntityId,
    SystemEntityTypeName, SystemName,
};
use centazio_engine::{
    Function, HandlerResult, ObjectChangeTrigger, OperationConfig, PromoteHandler,
    PromoteOperation, PromotionDecision, ReadBatch, ReadHandler, ReadOperation, SystemApiClient,
    WriteHandler, WriteOperation,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Reason recorded on staged customers that cannot be promoted.
pub const MISSING_EMAIL: &str = "missing email";

/// The canonical customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Core id.
    pub id: Option<CoreEntityId>,
    /// Full name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl CoreEntity for Customer {
    fn core_type() -> CoreEntityTypeName {
        CoreEntityTypeName::new("Customer")
    }

    fn core_id(&self) -> Option<&CoreEntityId> {
        self.id.as_ref()
    }

    fn set_core_id(&mut self, id: CoreEntityId) {
        self.id = Some(id);
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn checksum_subject(&self) -> Value {
        json!({ "name": self.name, "email": self.email })
    }
}

/// A customer as an external system stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCustomer {
    /// Id assigned by the external system.
    pub id: Option<SystemEntityId>,
    /// Full name.
    pub name: String,
    /// Email address, empty when the system has none.
    #[serde(default)]
    pub email: String,
    /// Last change in the external system.
    pub updated: DateTime<Utc>,
}

impl SystemEntity for ExternalCustomer {
    fn system_id(&self) -> Option<&SystemEntityId> {
        self.id.as_ref()
    }

    fn set_system_id(&mut self, id: SystemEntityId) {
        self.id = Some(id);
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.updated
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn checksum_subject(&self) -> Value {
        json!({ "name": self.name, "email": self.email })
    }
}

/// Reads changed records through a [`SystemApiClient`].
pub struct ApiReader {
    api: Arc<dyn SystemApiClient>,
}

impl ApiReader {
    /// Creates a reader.
    pub fn new(api: Arc<dyn SystemApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ReadHandler for ApiReader {
    async fn read(
        &self,
        system_entity_type: &SystemEntityTypeName,
        checkpoint: DateTime<Utc>,
    ) -> HandlerResult<ReadBatch> {
        let records = self
            .api
            .get_updated_records_after(system_entity_type, checkpoint)
            .await?;
        Ok(ReadBatch::from_records(records))
    }
}

/// Promotes external customers, ignoring those without an email.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerPromoter;

#[async_trait]
impl PromoteHandler for CustomerPromoter {
    type System = ExternalCustomer;
    type Core = Customer;

    async fn promote(
        &self,
        system_entity: ExternalCustomer,
        existing: Option<Customer>,
    ) -> HandlerResult<PromotionDecision<Customer>> {
        if system_entity.email.trim().is_empty() {
            return Ok(PromotionDecision::Ignore(MISSING_EMAIL.to_string()));
        }
        Ok(PromotionDecision::Promote(Customer {
            id: existing.and_then(|c| c.id),
            name: system_entity.name,
            email: system_entity.email.trim().to_lowercase(),
        }))
    }
}

/// Writes customers to one external system.
pub struct CustomerWriter {
    api: Arc<dyn SystemApiClient>,
    entity_type: SystemEntityTypeName,
}

impl CustomerWriter {
    /// Creates a writer targeting `entity_type`.
    pub fn new(api: Arc<dyn SystemApiClient>, entity_type: impl Into<SystemEntityTypeName>) -> Self {
        Self {
            api,
            entity_type: entity_type.into(),
        }
    }
}

#[async_trait]
impl WriteHandler for CustomerWriter {
    type Core = Customer;
    type System = ExternalCustomer;

    async fn convert(
        &self,
        core: &Customer,
        system_id: Option<&SystemEntityId>,
    ) -> HandlerResult<ExternalCustomer> {
        Ok(ExternalCustomer {
            id: system_id.cloned(),
            name: core.name.clone(),
            email: core.email.clone(),
            updated: DateTime::<Utc>::UNIX_EPOCH,
        })
    }

    async fn create(&self, mut entity: ExternalCustomer) -> HandlerResult<ExternalCustomer> {
        let id = self
            .api
            .create(&self.entity_type, serde_json::to_string(&entity)?)
            .await?;
        entity.id = Some(id);
        Ok(entity)
    }

    async fn update(&self, entity: ExternalCustomer) -> HandlerResult<()> {
        let id = entity
            .id
            .clone()
            .ok_or_else(|| format!("{} has no id", entity.name))?;
        self.api
            .update(&self.entity_type, &id, serde_json::to_string(&entity)?)
            .await
    }
}

/// One simulated system holding customers under `entity_type`.
pub struct CustomerSystem {
    api: Arc<SimulatedSystem>,
    entity_type: SystemEntityTypeName,
}

impl CustomerSystem {
    /// Wraps `api`.
    pub fn new(api: Arc<SimulatedSystem>, entity_type: impl Into<SystemEntityTypeName>) -> Self {
        Self {
            api,
            entity_type: entity_type.into(),
        }
    }

    /// The simulated system.
    pub fn api(&self) -> &Arc<SimulatedSystem> {
        &self.api
    }

    /// The system's name.
    pub fn system(&self) -> &SystemName {
        self.api.name()
    }

    /// The customer entity type in this system.
    pub fn entity_type(&self) -> &SystemEntityTypeName {
        &self.entity_type
    }

    /// Conventional function name, e.g. `crm-read`.
    pub fn function_name(&self, stage: LifecycleStage) -> String {
        format!(
            "{}-{}",
            self.system().as_str().to_lowercase(),
            stage.to_string().to_lowercase()
        )
    }

    /// The change trigger this system's `stage` emits for customers.
    pub fn change(&self, stage: LifecycleStage) -> ObjectChangeTrigger {
        match stage {
            LifecycleStage::Write => {
                ObjectChangeTrigger::new(self.system().clone(), stage, Customer::core_type())
            }
            _ => ObjectChangeTrigger::new(self.system().clone(), stage, self.entity_type.clone()),
        }
    }

    /// A Read function on `cron`.
    pub fn read_function(&self, cron: &str) -> Function {
        let config = OperationConfig::new(self.entity_type.clone()).with_cron(cron);
        let api: Arc<dyn SystemApiClient> = self.api.clone();
        Function::new(
            self.function_name(LifecycleStage::Read),
            self.system().clone(),
            LifecycleStage::Read,
        )
        .with_operation(ReadOperation::new(config, Arc::new(ApiReader::new(api))))
    }

    /// A Promote function fired by this system's reads.
    pub fn promote_function(&self) -> Function {
        let config = OperationConfig::new(self.entity_type.clone())
            .with_trigger(self.change(LifecycleStage::Read));
        Function::new(
            self.function_name(LifecycleStage::Promote),
            self.system().clone(),
            LifecycleStage::Promote,
        )
        .with_operation(PromoteOperation::new(config, CustomerPromoter))
    }

    /// A Write function fired by promotions in `sources`.
    pub fn write_function(&self, sources: &[&CustomerSystem]) -> Function {
        let config = sources.iter().fold(
            OperationConfig::new(Customer::core_type()),
            |config, source| config.with_trigger(source.change(LifecycleStage::Promote)),
        );
        let api: Arc<dyn SystemApiClient> = self.api.clone();
        Function::new(
            self.function_name(LifecycleStage::Write),
            self.system().clone(),
            LifecycleStage::Write,
        )
        .with_operation(WriteOperation::new(
            config,
            CustomerWriter::new(api, self.entity_type.clone()),
        ))
    }

    /// Simulates a customer entered directly in this system.
    pub fn put_customer(&self, id: &str, name: &str, email: &str) -> DateTime<Utc> {
        self.api.put(
            self.entity_type.clone(),
            id,
            json!({ "name": name, "email": email }),
        )
    }

    /// The customers currently held by this system.
    pub fn customers(&self) -> Vec<ExternalCustomer> {
        self.api
            .records(self.entity_type.as_str())
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect()
    }
}
