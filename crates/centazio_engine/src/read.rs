//! Read: external system to staged entities.

use crate::api::RawRecord;
use crate::context::OperationContext;
use crate::error::{EngineResult, HandlerResult};
use crate::operation::{Operation, OperationConfig, OperationResult};
use async_trait::async_trait;
use centazio_core::SystemEntityTypeName;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Payloads returned by a read handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadBatch {
    /// Raw payloads to stage.
    pub payloads: Vec<String>,
    /// Highest source timestamp among the payloads, if known.
    pub max_observed: Option<DateTime<Utc>>,
}

impl ReadBatch {
    /// An empty batch.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a batch from timestamped records.
    pub fn from_records(records: Vec<RawRecord>) -> Self {
        let max_observed = records.iter().map(|r| r.updated).max();
        Self {
            payloads: records.into_iter().map(|r| r.data).collect(),
            max_observed,
        }
    }
}

/// Fetches new or changed records from an external system.
#[async_trait]
pub trait ReadHandler: Send + Sync {
    /// Returns records of `system_entity_type` changed after `checkpoint`.
    async fn read(
        &self,
        system_entity_type: &SystemEntityTypeName,
        checkpoint: DateTime<Utc>,
    ) -> HandlerResult<ReadBatch>;
}

/// Stages whatever its handler returns.
///
/// The checkpoint advances to the batch's highest observed timestamp, never
/// to the current time.
pub struct ReadOperation {
    config: OperationConfig,
    system_entity_type: SystemEntityTypeName,
    handler: Arc<dyn ReadHandler>,
}

impl ReadOperation {
    /// Creates a read of `config.object`.
    pub fn new(config: OperationConfig, handler: Arc<dyn ReadHandler>) -> Self {
        let system_entity_type = SystemEntityTypeName::new(config.object.as_str());
        Self {
            config,
            system_entity_type,
            handler,
        }
    }
}

#[async_trait]
impl Operation for ReadOperation {
    fn config(&self) -> &OperationConfig {
        &self.config
    }

    #[tracing::instrument(level = "debug", skip_all, fields(system = %ctx.system, object = %ctx.object))]
    async fn run(&self, ctx: &OperationContext<'_>) -> EngineResult<OperationResult> {
        let batch = match self.handler.read(&self.system_entity_type, ctx.checkpoint).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "read handler failed");
                return Ok(OperationResult::error(
                    format!("read of {} from {} failed", self.system_entity_type, ctx.system),
                    e,
                ));
            }
        };

        let received = batch.payloads.len();
        let staged = if batch.payloads.is_empty() {
            0
        } else {
            ctx.stores()
                .staged
                .stage(ctx.system, &self.system_entity_type, batch.payloads)
                .await?
                .len()
        };

        tracing::info!(received, staged, "read complete");
        Ok(
            OperationResult::success(format!("read {received} records, staged {staged} new"))
                .with_affected(staged)
                .with_checkpoint(batch.max_observed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{contact_json, start, Harness};
    use centazio_core::{LifecycleStage, ObjectName, OperationStatus, StagedEntityStore, SystemName};
    use chrono::Duration;

    struct FixedRead(HandlerResult<Vec<RawRecord>>);

    #[async_trait]
    impl ReadHandler for FixedRead {
        async fn read(
            &self,
            _system_entity_type: &SystemEntityTypeName,
            _checkpoint: DateTime<Utc>,
        ) -> HandlerResult<ReadBatch> {
            match &self.0 {
                Ok(records) => Ok(ReadBatch::from_records(records.clone())),
                Err(e) => Err(e.to_string().into()),
            }
        }
    }

    fn records() -> Vec<RawRecord> {
        (1..=3)
            .map(|i| {
                let at = start() + Duration::minutes(i);
                RawRecord::new(contact_json(&format!("E{i}"), &format!("n{i}"), at), at)
            })
            .collect()
    }

    #[tokio::test]
    async fn stages_records_and_reports_max_timestamp() {
        let h = Harness::new();
        let (system, object) = (SystemName::new("Crm"), ObjectName::new("Contact"));
        let op = ReadOperation::new(OperationConfig::new("Contact"), Arc::new(FixedRead(Ok(records()))));

        let result = op
            .run(&h.op_ctx(&system, LifecycleStage::Read, &object, start()))
            .await
            .unwrap();

        assert_eq!(result.status, OperationStatus::Success);
        assert_eq!(result.affected, 3);
        assert_eq!(result.checkpoint, Some(start() + Duration::minutes(3)));
        assert_eq!(h.staged.len(), 3);
    }

    #[tokio::test]
    async fn redelivery_stages_nothing() {
        let h = Harness::new();
        let (system, object) = (SystemName::new("Crm"), ObjectName::new("Contact"));
        let op = ReadOperation::new(OperationConfig::new("Contact"), Arc::new(FixedRead(Ok(records()))));
        let ctx = h.op_ctx(&system, LifecycleStage::Read, &object, start());

        op.run(&ctx).await.unwrap();
        let again = op.run(&ctx).await.unwrap();
        assert_eq!(again.affected, 0);
        assert_eq!(h.staged.len(), 3);
    }

    #[tokio::test]
    async fn empty_read_keeps_checkpoint() {
        let h = Harness::new();
        let (system, object) = (SystemName::new("Crm"), ObjectName::new("Contact"));
        let op = ReadOperation::new(OperationConfig::new("Contact"), Arc::new(FixedRead(Ok(vec![]))));

        let result = op
            .run(&h.op_ctx(&system, LifecycleStage::Read, &object, start()))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.checkpoint, None);
    }

    #[tokio::test]
    async fn handler_failure_is_an_error_result() {
        let h = Harness::new();
        let (system, object) = (SystemName::new("Crm"), ObjectName::new("Contact"));
        let op = ReadOperation::new(
            OperationConfig::new("Contact"),
            Arc::new(FixedRead(Err("connection refused".into()))),
        );

        let result = op
            .run(&h.op_ctx(&system, LifecycleStage::Read, &object, start()))
            .await
            .unwrap();
        assert_eq!(result.status, OperationStatus::Error);
        assert!(result.is_abort());
        assert_eq!(result.exception.as_deref(), Some("connection refused"));
        assert!(h
            .staged
            .get(&system, &"Contact".into(), start(), true)
            .await
            .unwrap()
            .is_empty());
    }
}
