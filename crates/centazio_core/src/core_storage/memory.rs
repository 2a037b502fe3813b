//! In-memory core storage.

use super::{CoreEntityAndMeta, CoreStorage};
use crate::error::{CoreError, CoreResult};
use crate::types::{CoreEntityId, CoreEntityTypeName, SystemName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

type Table = HashMap<CoreEntityId, CoreEntityAndMeta>;

/// An in-memory core storage with one table per declared core type.
pub struct InMemoryCoreStorage {
    tables: RwLock<HashMap<CoreEntityTypeName, Table>>,
}

impl InMemoryCoreStorage {
    /// Creates storage for the declared core types.
    pub fn new(declared: impl IntoIterator<Item = CoreEntityTypeName>) -> Self {
        let tables = declared.into_iter().map(|t| (t, Table::new())).collect();
        Self {
            tables: RwLock::new(tables),
        }
    }

    fn unknown(core_type: &CoreEntityTypeName) -> CoreError {
        CoreError::UnknownCoreType(core_type.clone())
    }
}

#[async_trait]
impl CoreStorage for InMemoryCoreStorage {
    async fn get(
        &self,
        core_type: &CoreEntityTypeName,
        core_id: &CoreEntityId,
    ) -> CoreResult<Option<CoreEntityAndMeta>> {
        let tables = self.tables.read();
        let table = tables.get(core_type).ok_or_else(|| Self::unknown(core_type))?;
        Ok(table.get(core_id).cloned())
    }

    async fn get_existing(
        &self,
        core_type: &CoreEntityTypeName,
        core_ids: &[CoreEntityId],
    ) -> CoreResult<Vec<CoreEntityAndMeta>> {
        let tables = self.tables.read();
        let table = tables.get(core_type).ok_or_else(|| Self::unknown(core_type))?;
        Ok(core_ids.iter().filter_map(|id| table.get(id).cloned()).collect())
    }

    async fn get_for_write(
        &self,
        core_type: &CoreEntityTypeName,
        after: DateTime<Utc>,
        exclude_system: &SystemName,
    ) -> CoreResult<Vec<CoreEntityAndMeta>> {
        let tables = self.tables.read();
        let table = tables.get(core_type).ok_or_else(|| Self::unknown(core_type))?;
        let mut entities: Vec<CoreEntityAndMeta> = table
            .values()
            .filter(|e| e.meta.date_updated > after)
            .filter(|e| &e.meta.last_update_system != exclude_system)
            .cloned()
            .collect();
        entities.sort_by(|a, b| {
            a.meta
                .date_updated
                .cmp(&b.meta.date_updated)
                .then_with(|| a.meta.core_id.cmp(&b.meta.core_id))
        });
        Ok(entities)
    }

    async fn upsert(
        &self,
        core_type: &CoreEntityTypeName,
        entities: Vec<CoreEntityAndMeta>,
    ) -> CoreResult<Vec<CoreEntityAndMeta>> {
        let mut tables = self.tables.write();
        let table = tables.get_mut(core_type).ok_or_else(|| Self::unknown(core_type))?;

        if let Some(wrong) = entities.iter().find(|e| &e.meta.core_type != core_type) {
            return Err(CoreError::CoreTypeMismatch {
                stored: wrong.meta.core_type.clone(),
                requested: core_type.clone(),
            });
        }

        let mut saved = Vec::with_capacity(entities.len());
        for mut entity in entities {
            if let Some(existing) = table.get(&entity.meta.core_id) {
                entity.meta.date_created = existing.meta.date_created;
                entity.meta.original_system = existing.meta.original_system.clone();
                entity.meta.original_system_type = existing.meta.original_system_type.clone();
                entity.meta.original_system_id = existing.meta.original_system_id.clone();
            }
            table.insert(entity.meta.core_id.clone(), entity.clone());
            saved.push(entity);
        }
        Ok(saved)
    }

    async fn get_all(&self, core_type: &CoreEntityTypeName) -> CoreResult<Vec<CoreEntityAndMeta>> {
        let tables = self.tables.read();
        let table = tables.get(core_type).ok_or_else(|| Self::unknown(core_type))?;
        let mut all: Vec<CoreEntityAndMeta> = table.values().cloned().collect();
        all.sort_by(|a, b| a.meta.core_id.cmp(&b.meta.core_id));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_storage::CoreStorageMeta;
    use crate::entity::test_entities::Person;
    use crate::entity::CoreEntity;
    use crate::types::{SystemEntityId, SystemEntityTypeName};
    use centazio_checksum::CoreEntityChecksum;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn stored(id: &str, name: &str, system: &str, updated: i64) -> CoreEntityAndMeta {
        let person = Person {
            id: Some(CoreEntityId::new(id)),
            name: name.into(),
            updated: at(updated),
        };
        let meta = CoreStorageMeta {
            core_type: Person::core_type(),
            core_id: CoreEntityId::new(id),
            original_system: SystemName::new(system),
            original_system_type: SystemEntityTypeName::new("Contact"),
            original_system_id: SystemEntityId::new(format!("{system}-{id}")),
            display_name: name.into(),
            checksum: CoreEntityChecksum::new(name),
            date_created: at(updated),
            date_updated: at(updated),
            last_update_system: SystemName::new(system),
        };
        CoreEntityAndMeta::from_entity(&person, meta).unwrap()
    }

    fn storage() -> InMemoryCoreStorage {
        InMemoryCoreStorage::new([Person::core_type()])
    }

    #[tokio::test]
    async fn undeclared_type_is_an_error() {
        let storage = storage();
        let err = storage
            .get_all(&CoreEntityTypeName::new("Invoice"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownCoreType(_)));
    }

    #[tokio::test]
    async fn typed_round_trip_checks_core_type() {
        let storage = storage();
        storage
            .upsert(&Person::core_type(), vec![stored("1", "Jane", "Crm", 10)])
            .await
            .unwrap();
        let row = storage
            .get(&Person::core_type(), &CoreEntityId::new("1"))
            .await
            .unwrap()
            .unwrap();
        let person: Person = row.entity().unwrap();
        assert_eq!(person.name, "Jane");

        let mut wrong = row.clone();
        wrong.meta.core_type = CoreEntityTypeName::new("Invoice");
        assert!(matches!(
            wrong.entity::<Person>(),
            Err(CoreError::CoreTypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn upsert_keeps_provenance() {
        let storage = storage();
        storage
            .upsert(&Person::core_type(), vec![stored("1", "Jane", "Crm", 10)])
            .await
            .unwrap();
        storage
            .upsert(&Person::core_type(), vec![stored("1", "Janet", "Tasks", 20)])
            .await
            .unwrap();

        let row = storage
            .get(&Person::core_type(), &CoreEntityId::new("1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.meta.display_name, "Janet");
        assert_eq!(row.meta.original_system.as_str(), "Crm");
        assert_eq!(row.meta.last_update_system.as_str(), "Tasks");
        assert_eq!(row.meta.date_created, at(10));
        assert_eq!(row.meta.date_updated, at(20));
    }

    #[tokio::test]
    async fn get_for_write_excludes_target_system() {
        let storage = storage();
        storage
            .upsert(
                &Person::core_type(),
                vec![
                    stored("1", "Jane", "Crm", 10),
                    stored("2", "John", "Tasks", 20),
                    stored("3", "Old", "Tasks", 1),
                ],
            )
            .await
            .unwrap();

        let for_crm = storage
            .get_for_write(&Person::core_type(), at(5), &SystemName::new("Crm"))
            .await
            .unwrap();
        assert_eq!(for_crm.len(), 1);
        assert_eq!(for_crm[0].core_id().as_str(), "2");

        let for_tasks = storage
            .get_for_write(&Person::core_type(), at(5), &SystemName::new("Tasks"))
            .await
            .unwrap();
        assert_eq!(for_tasks.len(), 1);
        assert_eq!(for_tasks[0].core_id().as_str(), "1");
    }

    #[tokio::test]
    async fn get_existing_skips_unknown_ids() {
        let storage = storage();
        storage
            .upsert(&Person::core_type(), vec![stored("1", "Jane", "Crm", 10)])
            .await
            .unwrap();
        let found = storage
            .get_existing(
                &Person::core_type(),
                &[CoreEntityId::new("1"), CoreEntityId::new("404")],
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
