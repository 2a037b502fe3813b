//! In-memory control repository.

use super::{CtlRepository, ObjectState, StartOutcome, SystemRunStatus, SystemState};
use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::types::{LifecycleStage, ObjectName, SystemName};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type SystemKey = (SystemName, LifecycleStage);
type ObjectKey = (SystemName, LifecycleStage, ObjectName);

/// An in-memory control repository.
pub struct InMemoryCtlRepository {
    systems: RwLock<HashMap<SystemKey, SystemState>>,
    objects: RwLock<HashMap<ObjectKey, ObjectState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCtlRepository {
    /// Creates an empty repository.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            systems: RwLock::new(HashMap::new()),
            objects: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn object_key(state: &ObjectState) -> ObjectKey {
        (state.system.clone(), state.stage, state.object.clone())
    }
}

#[async_trait]
impl CtlRepository for InMemoryCtlRepository {
    async fn get_system_state(
        &self,
        system: &SystemName,
        stage: LifecycleStage,
    ) -> CoreResult<Option<SystemState>> {
        Ok(self.systems.read().get(&(system.clone(), stage)).cloned())
    }

    async fn create_system_state(
        &self,
        system: &SystemName,
        stage: LifecycleStage,
    ) -> CoreResult<SystemState> {
        let mut systems = self.systems.write();
        let key = (system.clone(), stage);
        if systems.contains_key(&key) {
            return Err(CoreError::DuplicateSystemState {
                system: system.clone(),
                stage,
            });
        }
        let state = SystemState::new(system.clone(), stage, self.clock.now());
        systems.insert(key, state.clone());
        Ok(state)
    }

    async fn save_system_state(&self, mut state: SystemState) -> CoreResult<SystemState> {
        let mut systems = self.systems.write();
        let key = (state.system.clone(), state.stage);
        match systems.get_mut(&key) {
            Some(row) => {
                state.date_updated = self.clock.now();
                *row = state.clone();
                Ok(state)
            }
            None => Err(CoreError::SystemStateNotFound {
                system: state.system,
                stage: state.stage,
            }),
        }
    }

    async fn try_start(
        &self,
        system: &SystemName,
        stage: LifecycleStage,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> CoreResult<StartOutcome> {
        let mut systems = self.systems.write();
        let row = systems
            .entry((system.clone(), stage))
            .or_insert_with(|| SystemState::new(system.clone(), stage, self.clock.now()));

        if !row.active {
            return Ok(StartOutcome::Inactive(row.clone()));
        }
        let reclaimed = row.status == SystemRunStatus::Running;
        if reclaimed && !row.is_stale_running(now, stale_after) {
            return Ok(StartOutcome::AlreadyRunning(row.clone()));
        }
        let mut state = row.clone().started(now);
        state.date_updated = self.clock.now();
        *row = state.clone();
        Ok(StartOutcome::Started { state, reclaimed })
    }

    async fn get_object_state(
        &self,
        system_state: &SystemState,
        object: &ObjectName,
    ) -> CoreResult<Option<ObjectState>> {
        let key = (system_state.system.clone(), system_state.stage, object.clone());
        Ok(self.objects.read().get(&key).cloned())
    }

    async fn create_object_state(
        &self,
        system_state: &SystemState,
        object: &ObjectName,
        checkpoint: DateTime<Utc>,
    ) -> CoreResult<ObjectState> {
        if !self
            .systems
            .read()
            .contains_key(&(system_state.system.clone(), system_state.stage))
        {
            return Err(CoreError::SystemStateNotFound {
                system: system_state.system.clone(),
                stage: system_state.stage,
            });
        }

        let mut objects = self.objects.write();
        let key = (system_state.system.clone(), system_state.stage, object.clone());
        if objects.contains_key(&key) {
            return Err(CoreError::DuplicateObjectState {
                system: system_state.system.clone(),
                stage: system_state.stage,
                object: object.clone(),
            });
        }
        let state = ObjectState::new(system_state, object.clone(), checkpoint, self.clock.now());
        objects.insert(key, state.clone());
        Ok(state)
    }

    async fn save_object_state(&self, mut state: ObjectState) -> CoreResult<ObjectState> {
        let mut objects = self.objects.write();
        match objects.get_mut(&Self::object_key(&state)) {
            Some(row) => {
                state.date_updated = self.clock.now();
                *row = state.clone();
                Ok(state)
            }
            None => Err(CoreError::ObjectStateNotFound {
                system: state.system,
                stage: state.stage,
                object: state.object,
            }),
        }
    }

    async fn get_object_states(&self, system_state: &SystemState) -> CoreResult<Vec<ObjectState>> {
        let mut states: Vec<ObjectState> = self
            .objects
            .read()
            .values()
            .filter(|s| s.system == system_state.system && s.stage == system_state.stage)
            .cloned()
            .collect();
        states.sort_by(|a, b| a.object.cmp(&b.object));
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::ctl::{OperationStatus, SystemRunStatus};
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn repo() -> (InMemoryCtlRepository, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new(start()));
        (InMemoryCtlRepository::new(clock.clone()), clock)
    }

    fn crm() -> SystemName {
        SystemName::new("Crm")
    }

    #[tokio::test]
    async fn create_fails_on_existing_system_state() {
        let (repo, _) = repo();
        repo.create_system_state(&crm(), LifecycleStage::Read).await.unwrap();
        let err = repo
            .create_system_state(&crm(), LifecycleStage::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateSystemState { .. }));

        // Another stage is a different key.
        repo.create_system_state(&crm(), LifecycleStage::Promote).await.unwrap();
    }

    #[tokio::test]
    async fn save_fails_without_existing_row() {
        let (repo, _) = repo();
        let state = SystemState::new(crm(), LifecycleStage::Read, start());
        let err = repo.save_system_state(state).await.unwrap_err();
        assert!(matches!(err, CoreError::SystemStateNotFound { .. }));
    }

    #[tokio::test]
    async fn get_or_create_reuses_existing() {
        let (repo, clock) = repo();
        let created = repo
            .get_or_create_system_state(&crm(), LifecycleStage::Read)
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        let running = repo.save_system_state(created.clone().started(clock.now())).await.unwrap();
        assert_eq!(running.date_updated, start() + Duration::minutes(1));

        let loaded = repo
            .get_or_create_system_state(&crm(), LifecycleStage::Read)
            .await
            .unwrap();
        assert_eq!(loaded.status, SystemRunStatus::Running);
        assert_eq!(loaded.date_created, created.date_created);
    }

    #[tokio::test]
    async fn object_state_requires_system_state() {
        let (repo, _) = repo();
        let orphan = SystemState::new(crm(), LifecycleStage::Read, start());
        let err = repo
            .create_object_state(&orphan, &ObjectName::new("Contact"), start())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SystemStateNotFound { .. }));
    }

    #[tokio::test]
    async fn object_state_lifecycle() {
        let (repo, _) = repo();
        let system = repo.create_system_state(&crm(), LifecycleStage::Read).await.unwrap();
        let object = ObjectName::new("Contact");

        let created = repo.create_object_state(&system, &object, start()).await.unwrap();
        assert_eq!(created.last_result, OperationStatus::Unknown);
        assert_eq!(created.checkpoint, start());

        let err = repo.create_object_state(&system, &object, start()).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateObjectState { .. }));

        let mut updated = created.clone();
        updated.last_result = OperationStatus::Success;
        updated.advance_checkpoint(start() + Duration::hours(1));
        repo.save_object_state(updated).await.unwrap();

        let loaded = repo
            .get_or_create_object_state(&system, &object, start())
            .await
            .unwrap();
        assert_eq!(loaded.last_result, OperationStatus::Success);
        assert_eq!(loaded.checkpoint, start() + Duration::hours(1));

        repo.create_object_state(&system, &ObjectName::new("Account"), start())
            .await
            .unwrap();
        let all = repo.get_object_states(&system).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].object.as_str(), "Account");
    }

    #[tokio::test]
    async fn save_object_state_fails_without_row() {
        let (repo, _) = repo();
        let system = repo.create_system_state(&crm(), LifecycleStage::Read).await.unwrap();
        let state = ObjectState::new(&system, ObjectName::new("Contact"), start(), start());
        let err = repo.save_object_state(state).await.unwrap_err();
        assert!(matches!(err, CoreError::ObjectStateNotFound { .. }));
    }

    #[tokio::test]
    async fn try_start_creates_and_claims_idle_state() {
        let (repo, _) = repo();
        let outcome = repo
            .try_start(&crm(), LifecycleStage::Read, start(), Duration::minutes(10))
            .await
            .unwrap();
        match outcome {
            StartOutcome::Started { state, reclaimed } => {
                assert_eq!(state.status, SystemRunStatus::Running);
                assert_eq!(state.last_started, Some(start()));
                assert!(!reclaimed);
            }
            other => panic!("unexpected {other:?}"),
        }
        let stored = repo.get_system_state(&crm(), LifecycleStage::Read).await.unwrap().unwrap();
        assert_eq!(stored.status, SystemRunStatus::Running);
    }

    #[tokio::test]
    async fn try_start_refuses_running_until_stale() {
        let (repo, clock) = repo();
        let stale_after = Duration::minutes(10);
        repo.try_start(&crm(), LifecycleStage::Read, start(), stale_after).await.unwrap();

        let again = repo
            .try_start(&crm(), LifecycleStage::Read, clock.now(), stale_after)
            .await
            .unwrap();
        assert!(matches!(again, StartOutcome::AlreadyRunning(_)));

        clock.advance(Duration::minutes(11));
        let later = repo
            .try_start(&crm(), LifecycleStage::Read, clock.now(), stale_after)
            .await
            .unwrap();
        assert!(matches!(later, StartOutcome::Started { reclaimed: true, .. }));
    }

    #[tokio::test]
    async fn try_start_leaves_inactive_state_untouched() {
        let (repo, _) = repo();
        let mut state = repo.create_system_state(&crm(), LifecycleStage::Read).await.unwrap();
        state.active = false;
        repo.save_system_state(state).await.unwrap();

        let outcome = repo
            .try_start(&crm(), LifecycleStage::Read, start(), Duration::minutes(10))
            .await
            .unwrap();
        assert!(matches!(outcome, StartOutcome::Inactive(_)));
        let stored = repo.get_system_state(&crm(), LifecycleStage::Read).await.unwrap().unwrap();
        assert_eq!(stored.status, SystemRunStatus::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_try_start_admits_one_caller() {
        let (repo, _) = repo();
        let repo = Arc::new(repo);
        let barrier = Arc::new(tokio::sync::Barrier::new(8));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let (repo, barrier) = (repo.clone(), barrier.clone());
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                repo.try_start(&crm(), LifecycleStage::Read, start(), Duration::minutes(10))
                    .await
                    .unwrap()
            }));
        }
        let mut started = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), StartOutcome::Started { .. }) {
                started += 1;
            }
        }
        assert_eq!(started, 1);
    }
}
