use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::application::{AppError, AppResult, DedupStore, TargetRepository};
use crate::domain::{ItemId, MonitoredTarget, NewTarget, TargetId, UserId};

#[derive(Clone, Default)]
pub struct InMemoryTargetRepository {
    inner: Arc<Mutex<TargetsInner>>,
}

#[derive(Default)]
struct TargetsInner {
    next_id: i64,
    targets: BTreeMap<TargetId, MonitoredTarget>,
}

impl InMemoryTargetRepository {
    pub fn new(targets: Vec<NewTarget>) -> AppResult<Self> {
        let repo = Self::default();
        {
            let mut inner = repo.lock()?;
            for t in targets {
                inner.insert(&t)?;
            }
        }
        Ok(repo)
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, TargetsInner>> {
        self.inner
            .lock()
            .map_err(|_| AppError::Storage("lock poisoned".into()))
    }
}

impl TargetsInner {
    fn insert(&mut self, target: &NewTarget) -> AppResult<TargetId> {
        if self.targets.values().any(|t| t.owner_id == target.owner_id) {
            return Err(AppError::DuplicateTarget {
                owner: target.owner_id,
            });
        }
        self.next_id += 1;
        let id = TargetId(self.next_id);
        self.targets.insert(id, target.clone().into_target(id));
        Ok(id)
    }
}

#[async_trait]
impl TargetRepository for InMemoryTargetRepository {
    async fn add(&self, target: &NewTarget) -> AppResult<TargetId> {
        self.lock()?.insert(target)
    }

    async fn remove(&self, id: TargetId) -> AppResult<bool> {
        Ok(self.lock()?.targets.remove(&id).is_some())
    }

    async fn remove_by_owner(&self, owner: UserId) -> AppResult<Option<MonitoredTarget>> {
        let mut inner = self.lock()?;
        let id = inner
            .targets
            .values()
            .find(|t| t.owner_id == owner)
            .map(|t| t.id);
        Ok(id.and_then(|id| inner.targets.remove(&id)))
    }

    async fn list(&self) -> AppResult<Vec<MonitoredTarget>> {
        Ok(self.lock()?.targets.values().cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDedupStore {
    last: Arc<Mutex<HashMap<TargetId, ItemId>>>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn last_notified(&self, target: TargetId) -> AppResult<Option<ItemId>> {
        let last = self
            .last
            .lock()
            .map_err(|_| AppError::Storage("lock poisoned".into()))?;
        Ok(last.get(&target).cloned())
    }

    async fn set_last_notified(&self, target: TargetId, item: &ItemId) -> AppResult<()> {
        let mut last = self
            .last
            .lock()
            .map_err(|_| AppError::Storage("lock poisoned".into()))?;
        last.insert(target, item.clone());
        Ok(())
    }

    async fn clear(&self, target: TargetId) -> AppResult<()> {
        let mut last = self
            .last
            .lock()
            .map_err(|_| AppError::Storage("lock poisoned".into()))?;
        last.remove(&target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExternalHandle, RoleId};

    fn new_target(owner: u64, handle: &str) -> NewTarget {
        NewTarget {
            external_handle: ExternalHandle::parse(handle).unwrap(),
            owner_id: UserId(owner),
            notify_role_id: RoleId(99),
        }
    }

    #[tokio::test]
    async fn ids_are_assigned_in_order() {
        let repo =
            InMemoryTargetRepository::new(vec![new_target(1, "a"), new_target(2, "b")]).unwrap();
        let ids: Vec<_> = repo.list().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TargetId(1), TargetId(2)]);
    }

    #[tokio::test]
    async fn remove_unknown_is_false() {
        let repo = InMemoryTargetRepository::default();
        assert!(!repo.remove(TargetId(42)).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_owner_in_seed_fails() {
        let err = InMemoryTargetRepository::new(vec![new_target(1, "a"), new_target(1, "b")]);
        assert!(matches!(err, Err(AppError::DuplicateTarget { .. })));
    }
}
