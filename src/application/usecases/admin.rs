use tracing::info;

use crate::application::{AppResult, DedupTracker, TargetRepository};
use crate::domain::{ExternalHandle, MonitoredTarget, NewTarget, RoleId, TargetId, UserId};

/// Registration commands. These call straight through to the registry and
/// keep dedup state in step with target lifetime: a target leaves the
/// registry first, then its dedup state is forgotten once any in-flight
/// fetch has let go of it.
pub struct AdminUseCase<'a> {
    pub targets: &'a dyn TargetRepository,
    pub dedup: &'a DedupTracker,
}

impl<'a> AdminUseCase<'a> {
    pub async fn register_target(
        &self,
        owner: UserId,
        handle: &str,
        role: RoleId,
    ) -> AppResult<MonitoredTarget> {
        let new = NewTarget {
            external_handle: ExternalHandle::parse(handle)?,
            owner_id: owner,
            notify_role_id: role,
        };
        let id = self.targets.add(&new).await?;
        info!(target_id = %id, owner = %owner, handle = %new.external_handle, "target registered");
        Ok(new.into_target(id))
    }

    /// Remove the target owned by `owner`, e.g. when the member leaves.
    pub async fn unregister_target(&self, owner: UserId) -> AppResult<Option<MonitoredTarget>> {
        let removed = self.targets.remove_by_owner(owner).await?;
        if let Some(target) = &removed {
            self.dedup.forget(target.id).await?;
            info!(target_id = %target.id, owner = %owner, "target unregistered");
        }
        Ok(removed)
    }

    pub async fn remove_target(&self, id: TargetId) -> AppResult<bool> {
        let removed = self.targets.remove(id).await?;
        if removed {
            self.dedup.forget(id).await?;
        }
        Ok(removed)
    }

    pub async fn list_targets(&self) -> AppResult<Vec<MonitoredTarget>> {
        self.targets.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::AppError;
    use std::sync::Arc;

    use crate::application::DedupStore;
    use crate::domain::ItemId;
    use crate::infrastructure::memory_store::{InMemoryDedupStore, InMemoryTargetRepository};

    fn tracker(store: &InMemoryDedupStore) -> DedupTracker {
        DedupTracker::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn one_target_per_owner() {
        let targets = InMemoryTargetRepository::default();
        let store = InMemoryDedupStore::new();
        let dedup = tracker(&store);
        let admin = AdminUseCase {
            targets: &targets,
            dedup: &dedup,
        };

        admin
            .register_target(UserId(1), "@creator", RoleId(10))
            .await
            .unwrap();
        let err = admin
            .register_target(UserId(1), "other", RoleId(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateTarget { owner } if owner == UserId(1)));
        assert_eq!(admin.list_targets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_handle_is_rejected() {
        let targets = InMemoryTargetRepository::default();
        let store = InMemoryDedupStore::new();
        let dedup = tracker(&store);
        let admin = AdminUseCase {
            targets: &targets,
            dedup: &dedup,
        };
        let err = admin
            .register_target(UserId(1), "has space", RoleId(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidHandle(_)));
    }

    #[tokio::test]
    async fn unregister_clears_dedup_and_is_idempotent() {
        let targets = InMemoryTargetRepository::default();
        let store = InMemoryDedupStore::new();
        let dedup = tracker(&store);
        let admin = AdminUseCase {
            targets: &targets,
            dedup: &dedup,
        };
        let t = admin
            .register_target(UserId(5), "creator", RoleId(10))
            .await
            .unwrap();
        store.set_last_notified(t.id, &ItemId::new("v1")).await.unwrap();

        let removed = admin.unregister_target(UserId(5)).await.unwrap();
        assert_eq!(removed.map(|r| r.id), Some(t.id));
        assert_eq!(store.last_notified(t.id).await.unwrap(), None);

        assert!(admin.unregister_target(UserId(5)).await.unwrap().is_none());
        assert!(!admin.remove_target(t.id).await.unwrap());
    }
}
