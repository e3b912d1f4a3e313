use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::application::{AppResult, DedupStore};
use crate::domain::{ItemId, TargetId};

/// Per-target exclusion token. While held, no other tick can fetch the
/// target or touch its dedup state.
pub struct TargetClaim {
    target: TargetId,
    _guard: OwnedMutexGuard<()>,
}

impl TargetClaim {
    pub fn target(&self) -> TargetId {
        self.target
    }
}

/// Decides whether a fetched item has already been announced.
///
/// Identity is the item id, never the fetch date: an unchanged item is
/// reported at most once no matter how often it is polled. `is_new` and
/// `record` take a [`TargetClaim`], so a check and the following write for
/// one target cannot interleave with another tick's.
pub struct DedupTracker {
    store: Arc<dyn DedupStore>,
    claims: Mutex<Claims>,
}

#[derive(Default)]
struct Claims {
    slots: HashMap<TargetId, Arc<AsyncMutex<()>>>,
    /// Removed targets. Ids are never reused, so a tick that still holds a
    /// stale snapshot cannot write state back for them.
    retired: HashSet<TargetId>,
}

impl DedupTracker {
    pub fn new(store: Arc<dyn DedupStore>) -> Self {
        Self {
            store,
            claims: Mutex::new(Claims::default()),
        }
    }

    fn claims(&self) -> std::sync::MutexGuard<'_, Claims> {
        self.claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, target: TargetId) -> Arc<AsyncMutex<()>> {
        self.claims().slots.entry(target).or_default().clone()
    }

    fn is_retired(&self, target: TargetId) -> bool {
        self.claims().retired.contains(&target)
    }

    /// Claim `target` unless another tick holds it.
    pub fn try_claim(&self, target: TargetId) -> Option<TargetClaim> {
        let guard = self.slot(target).try_lock_owned().ok()?;
        Some(TargetClaim {
            target,
            _guard: guard,
        })
    }

    pub async fn claim(&self, target: TargetId) -> TargetClaim {
        let guard = self.slot(target).lock_owned().await;
        TargetClaim {
            target,
            _guard: guard,
        }
    }

    pub async fn is_new(&self, claim: &TargetClaim, item: Option<&ItemId>) -> AppResult<bool> {
        let Some(item) = item else {
            return Ok(false);
        };
        if self.is_retired(claim.target) {
            return Ok(false);
        }
        let last = self.store.last_notified(claim.target).await?;
        Ok(last.as_ref() != Some(item))
    }

    /// Call only after the notification for `item` went out.
    pub async fn record(&self, claim: &TargetClaim, item: &ItemId) -> AppResult<()> {
        if self.is_retired(claim.target) {
            return Ok(());
        }
        self.store.set_last_notified(claim.target, item).await
    }

    pub async fn last_notified(&self, target: TargetId) -> AppResult<Option<ItemId>> {
        self.store.last_notified(target).await
    }

    /// Drop all state for a removed target. Waits for an in-flight claim,
    /// so a running tick cannot record after the row is cleared.
    pub async fn forget(&self, target: TargetId) -> AppResult<()> {
        let claim = self.claim(target).await;
        self.claims().retired.insert(target);
        self.store.clear(target).await?;
        drop(claim);
        self.claims().slots.remove(&target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_store::InMemoryDedupStore;

    fn tracker() -> DedupTracker {
        DedupTracker::new(Arc::new(InMemoryDedupStore::new()))
    }

    #[tokio::test]
    async fn first_observation_is_new_and_repeat_is_not() {
        let dedup = tracker();
        let claim = dedup.claim(TargetId(1)).await;
        let item = ItemId::new("abc123");

        assert!(dedup.is_new(&claim, Some(&item)).await.unwrap());
        dedup.record(&claim, &item).await.unwrap();
        assert!(!dedup.is_new(&claim, Some(&item)).await.unwrap());
        assert!(dedup.is_new(&claim, Some(&ItemId::new("def456"))).await.unwrap());
    }

    #[tokio::test]
    async fn missing_item_is_never_new() {
        let dedup = tracker();
        let claim = dedup.claim(TargetId(7)).await;
        assert!(!dedup.is_new(&claim, None).await.unwrap());
    }

    #[tokio::test]
    async fn claim_is_exclusive_per_target() {
        let dedup = tracker();
        let held = dedup.try_claim(TargetId(1)).unwrap();
        assert!(dedup.try_claim(TargetId(1)).is_none());
        assert!(dedup.try_claim(TargetId(2)).is_some());
        drop(held);
        assert!(dedup.try_claim(TargetId(1)).is_some());
    }

    #[tokio::test]
    async fn forget_clears_state() {
        let dedup = tracker();
        {
            let claim = dedup.claim(TargetId(3)).await;
            dedup.record(&claim, &ItemId::new("x")).await.unwrap();
        }
        dedup.forget(TargetId(3)).await.unwrap();
        assert_eq!(dedup.last_notified(TargetId(3)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn forgotten_target_is_never_written_back() {
        let dedup = tracker();
        dedup.forget(TargetId(4)).await.unwrap();

        let claim = dedup.claim(TargetId(4)).await;
        let item = ItemId::new("late");
        assert!(!dedup.is_new(&claim, Some(&item)).await.unwrap());
        dedup.record(&claim, &item).await.unwrap();
        assert_eq!(dedup.last_notified(TargetId(4)).await.unwrap(), None);
    }
}
