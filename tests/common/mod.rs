#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use postwatch::application::usecases::{HandleItemUseCase, RetryingFetcher, RunTickUseCase};
use postwatch::application::{
    AppError, AppResult, DedupTracker, Notifier, PoolSettings, SessionPool, TargetRepository,
};
use postwatch::domain::{
    ExternalHandle, FetchResult, ItemId, MonitoredTarget, NewTarget, RetryPolicy, RoleId, UserId,
};
use postwatch::infrastructure::{
    challenge::ReloadChallengeSolver,
    fake_session::FakeBrowser,
    memory_store::{InMemoryDedupStore, InMemoryTargetRepository},
    profile_fetcher::ProfileFetcher,
    profile_page::{LayoutSelectors, ProfileLayout},
};

#[derive(Clone, Default)]
pub struct CountingNotifier {
    sent: Arc<Mutex<Vec<(String, ItemId)>>>,
    fail: Arc<Mutex<bool>>,
}

impl CountingNotifier {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
    pub fn sent(&self) -> Vec<(String, ItemId)> {
        self.sent.lock().unwrap().clone()
    }
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn notify(&self, target: &MonitoredTarget, result: &FetchResult) -> AppResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::Notifier("webhook unavailable".into()));
        }
        if let Some(item) = result.item_id() {
            self.sent
                .lock()
                .unwrap()
                .push((target.external_handle.as_str().to_string(), item.clone()));
        }
        Ok(())
    }
}

pub fn new_target(owner: u64, handle: &str) -> NewTarget {
    NewTarget {
        external_handle: ExternalHandle::parse(handle).unwrap(),
        owner_id: UserId(owner),
        notify_role_id: RoleId(owner * 10),
    }
}

/// Wires the tick pipeline against a scripted browser and in-memory stores.
pub struct Harness {
    pub browser: FakeBrowser,
    pub targets: InMemoryTargetRepository,
    pub dedup_store: Arc<InMemoryDedupStore>,
    pub dedup: DedupTracker,
    pub pool: SessionPool,
    pub fetcher: ProfileFetcher,
    pub notifier: CountingNotifier,
    pub policy: RetryPolicy,
}

impl Harness {
    pub fn new(browser: FakeBrowser, pool_size: usize) -> Self {
        let dedup_store = Arc::new(InMemoryDedupStore::new());
        let layout = ProfileLayout::new(LayoutSelectors::default()).unwrap();
        Self {
            pool: SessionPool::new(
                Arc::new(browser.clone()),
                PoolSettings {
                    size: pool_size,
                    queue_depth: 32,
                    acquire_timeout: Duration::from_secs(600),
                },
            ),
            browser,
            targets: InMemoryTargetRepository::default(),
            dedup: DedupTracker::new(dedup_store.clone()),
            dedup_store,
            fetcher: ProfileFetcher::new(
                layout,
                Arc::new(ReloadChallengeSolver::new(Duration::from_millis(100), 0)),
                Duration::from_secs(10),
            ),
            notifier: CountingNotifier::new(),
            policy: RetryPolicy::default(),
        }
    }

    pub async fn add(&self, owner: u64, handle: &str) -> MonitoredTarget {
        let new = new_target(owner, handle);
        let id = self.targets.add(&new).await.unwrap();
        new.into_target(id)
    }

    pub fn fetcher(&self) -> RetryingFetcher<'_> {
        RetryingFetcher {
            pool: &self.pool,
            fetcher: &self.fetcher,
            policy: self.policy.clone(),
        }
    }

    pub fn tick(&self) -> RunTickUseCase<'_> {
        RunTickUseCase {
            targets: &self.targets,
            fetcher: self.fetcher(),
            handle_item: HandleItemUseCase {
                dedup: &self.dedup,
                notifier: &self.notifier,
            },
            concurrency: self.pool.size(),
        }
    }
}
