use tracing::info;

use crate::application::{AppResult, DedupTracker, Notifier, TargetClaim};
use crate::domain::{FetchResult, ItemId, MonitoredTarget};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Notified(ItemId),
    Unchanged,
    NoContent,
}

pub struct HandleItemUseCase<'a> {
    pub dedup: &'a DedupTracker,
    pub notifier: &'a dyn Notifier,
}

impl<'a> HandleItemUseCase<'a> {
    /// Notify for `result` if its item has not been announced yet. The
    /// item is recorded only once the notifier accepted it, so a failed
    /// delivery is retried on the next tick.
    pub async fn execute(
        &self,
        claim: &TargetClaim,
        target: &MonitoredTarget,
        result: &FetchResult,
    ) -> AppResult<ItemOutcome> {
        let Some(item) = result.item_id() else {
            return Ok(ItemOutcome::NoContent);
        };
        if !self.dedup.is_new(claim, Some(item)).await? {
            return Ok(ItemOutcome::Unchanged);
        }

        self.notifier.notify(target, result).await?;
        self.dedup.record(claim, item).await?;
        info!(target_id = %target.id, handle = %target.external_handle, item_id = %item, "new item notified");

        Ok(ItemOutcome::Notified(item.clone()))
    }
}
