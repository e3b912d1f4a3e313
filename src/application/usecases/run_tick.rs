use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::usecases::{HandleItemUseCase, ItemOutcome, RetryingFetcher};
use crate::application::{AppResult, FetchError, TargetRepository};
use crate::domain::MonitoredTarget;

/// Per-tick tally, one bucket per target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub polled: usize,
    pub notified: usize,
    pub unchanged: usize,
    pub no_content: usize,
    pub failed: usize,
    pub skipped: usize,
}

enum TargetOutcome {
    Item(ItemOutcome),
    Failed,
    Skipped,
}

pub struct RunTickUseCase<'a> {
    pub targets: &'a dyn TargetRepository,
    pub fetcher: RetryingFetcher<'a>,
    pub handle_item: HandleItemUseCase<'a>,
    /// Upper bound on targets fetched at once; normally the pool size.
    pub concurrency: usize,
}

impl<'a> RunTickUseCase<'a> {
    /// Poll every registered target once. Only a failure to read the
    /// registry is returned; per-target problems are logged and counted.
    pub async fn execute(&self, cancel: &CancellationToken) -> AppResult<TickReport> {
        let targets = self.targets.list().await?;

        let outcomes: Vec<TargetOutcome> = stream::iter(targets.iter())
            .map(|t| self.process(t, cancel))
            .buffer_unordered(self.concurrency.max(1))
            .collect()
            .await;

        let mut report = TickReport {
            polled: targets.len(),
            ..TickReport::default()
        };
        for outcome in outcomes {
            match outcome {
                TargetOutcome::Item(ItemOutcome::Notified(_)) => report.notified += 1,
                TargetOutcome::Item(ItemOutcome::Unchanged) => report.unchanged += 1,
                TargetOutcome::Item(ItemOutcome::NoContent) => report.no_content += 1,
                TargetOutcome::Failed => report.failed += 1,
                TargetOutcome::Skipped => report.skipped += 1,
            }
        }

        info!(
            polled = report.polled,
            notified = report.notified,
            unchanged = report.unchanged,
            no_content = report.no_content,
            failed = report.failed,
            skipped = report.skipped,
            "tick finished"
        );
        Ok(report)
    }

    async fn process(&self, target: &MonitoredTarget, cancel: &CancellationToken) -> TargetOutcome {
        let Some(claim) = self.handle_item.dedup.try_claim(target.id) else {
            warn!(target_id = %target.id, handle = %target.external_handle, reason = "in_flight", "skipping target");
            return TargetOutcome::Skipped;
        };

        let result = match self.fetcher.fetch(target, cancel).await {
            Ok(result) => result,
            Err(e) => return log_fetch_error(target, &e),
        };

        match self.handle_item.execute(&claim, target, &result).await {
            Ok(outcome) => TargetOutcome::Item(outcome),
            Err(e) => {
                warn!(target_id = %target.id, handle = %target.external_handle, reason = "notify", "delivery failed: {e}");
                TargetOutcome::Failed
            }
        }
    }
}

fn log_fetch_error(target: &MonitoredTarget, e: &FetchError) -> TargetOutcome {
    match e {
        FetchError::Cancelled => {
            info!(target_id = %target.id, handle = %target.external_handle, reason = e.reason(), "skipping target: shutdown in progress");
            TargetOutcome::Skipped
        }
        FetchError::PoolExhausted | FetchError::PoolTimeout(_) => {
            warn!(target_id = %target.id, handle = %target.external_handle, reason = e.reason(), "skipping target: {e}");
            TargetOutcome::Skipped
        }
        e if e.is_structural() => {
            error!(
                target_id = %target.id,
                handle = %target.external_handle,
                reason = "structural",
                alert = true,
                "profile layout no longer matches extractor: {e}"
            );
            TargetOutcome::Failed
        }
        e => {
            warn!(target_id = %target.id, handle = %target.external_handle, reason = e.reason(), "fetch failed: {e}");
            TargetOutcome::Failed
        }
    }
}
