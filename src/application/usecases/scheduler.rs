use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::usecases::{RunTickUseCase, TickReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Ticking,
    Stopped,
}

/// Fixed-period driver for [`RunTickUseCase`].
///
/// Ticks never overlap: the timer is only polled again once the previous
/// tick has drained, and missed periods are delayed rather than bursted.
pub struct PollScheduler<'a> {
    pub tick: RunTickUseCase<'a>,
    pub period: Duration,
    pub shutdown_grace: Duration,
    state: watch::Sender<SchedulerState>,
}

impl<'a> PollScheduler<'a> {
    pub fn new(tick: RunTickUseCase<'a>, period: Duration, shutdown_grace: Duration) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            tick,
            period,
            shutdown_grace,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Loop until `cancel` fires, then drain the in-flight tick (bounded by
    /// `shutdown_grace`) and close the session pool. Returns the number of
    /// ticks that completed.
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completed = 0u64;

        info!(period_secs = self.period.as_secs(), "scheduler started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.state.send_replace(SchedulerState::Ticking);
            if let Some(Ok(_)) = self.run_tick(&cancel).await {
                completed += 1;
            }
            self.state.send_replace(SchedulerState::Idle);

            if cancel.is_cancelled() {
                break;
            }
        }

        self.tick.fetcher.pool.shutdown().await;
        self.state.send_replace(SchedulerState::Stopped);
        info!(ticks = completed, "scheduler stopped");
        completed
    }

    async fn run_tick(
        &self,
        cancel: &CancellationToken,
    ) -> Option<crate::application::AppResult<TickReport>> {
        let tick = self.tick.execute(cancel);
        tokio::pin!(tick);

        let result = tokio::select! {
            r = &mut tick => Some(r),
            _ = cancel.cancelled() => {
                match tokio::time::timeout(self.shutdown_grace, &mut tick).await {
                    Ok(r) => Some(r),
                    Err(_) => {
                        warn!(grace_secs = self.shutdown_grace.as_secs(), "in-flight tick did not drain before deadline");
                        None
                    }
                }
            }
        };

        if let Some(Err(e)) = &result {
            error!("tick failed: {e}");
        }
        result
    }
}
