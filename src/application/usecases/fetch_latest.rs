use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::{ContentFetcher, FetchError, PoolError, SessionPool};
use crate::domain::{FetchResult, MonitoredTarget, RetryPolicy};

/// Runs single fetch attempts under the retry policy.
///
/// Each attempt checks a session out of the pool and hands it back before
/// the inter-attempt delay, so a waiting target is never starved by another
/// target's backoff. Sessions that report a lost connection, or that keep
/// hitting challenges, are discarded instead of returned.
pub struct RetryingFetcher<'a> {
    pub pool: &'a SessionPool,
    pub fetcher: &'a dyn ContentFetcher,
    pub policy: RetryPolicy,
}

impl<'a> RetryingFetcher<'a> {
    pub async fn fetch(
        &self,
        target: &MonitoredTarget,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        let mut attempts = 0u32;
        let mut challenge_streak = 0u32;
        let mut last: Option<FetchError> = None;

        while self.policy.allows_attempt(attempts) {
            if attempts > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(self.policy.delay) => {}
                }
            } else if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let mut handle = match self.pool.acquire().await {
                Ok(handle) => handle,
                Err(PoolError::Launch(msg)) => {
                    attempts += 1;
                    warn!(target_id = %target.id, attempt = attempts, error = %msg, "session launch failed");
                    last = Some(FetchError::SessionLost(msg));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            attempts += 1;

            match self.fetcher.fetch_latest(target, handle.session()).await {
                Ok(result) => {
                    handle.release();
                    debug!(target_id = %target.id, attempt = attempts, "fetch succeeded");
                    return Ok(result);
                }
                Err(e) => {
                    if e == FetchError::ChallengeDetected {
                        challenge_streak += 1;
                    } else {
                        challenge_streak = 0;
                    }

                    let discard =
                        e.compromises_session() || self.policy.session_compromised(challenge_streak);
                    if discard {
                        handle.discard().await;
                        challenge_streak = 0;
                    } else {
                        handle.release();
                    }

                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!(
                        target_id = %target.id,
                        handle = %target.external_handle,
                        attempt = attempts,
                        max_attempts = self.policy.max_attempts,
                        reason = e.reason(),
                        discarded_session = discard,
                        "fetch attempt failed: {e}"
                    );
                    last = Some(e);
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts,
            last: last.map(Box::new),
        })
    }
}
