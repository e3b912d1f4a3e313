use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{
    FetchResult, HandleError, ItemId, MonitoredTarget, NewTarget, TargetId, UserId,
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("notifier error: {0}")]
    Notifier(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("user {owner} already has a monitored target")]
    DuplicateTarget { owner: UserId },
    #[error("invalid handle: {0}")]
    InvalidHandle(#[from] HandleError),
}

pub type AppResult<T> = Result<T, AppError>;

/// Why a single target could not be fetched this tick. None of these abort
/// the tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("navigation failed: {0}")]
    TransientNavigation(String),
    #[error("verification challenge persisted after solve attempt")]
    ChallengeDetected,
    #[error("page structure not recognised: {0}")]
    StructuralMismatch(String),
    #[error("browser session lost: {0}")]
    SessionLost(String),
    #[error("session pool exhausted")]
    PoolExhausted,
    #[error("timed out after {0:?} waiting for a session")]
    PoolTimeout(Duration),
    #[error("gave up after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        last: Option<Box<FetchError>>,
    },
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Short stable tag used in log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::TransientNavigation(_) => "transient_navigation",
            FetchError::ChallengeDetected => "challenge",
            FetchError::StructuralMismatch(_) => "structural",
            FetchError::SessionLost(_) => "session_lost",
            FetchError::PoolExhausted => "pool_exhausted",
            FetchError::PoolTimeout(_) => "pool_timeout",
            FetchError::Exhausted { .. } => "exhausted",
            FetchError::Cancelled => "cancelled",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::TransientNavigation(_)
                | FetchError::ChallengeDetected
                | FetchError::StructuralMismatch(_)
                | FetchError::SessionLost(_)
        )
    }

    /// The session that produced this error must not be handed out again.
    pub fn compromises_session(&self) -> bool {
        matches!(self, FetchError::SessionLost(_))
    }

    /// Exhausted because the page layout no longer matches the extractor.
    pub fn is_structural(&self) -> bool {
        match self {
            FetchError::StructuralMismatch(_) => true,
            FetchError::Exhausted { last: Some(last), .. } => last.is_structural(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("session pool exhausted")]
    Exhausted,
    #[error("timed out after {0:?} waiting for a session")]
    Timeout(Duration),
    #[error("failed to launch session: {0}")]
    Launch(String),
    #[error("session pool is shut down")]
    Closed,
}

impl From<PoolError> for FetchError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Exhausted => FetchError::PoolExhausted,
            PoolError::Timeout(d) => FetchError::PoolTimeout(d),
            PoolError::Launch(msg) => FetchError::SessionLost(msg),
            PoolError::Closed => FetchError::Cancelled,
        }
    }
}

/// Durable target registry. One active target per owner.
#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn add(&self, target: &NewTarget) -> AppResult<TargetId>;
    /// Returns `false` when the id is unknown.
    async fn remove(&self, id: TargetId) -> AppResult<bool>;
    async fn remove_by_owner(&self, owner: UserId) -> AppResult<Option<MonitoredTarget>>;
    async fn list(&self) -> AppResult<Vec<MonitoredTarget>>;
}

/// Last notified item per target.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn last_notified(&self, target: TargetId) -> AppResult<Option<ItemId>>;
    async fn set_last_notified(&self, target: TargetId, item: &ItemId) -> AppResult<()>;
    async fn clear(&self, target: TargetId) -> AppResult<()>;
}

/// Deliver notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &MonitoredTarget, result: &FetchResult) -> AppResult<()>;
}

/// A stateful automated browser. Exclusively owned by whoever checked it out.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError>;
    /// Polls for `selector` until it matches or `timeout` elapses.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool, FetchError>;
    async fn content(&mut self) -> Result<String, FetchError>;
    async fn reload(&mut self) -> Result<(), FetchError>;
    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, PoolError>;
}

/// One attempt at getting past an interactive verification page.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    async fn solve(&self, session: &mut dyn BrowserSession) -> Result<bool, FetchError>;
}

/// A single fetch attempt against an already checked-out session.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_latest(
        &self,
        target: &MonitoredTarget,
        session: &mut dyn BrowserSession,
    ) -> Result<FetchResult, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_structural_is_flagged() {
        let e = FetchError::Exhausted {
            attempts: 3,
            last: Some(Box::new(FetchError::StructuralMismatch("no link".into()))),
        };
        assert!(e.is_structural());
        assert_eq!(e.reason(), "exhausted");
        assert!(!e.is_retryable());
    }

    #[test]
    fn pool_errors_map_to_skip_reasons() {
        assert_eq!(FetchError::from(PoolError::Exhausted), FetchError::PoolExhausted);
        assert!(FetchError::from(PoolError::Launch("boom".into())).compromises_session());
    }
}
