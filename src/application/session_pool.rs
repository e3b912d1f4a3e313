use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

use crate::application::{BrowserSession, PoolError, SessionFactory};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum number of live sessions, idle or checked out.
    pub size: usize,
    /// Requesters allowed to wait for a free session before `acquire` fails fast.
    pub queue_depth: usize,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: 1,
            queue_depth: 32,
            acquire_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub checked_out: usize,
    pub launched: usize,
    pub discarded: usize,
}

/// Bounded pool of browser sessions.
///
/// A semaphore with `size` permits gates checkout; a permit is held for as
/// long as the returned [`SessionHandle`] lives. Sessions are launched lazily
/// when no idle one is available, so a discarded session is replaced on the
/// next acquisition.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    factory: Arc<dyn SessionFactory>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn BrowserSession>>>,
    waiting: AtomicUsize,
    checked_out: AtomicUsize,
    launched: AtomicUsize,
    discarded: AtomicUsize,
    settings: PoolSettings,
}

impl SessionPool {
    pub fn new(factory: Arc<dyn SessionFactory>, settings: PoolSettings) -> Self {
        let size = settings.size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                factory,
                permits: Arc::new(Semaphore::new(size)),
                idle: Mutex::new(Vec::with_capacity(size)),
                waiting: AtomicUsize::new(0),
                checked_out: AtomicUsize::new(0),
                launched: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
                settings,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.settings.size.max(1)
    }

    pub async fn acquire(&self) -> Result<SessionHandle, PoolError> {
        self.acquire_timeout(self.inner.settings.acquire_timeout).await
    }

    /// Check out a session, waiting at most `timeout` for one to free up.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<SessionHandle, PoolError> {
        let permit = match self.inner.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => self.wait_for_permit(timeout).await?,
        };

        let session = match self.pop_idle() {
            Some(session) => session,
            None => {
                let session = self.inner.factory.launch().await?;
                let launched = self.inner.launched.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(launched, "launched browser session");
                session
            }
        };

        self.inner.checked_out.fetch_add(1, Ordering::SeqCst);
        Ok(SessionHandle {
            session: Some(session),
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    async fn wait_for_permit(&self, timeout: Duration) -> Result<OwnedSemaphorePermit, PoolError> {
        let waiter = WaiterGuard::enter(&self.inner.waiting);
        if waiter.position >= self.inner.settings.queue_depth {
            return Err(PoolError::Exhausted);
        }
        match tokio::time::timeout(timeout, self.inner.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => Err(PoolError::Timeout(timeout)),
        }
    }

    fn pop_idle(&self) -> Option<Box<dyn BrowserSession>> {
        match self.inner.idle.lock() {
            Ok(mut idle) => idle.pop(),
            Err(_) => None,
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.inner.idle.lock().map(|v| v.len()).unwrap_or(0),
            checked_out: self.inner.checked_out.load(Ordering::SeqCst),
            launched: self.inner.launched.load(Ordering::SeqCst),
            discarded: self.inner.discarded.load(Ordering::SeqCst),
        }
    }

    /// Refuse new checkouts and close every idle session. Handles still out
    /// close their session when released.
    pub async fn shutdown(&self) {
        self.inner.permits.close();
        let drained: Vec<_> = match self.inner.idle.lock() {
            Ok(mut idle) => idle.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        let count = drained.len();
        for session in drained {
            session.close().await;
        }
        info!(closed = count, "session pool shut down");
    }
}

struct WaiterGuard<'a> {
    counter: &'a AtomicUsize,
    position: usize,
}

impl<'a> WaiterGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let position = counter.fetch_add(1, Ordering::SeqCst);
        Self { counter, position }
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive checkout of one session. Call [`release`](Self::release) to
/// return it or [`discard`](Self::discard) to tear it down; dropping the
/// handle without either discards the session.
pub struct SessionHandle {
    session: Option<Box<dyn BrowserSession>>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl SessionHandle {
    pub fn session(&mut self) -> &mut dyn BrowserSession {
        self.session
            .as_deref_mut()
            .expect("session is present until the handle is consumed")
    }

    pub fn release(mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if self.pool.permits.is_closed() {
            spawn_close(session);
            return;
        }
        if let Ok(mut idle) = self.pool.idle.lock() {
            idle.push(session);
        }
    }

    pub async fn discard(mut self) {
        if let Some(session) = self.session.take() {
            self.pool.discarded.fetch_add(1, Ordering::SeqCst);
            session.close().await;
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.pool.checked_out.fetch_sub(1, Ordering::SeqCst);
        if let Some(session) = self.session.take() {
            warn!("session handle dropped without release, discarding session");
            self.pool.discarded.fetch_add(1, Ordering::SeqCst);
            spawn_close(session);
        }
    }
}

fn spawn_close(session: Box<dyn BrowserSession>) {
    if let Ok(rt) = tokio::runtime::Handle::try_current() {
        rt.spawn(async move { session.close().await });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fake_session::FakeBrowser;

    fn pool(browser: &FakeBrowser, size: usize, queue_depth: usize) -> SessionPool {
        SessionPool::new(
            Arc::new(browser.clone()),
            PoolSettings {
                size,
                queue_depth,
                acquire_timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn released_sessions_are_reused() {
        let browser = FakeBrowser::new();
        let pool = pool(&browser, 1, 4);

        let handle = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().checked_out, 1);
        handle.release();

        let handle = pool.acquire().await.unwrap();
        handle.release();

        let stats = pool.stats();
        assert_eq!(browser.launched(), 1);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.checked_out, 0);
    }

    #[tokio::test]
    async fn discarded_session_is_replaced() {
        let browser = FakeBrowser::new();
        let pool = pool(&browser, 1, 4);

        pool.acquire().await.unwrap().discard().await;
        pool.acquire().await.unwrap().release();

        assert_eq!(browser.launched(), 2);
        assert_eq!(browser.closed(), 1);
        assert_eq!(pool.stats().discarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_while_all_sessions_are_out() {
        let browser = FakeBrowser::new();
        let pool = pool(&browser, 1, 4);

        let held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.err();
        assert_eq!(err, Some(PoolError::Timeout(Duration::from_secs(5))));
        held.release();
    }

    #[tokio::test]
    async fn full_wait_queue_fails_fast() {
        let browser = FakeBrowser::new();
        let pool = pool(&browser, 1, 0);

        let held = pool.acquire().await.unwrap();
        assert_eq!(pool.acquire().await.err(), Some(PoolError::Exhausted));
        held.release();
    }

    #[tokio::test]
    async fn waiter_gets_session_once_released() {
        let browser = FakeBrowser::new();
        let pool = pool(&browser, 1, 4);

        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|h| h.release()) })
        };
        tokio::task::yield_now().await;
        held.release();

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(browser.launched(), 1);
    }

    #[tokio::test]
    async fn dropped_handle_discards_its_session() {
        let browser = FakeBrowser::new();
        let pool = pool(&browser, 1, 4);

        drop(pool.acquire().await.unwrap());
        tokio::task::yield_now().await;

        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.idle, 0);
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_idle_and_refuses_checkout() {
        let browser = FakeBrowser::new();
        let pool = pool(&browser, 2, 4);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        a.release();
        b.release();

        pool.shutdown().await;
        assert_eq!(browser.closed(), 2);
        assert_eq!(pool.acquire().await.err(), Some(PoolError::Closed));
    }
}
