use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::application::{BrowserSession, ChallengeSolver, FetchError};

/// Waits a human-looking pause and reloads. This only clears soft
/// challenges that are shown on the first automated hit; interactive
/// puzzles need a solver service behind [`ChallengeSolver`].
///
/// With [`watching`](Self::watching) set, the overlay is checked again after
/// the reload and the solve reports failure if it is still up.
pub struct ReloadChallengeSolver {
    settle: Duration,
    jitter_ms: u64,
    overlay: Option<String>,
}

impl ReloadChallengeSolver {
    pub fn new(settle: Duration, jitter_ms: u64) -> Self {
        Self {
            settle,
            jitter_ms,
            overlay: None,
        }
    }

    pub fn watching(mut self, challenge_selector: impl Into<String>) -> Self {
        self.overlay = Some(challenge_selector.into());
        self
    }
}

impl Default for ReloadChallengeSolver {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500), 1500)
    }
}

#[async_trait]
impl ChallengeSolver for ReloadChallengeSolver {
    async fn solve(&self, session: &mut dyn BrowserSession) -> Result<bool, FetchError> {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.jitter_ms)
        };
        let pause = self.settle + Duration::from_millis(jitter);
        debug!(pause_ms = pause.as_millis() as u64, "reloading to clear challenge");
        tokio::time::sleep(pause).await;
        session.reload().await?;

        match &self.overlay {
            Some(selector) => {
                let still_up = session.wait_for(selector, Duration::ZERO).await?;
                Ok(!still_up)
            }
            None => Ok(true),
        }
    }
}

/// Never attempts a solve; the challenge is reported straight away.
pub struct NoopChallengeSolver;

#[async_trait]
impl ChallengeSolver for NoopChallengeSolver {
    async fn solve(&self, _session: &mut dyn BrowserSession) -> Result<bool, FetchError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::SessionFactory;
    use crate::infrastructure::fake_session::{FakeBrowser, FakePage, challenge_html, profile_html};
    use crate::infrastructure::profile_page::LayoutSelectors;

    const PAGE: &str = "https://www.tiktok.com/@creator";

    fn solver() -> ReloadChallengeSolver {
        ReloadChallengeSolver::new(Duration::from_millis(10), 0)
            .watching(LayoutSelectors::default().challenge_selector)
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_gone_after_reload_is_solved() {
        let browser = FakeBrowser::new();
        browser.script(
            "creator",
            vec![
                FakePage::Html(challenge_html()),
                FakePage::Html(profile_html(&[("abc123", false)])),
            ],
        );
        let mut session = browser.launch().await.unwrap();
        session.navigate(PAGE).await.unwrap();

        assert!(solver().solve(session.as_mut()).await.unwrap());
        assert_eq!(browser.navigations(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_still_up_is_not_solved() {
        let browser = FakeBrowser::new();
        browser.script("creator", vec![FakePage::Html(challenge_html())]);
        let mut session = browser.launch().await.unwrap();
        session.navigate(PAGE).await.unwrap();

        assert!(!solver().solve(session.as_mut()).await.unwrap());
    }

    #[tokio::test]
    async fn noop_never_solves() {
        let browser = FakeBrowser::new();
        let mut session = browser.launch().await.unwrap();
        assert!(!NoopChallengeSolver.solve(session.as_mut()).await.unwrap());
    }
}
