use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::application::{BrowserSession, ChallengeSolver, ContentFetcher, FetchError};
use crate::domain::{FetchResult, MonitoredTarget};
use crate::infrastructure::profile_page::{PageState, ProfileLayout};

/// One navigation of a target's profile page.
pub struct ProfileFetcher {
    layout: ProfileLayout,
    solver: Arc<dyn ChallengeSolver>,
    render_timeout: Duration,
}

impl ProfileFetcher {
    pub fn new(
        layout: ProfileLayout,
        solver: Arc<dyn ChallengeSolver>,
        render_timeout: Duration,
    ) -> Self {
        Self {
            layout,
            solver,
            render_timeout,
        }
    }
}

#[async_trait]
impl ContentFetcher for ProfileFetcher {
    async fn fetch_latest(
        &self,
        target: &MonitoredTarget,
        session: &mut dyn BrowserSession,
    ) -> Result<FetchResult, FetchError> {
        let url = self.layout.profile_url(&target.external_handle);
        session.navigate(&url).await?;

        let mut solve_attempted = false;
        loop {
            let rendered = session
                .wait_for(self.layout.render_marker(), self.render_timeout)
                .await?;
            let html = session.content().await?;
            let state = self.layout.classify(&html, &url);
            if !rendered {
                if let PageState::Unrecognised(why) = &state {
                    if self.layout.has_rendered_body(&html) {
                        return Err(FetchError::StructuralMismatch(format!(
                            "no content marker within {:?}: {why}",
                            self.render_timeout
                        )));
                    }
                    return Err(FetchError::TransientNavigation(format!(
                        "content marker did not render within {:?}",
                        self.render_timeout
                    )));
                }
            }

            match state {
                PageState::Latest(item) => return Ok(FetchResult::new(target.id, Some(item))),
                PageState::Empty => return Ok(FetchResult::new(target.id, None)),
                PageState::Unrecognised(why) => return Err(FetchError::StructuralMismatch(why)),
                PageState::Challenge if solve_attempted => {
                    return Err(FetchError::ChallengeDetected);
                }
                PageState::Challenge => {
                    solve_attempted = true;
                    debug!(target_id = %target.id, "verification challenge shown, attempting solve");
                    if !self.solver.solve(session).await? {
                        return Err(FetchError::ChallengeDetected);
                    }
                }
            }
        }
    }
}
