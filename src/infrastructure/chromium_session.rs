//! Headless Chromium sessions driven over CDP with `chromiumoxide`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::{BrowserSession, FetchError, PoolError, SessionFactory};
use crate::infrastructure::stealth::{STEALTH_ARGS, STEALTH_SCRIPT, pick_user_agent};

const SELECTOR_POLL: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chrome_executable: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            window_width: 1366,
            window_height: 900,
        }
    }
}

/// Find a Chromium-family executable: explicit setting, then
/// `CHROME_EXECUTABLE`, then a PATH scan. `None` leaves discovery to
/// chromiumoxide.
pub fn find_chrome_executable(configured: Option<&str>) -> Option<String> {
    if let Some(p) = configured {
        return Some(p.to_string());
    }
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }
    let path_var = std::env::var("PATH").ok()?;
    let candidates = ["google-chrome", "chromium", "chromium-browser", "chrome"];
    std::env::split_paths(&path_var)
        .flat_map(|dir| candidates.iter().map(move |exe| dir.join(exe)))
        .find(|full| full.exists())
        .map(|full| full.to_string_lossy().to_string())
}

pub struct ChromiumSessionFactory {
    settings: BrowserSettings,
    executable: Option<String>,
}

impl ChromiumSessionFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        let executable = find_chrome_executable(settings.chrome_executable.as_deref());
        info!(
            headless = settings.headless,
            executable = executable.as_deref().unwrap_or("auto"),
            "chromium session factory ready"
        );
        Self {
            settings,
            executable,
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, PoolError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.settings.window_width, self.settings.window_height)
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--mute-audio");
        for arg in STEALTH_ARGS {
            builder = builder.arg(*arg);
        }
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(exe) = &self.executable {
            builder = builder.chrome_executable(exe);
        }
        builder.build().map_err(PoolError::Launch)
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, PoolError> {
        let config = self.browser_config()?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PoolError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {e}");
                }
            }
        });

        let page = match open_stealth_page(&browser).await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!("browser close after failed setup: {close_err}");
                }
                handler_task.abort();
                return Err(PoolError::Launch(e.to_string()));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
        }))
    }
}

async fn open_stealth_page(browser: &Browser) -> Result<Page, CdpError> {
    let page = browser.new_page("about:blank").await?;
    page.execute(SetUserAgentOverrideParams::new(pick_user_agent()))
        .await?;
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
        .await?;
    Ok(page)
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

fn map_cdp_error(e: CdpError) -> FetchError {
    match e {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            FetchError::SessionLost(e.to_string())
        }
        other => FetchError::TransientNavigation(other.to_string()),
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        self.page.goto(url).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool, FetchError> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| FetchError::StructuralMismatch(e.to_string()))?;
        let probe = format!("document.querySelector({quoted}) !== null");
        let deadline = Instant::now() + timeout;

        loop {
            let found = self
                .page
                .evaluate(probe.as_str())
                .await
                .map_err(map_cdp_error)?
                .into_value::<bool>()
                .unwrap_or(false);
            if found {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        self.page.content().await.map_err(map_cdp_error)
    }

    async fn reload(&mut self) -> Result<(), FetchError> {
        self.page.reload().await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        let ChromiumSession {
            mut browser,
            handler_task,
            ..
        } = *self;
        if let Err(e) = browser.close().await {
            warn!("browser close error (non-fatal): {e}");
        }
        if let Err(e) = browser.wait().await {
            debug!("browser wait error: {e}");
        }
        handler_task.abort();
    }
}
