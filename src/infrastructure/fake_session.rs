//! Scripted in-process browser for tests and dry runs.
//!
//! Each profile handle gets a queue of [`FakePage`] responses; every
//! navigation or reload consumes the next one and the last one repeats.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::application::{BrowserSession, FetchError, PoolError, SessionFactory};

#[derive(Clone, Debug)]
pub enum FakePage {
    Html(String),
    /// Navigation succeeds but nothing ever matches.
    NeverRenders,
    NavigationFails(String),
    /// The browser connection dies on navigation.
    SessionDies,
}

#[derive(Default)]
struct Script {
    pages: HashMap<String, VecDeque<FakePage>>,
}

impl Script {
    fn next_for(&mut self, url: &str) -> FakePage {
        let key = handle_from_url(url);
        match self.pages.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(FakePage::NeverRenders),
            Some(queue) => queue.front().cloned().unwrap_or(FakePage::NeverRenders),
            None => FakePage::NeverRenders,
        }
    }
}

fn handle_from_url(url: &str) -> String {
    url.rsplit('@').next().unwrap_or(url).trim_end_matches('/').to_string()
}

#[derive(Default)]
struct Counters {
    launched: AtomicUsize,
    closed: AtomicUsize,
    navigations: AtomicUsize,
    busy: AtomicUsize,
    max_busy: AtomicUsize,
}

/// Cloneable handle to a scripted browser; also the session factory.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    script: Arc<Mutex<Script>>,
    counters: Arc<Counters>,
    navigate_delay: Duration,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every navigation takes `delay`, which makes overlapping fetches
    /// observable.
    pub fn with_navigate_delay(mut self, delay: Duration) -> Self {
        self.navigate_delay = delay;
        self
    }

    pub fn script(&self, handle: &str, pages: Vec<FakePage>) {
        if let Ok(mut script) = self.script.lock() {
            script.pages.insert(handle.to_string(), pages.into());
        }
    }

    pub fn launched(&self) -> usize {
        self.counters.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> usize {
        self.counters.navigations.load(Ordering::SeqCst)
    }

    /// Highest number of sessions that were navigating at the same time.
    pub fn max_concurrent_navigations(&self) -> usize {
        self.counters.max_busy.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, PoolError> {
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            browser: self.clone(),
            current_url: None,
            current: None,
        }))
    }
}

pub struct FakeSession {
    browser: FakeBrowser,
    current_url: Option<String>,
    current: Option<FakePage>,
}

impl FakeSession {
    async fn load(&mut self, url: &str) -> Result<(), FetchError> {
        let counters = &self.browser.counters;
        counters.navigations.fetch_add(1, Ordering::SeqCst);
        let busy = counters.busy.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_busy.fetch_max(busy, Ordering::SeqCst);
        if !self.browser.navigate_delay.is_zero() {
            tokio::time::sleep(self.browser.navigate_delay).await;
        }
        counters.busy.fetch_sub(1, Ordering::SeqCst);

        let page = self
            .browser
            .script
            .lock()
            .map_err(|_| FetchError::SessionLost("script lock poisoned".into()))?
            .next_for(url);
        self.current_url = Some(url.to_string());
        match page {
            FakePage::NavigationFails(msg) => {
                self.current = None;
                Err(FetchError::TransientNavigation(msg))
            }
            FakePage::SessionDies => {
                self.current = None;
                Err(FetchError::SessionLost("connection closed".into()))
            }
            page => {
                self.current = Some(page);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        self.load(url).await
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool, FetchError> {
        let found = match &self.current {
            Some(FakePage::Html(html)) => {
                let sel = Selector::parse(selector)
                    .map_err(|e| FetchError::StructuralMismatch(format!("{e:?}")))?;
                Html::parse_document(html).select(&sel).next().is_some()
            }
            _ => false,
        };
        if !found {
            tokio::time::sleep(timeout).await;
        }
        Ok(found)
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        match &self.current {
            Some(FakePage::Html(html)) => Ok(html.clone()),
            _ => Ok(String::from("<html><body></body></html>")),
        }
    }

    async fn reload(&mut self) -> Result<(), FetchError> {
        let url = self.current_url.clone().unwrap_or_default();
        self.load(&url).await
    }

    async fn close(self: Box<Self>) {
        self.browser.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Profile grid with `(item_id, pinned)` entries, newest first.
pub fn profile_html(items: &[(&str, bool)]) -> String {
    if items.is_empty() {
        return r#"<html><body><p data-e2e="user-post-empty">No content</p></body></html>"#
            .to_string();
    }
    let entries: String = items
        .iter()
        .map(|(id, pinned)| {
            let badge = if *pinned {
                r#"<div data-e2e="video-card-badge">Pinned</div>"#
            } else {
                ""
            };
            format!(
                r#"<div data-e2e="user-post-item">{badge}<a href="/@creator/video/{id}"></a></div>"#
            )
        })
        .collect();
    format!("<html><body><div>{entries}</div></body></html>")
}

pub fn challenge_html() -> String {
    r#"<html><body><div id="captcha-verify-container">Verify to continue</div></body></html>"#
        .to_string()
}
