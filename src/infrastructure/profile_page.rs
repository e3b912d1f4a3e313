//! Reading a rendered profile page.
//!
//! The fetcher waits for any of the layout's markers, then hands the DOM
//! snapshot to [`ProfileLayout::classify`], which is pure and works on the
//! HTML string alone. A page that rendered a body but none of the markers
//! means the layout changed.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::{ExternalHandle, ItemId, LatestItem};

/// CSS selectors and URL template describing a profile page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSelectors {
    /// Must contain `{handle}`.
    pub profile_url_template: String,
    /// One entry per post in the profile grid, newest first.
    pub item_selector: String,
    /// Link inside an entry whose href identifies the post.
    pub link_selector: String,
    /// Badge marking an entry as pinned.
    pub pinned_selector: String,
    /// Shown instead of the grid when the profile has no posts.
    pub empty_selector: String,
    /// Interactive verification overlay.
    pub challenge_selector: String,
}

impl Default for LayoutSelectors {
    fn default() -> Self {
        Self {
            profile_url_template: "https://www.tiktok.com/@{handle}".to_string(),
            item_selector: r#"div[data-e2e="user-post-item"]"#.to_string(),
            link_selector: "a".to_string(),
            pinned_selector: r#"div[data-e2e="video-card-badge"]"#.to_string(),
            empty_selector: r#"[data-e2e="user-post-item-list-empty"], p[data-e2e="user-post-empty"]"#
                .to_string(),
            challenge_selector:
                "#captcha-verify-container, .captcha-verify-container, #captcha_container"
                    .to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageState {
    Challenge,
    /// No unpinned posts.
    Empty,
    Latest(LatestItem),
    Unrecognised(String),
}

#[derive(Clone, Debug)]
pub struct ProfileLayout {
    selectors: LayoutSelectors,
    render_marker: String,
    item: Selector,
    link: Selector,
    pinned: Selector,
    empty: Selector,
    challenge: Selector,
    body_element: Selector,
}

impl ProfileLayout {
    pub fn new(selectors: LayoutSelectors) -> Result<Self, String> {
        if !selectors.profile_url_template.contains("{handle}") {
            return Err(format!(
                "profile_url_template {:?} has no {{handle}} placeholder",
                selectors.profile_url_template
            ));
        }
        let render_marker = format!(
            "{}, {}, {}",
            selectors.item_selector, selectors.empty_selector, selectors.challenge_selector
        );
        Ok(Self {
            item: parse_selector(&selectors.item_selector)?,
            link: parse_selector(&selectors.link_selector)?,
            pinned: parse_selector(&selectors.pinned_selector)?,
            empty: parse_selector(&selectors.empty_selector)?,
            challenge: parse_selector(&selectors.challenge_selector)?,
            body_element: parse_selector("body *")?,
            render_marker,
            selectors,
        })
    }

    pub fn profile_url(&self, handle: &ExternalHandle) -> String {
        self.selectors
            .profile_url_template
            .replace("{handle}", handle.as_str())
    }

    /// Selector group that matches once the page has settled into any state
    /// `classify` understands.
    pub fn render_marker(&self) -> &str {
        &self.render_marker
    }

    /// True once the document body holds any element, i.e. the page
    /// rendered something even if no marker matched.
    pub fn has_rendered_body(&self, html: &str) -> bool {
        Html::parse_document(html)
            .select(&self.body_element)
            .next()
            .is_some()
    }

    pub fn classify(&self, html: &str, page_url: &str) -> PageState {
        let doc = Html::parse_document(html);

        if doc.select(&self.challenge).next().is_some() {
            return PageState::Challenge;
        }

        let entries: Vec<ElementRef<'_>> = doc.select(&self.item).collect();
        if entries.is_empty() {
            if doc.select(&self.empty).next().is_some() {
                return PageState::Empty;
            }
            return PageState::Unrecognised("no post entries and no empty-profile marker".into());
        }

        let mut unpinned = 0usize;
        for entry in entries {
            if entry.select(&self.pinned).next().is_some() {
                continue;
            }
            unpinned += 1;
            let item = entry
                .select(&self.link)
                .filter_map(|a| a.value().attr("href"))
                .find_map(|href| item_from_href(href, page_url));
            if let Some(item) = item {
                return PageState::Latest(item);
            }
        }

        if unpinned == 0 {
            PageState::Empty
        } else {
            PageState::Unrecognised(format!("{unpinned} unpinned entries without a usable link"))
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector {css:?}: {e:?}"))
}

/// Resolve `href` against the page and use its last path segment as the id.
fn item_from_href(href: &str, page_url: &str) -> Option<LatestItem> {
    let base = Url::parse(page_url).ok()?;
    let mut url = base.join(href.trim()).ok()?;
    url.set_query(None);
    url.set_fragment(None);

    let id = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?
        .to_string();

    Some(LatestItem {
        id: ItemId::new(id),
        url: url.to_string(),
    })
}
