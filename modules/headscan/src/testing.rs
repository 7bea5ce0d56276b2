// Test doubles for the page renderer seam.
//
// MockRenderer maps normalized URLs to scripted pages and counts how many
// sessions are open at once, so tests can check the admission gate and that
// every session gets closed.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::renderer::{
    HeadNode, Navigation, ObservedResponse, PageRenderer, PageSession, RenderError, WaitUntil,
};

/// Scripted behavior for one URL.
#[derive(Debug, Clone)]
pub enum MockPage {
    Loaded {
        final_url: String,
        responses: Vec<ObservedResponse>,
        html: String,
        head: Vec<HeadNode>,
    },
    Timeout,
    Error(String),
    /// Navigation succeeds but the head query fails.
    BrokenDom { final_url: String },
    Panic,
    /// Navigation never resolves.
    Hang,
}

impl MockPage {
    /// A page with a title, a charset meta, and a script that should be skipped.
    pub fn titled(final_url: &str, title: &str) -> Self {
        MockPage::Loaded {
            final_url: final_url.to_string(),
            responses: vec![response(final_url, 200, None)],
            html: format!("<html><head><title>{title}</title></head><body></body></html>"),
            head: vec![
                node("TITLE", &[], Some(title)),
                node("META", &[("charset", "utf-8")], None),
                node("SCRIPT", &[("src", "/app.js")], Some("")),
            ],
        }
    }

    pub fn empty_head(final_url: &str) -> Self {
        MockPage::Loaded {
            final_url: final_url.to_string(),
            responses: vec![response(final_url, 200, None)],
            html: "<html><head></head><body></body></html>".to_string(),
            head: Vec::new(),
        }
    }

    /// Prepend redirect responses to a loaded page.
    pub fn with_redirects(self, hops: &[(&str, u16, Option<&str>)]) -> Self {
        match self {
            MockPage::Loaded {
                final_url,
                responses,
                html,
                head,
            } => {
                let mut all: Vec<ObservedResponse> = hops
                    .iter()
                    .map(|(url, status, location)| response(url, *status, *location))
                    .collect();
                all.extend(responses);
                MockPage::Loaded {
                    final_url,
                    responses: all,
                    html,
                    head,
                }
            }
            other => other,
        }
    }

    pub fn with_html(self, new_html: &str) -> Self {
        match self {
            MockPage::Loaded {
                final_url,
                responses,
                head,
                ..
            } => MockPage::Loaded {
                final_url,
                responses,
                html: new_html.to_string(),
                head,
            },
            other => other,
        }
    }
}

pub fn response(url: &str, status: u16, location: Option<&str>) -> ObservedResponse {
    ObservedResponse {
        url: url.to_string(),
        status,
        location: location.map(String::from),
    }
}

pub fn node(tag: &str, attributes: &[(&str, &str)], text: Option<&str>) -> HeadNode {
    HeadNode {
        tag: tag.to_string(),
        attributes: attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        text: text.map(String::from),
    }
}

#[derive(Debug, Default)]
struct Counters {
    open_attempts: AtomicUsize,
    open_now: AtomicUsize,
    peak_open: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    screenshots: AtomicUsize,
}

/// HashMap-based renderer. Unregistered URLs fail navigation with a DNS-style
/// error. Builder pattern: `.on_page()`, `.with_delay()`, `.failing_open()`,
/// `.panicking_open_on()`, `.panicking_close()`.
pub struct MockRenderer {
    pages: HashMap<String, MockPage>,
    delay: Duration,
    fail_open: bool,
    panic_open_on: Option<usize>,
    panic_close: bool,
    counters: Arc<Counters>,
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRenderer {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            delay: Duration::ZERO,
            fail_open: false,
            panic_open_on: None,
            panic_close: false,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Register a page under its normalized URL (`http://` added if missing).
    pub fn on_page(mut self, url: &str, page: MockPage) -> Self {
        self.pages.insert(headscan_common::normalize_url(url), page);
        self
    }

    /// Every navigation sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every `open()` fails.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// The `nth` call to `open()` (1-based) panics.
    pub fn panicking_open_on(mut self, nth: usize) -> Self {
        self.panic_open_on = Some(nth);
        self
    }

    /// `close()` releases the session, then panics.
    pub fn panicking_close(mut self) -> Self {
        self.panic_close = true;
        self
    }

    pub fn peak_open(&self) -> usize {
        self.counters.peak_open.load(Ordering::SeqCst)
    }

    pub fn open_now(&self) -> usize {
        self.counters.open_now.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn screenshots(&self) -> usize {
        self.counters.screenshots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for MockRenderer {
    async fn open(&self) -> Result<Box<dyn PageSession>, RenderError> {
        let attempt = self.counters.open_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_open_on == Some(attempt) {
            panic!("mock browser crashed on open #{attempt}");
        }
        if self.fail_open {
            return Err(RenderError::Unavailable("mock browser refused to start".into()));
        }
        let now = self.counters.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_open.fetch_max(now, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockSession {
            pages: self.pages.clone(),
            delay: self.delay,
            counters: self.counters.clone(),
            panic_close: self.panic_close,
            loaded: None,
            closed: false,
        }))
    }
}

struct MockSession {
    pages: HashMap<String, MockPage>,
    delay: Duration,
    counters: Arc<Counters>,
    panic_close: bool,
    loaded: Option<MockPage>,
    closed: bool,
}

#[async_trait]
impl PageSession for MockSession {
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        _wait: WaitUntil,
    ) -> Result<Navigation, RenderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let Some(page) = self.pages.get(url).cloned() else {
            return Err(RenderError::Navigation(format!(
                "net::ERR_NAME_NOT_RESOLVED at {url}"
            )));
        };
        let navigation = match &page {
            MockPage::Timeout => {
                return Err(RenderError::Timeout(format!(
                    "Navigation timeout of {} ms exceeded",
                    timeout.as_millis()
                )))
            }
            MockPage::Error(message) => return Err(RenderError::Navigation(message.clone())),
            MockPage::Panic => panic!("mock renderer crashed on {url}"),
            MockPage::Hang => std::future::pending().await,
            MockPage::Loaded {
                final_url,
                responses,
                ..
            } => Navigation {
                final_url: final_url.clone(),
                responses: responses.clone(),
            },
            MockPage::BrokenDom { final_url } => Navigation {
                final_url: final_url.clone(),
                responses: Vec::new(),
            },
        };
        self.loaded = Some(page);
        Ok(navigation)
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        match &self.loaded {
            Some(MockPage::Loaded { html, .. }) => Ok(html.clone()),
            Some(MockPage::BrokenDom { .. }) => Ok("<html><head>".to_string()),
            _ => Err(RenderError::NotLoaded),
        }
    }

    async fn head_children(&mut self) -> Result<Vec<HeadNode>, RenderError> {
        match &self.loaded {
            Some(MockPage::Loaded { head, .. }) => Ok(head.clone()),
            Some(MockPage::BrokenDom { .. }) => {
                Err(RenderError::Navigation("Execution context was destroyed".into()))
            }
            _ => Err(RenderError::NotLoaded),
        }
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, RenderError> {
        self.counters.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        if !self.closed {
            self.closed = true;
            self.counters.open_now.fetch_sub(1, Ordering::SeqCst);
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        if self.panic_close {
            panic!("mock browser crashed on close");
        }
        Ok(())
    }
}
