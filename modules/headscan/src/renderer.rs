// Page renderer seam.
//
// PageRenderer opens isolated sessions; each PageSession navigates once and
// answers DOM questions about the loaded page. The Browserless implementation
// lives here; tests use testing::MockRenderer.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use browserless_client::{BrowserlessClient, BrowserlessError, PageCapture};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Renderer unavailable: {0}")]
    Unavailable(String),

    #[error("Session has no loaded page")]
    NotLoaded,
}

impl RenderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RenderError::Timeout(_))
    }
}

impl From<BrowserlessError> for RenderError {
    fn from(err: BrowserlessError) -> Self {
        match err {
            BrowserlessError::Timeout(msg) => RenderError::Timeout(msg),
            BrowserlessError::Navigation { name, message } => {
                RenderError::Navigation(format!("{name}: {message}"))
            }
            other => RenderError::Unavailable(other.to_string()),
        }
    }
}

/// Lifecycle point at which navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// DOM parsed; subresources may still be loading.
    #[default]
    DomContentLoaded,
    Load,
}

impl WaitUntil {
    pub fn as_puppeteer(&self) -> &'static str {
        match self {
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::Load => "load",
        }
    }
}

impl FromStr for WaitUntil {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "domcontentloaded" => Ok(WaitUntil::DomContentLoaded),
            "load" => Ok(WaitUntil::Load),
            other => Err(format!("unknown wait policy: {other}")),
        }
    }
}

/// A response seen during navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedResponse {
    pub url: String,
    pub status: u16,
    pub location: Option<String>,
}

/// What a finished navigation reports: where it ended up, and every
/// response on the way there, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    pub final_url: String,
    pub responses: Vec<ObservedResponse>,
}

/// Snapshot of one `head > *` element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeadNode {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Open an isolated browser context.
    async fn open(&self) -> Result<Box<dyn PageSession>, RenderError>;
}

#[async_trait]
pub trait PageSession: Send {
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        wait: WaitUntil,
    ) -> Result<Navigation, RenderError>;

    /// Rendered HTML of the loaded page.
    async fn content(&mut self) -> Result<String, RenderError>;

    /// Direct children of `<head>`, in document order.
    async fn head_children(&mut self) -> Result<Vec<HeadNode>, RenderError>;

    /// PNG of the current page (or of the attempted URL if loading failed).
    async fn screenshot(&mut self) -> Result<Vec<u8>, RenderError>;

    /// Release the context. Called exactly once on every exit path.
    async fn close(&mut self) -> Result<(), RenderError>;
}

// ---------------------------------------------------------------------------
// Browserless
// ---------------------------------------------------------------------------

/// Renderer backed by a remote Browserless instance. Each session maps to
/// one `/function` call, so the remote page is gone once `navigate` returns;
/// later DOM queries read the captured snapshot.
pub struct BrowserlessRenderer {
    client: Arc<BrowserlessClient>,
}

impl BrowserlessRenderer {
    pub fn new(client: BrowserlessClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl PageRenderer for BrowserlessRenderer {
    async fn open(&self) -> Result<Box<dyn PageSession>, RenderError> {
        Ok(Box::new(BrowserlessSession {
            client: self.client.clone(),
            url: None,
            timeout: Duration::from_secs(10),
            capture: None,
        }))
    }
}

struct BrowserlessSession {
    client: Arc<BrowserlessClient>,
    url: Option<String>,
    timeout: Duration,
    capture: Option<PageCapture>,
}

impl BrowserlessSession {
    fn loaded(&self) -> Result<&PageCapture, RenderError> {
        self.capture.as_ref().ok_or(RenderError::NotLoaded)
    }
}

#[async_trait]
impl PageSession for BrowserlessSession {
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        wait: WaitUntil,
    ) -> Result<Navigation, RenderError> {
        self.url = Some(url.to_string());
        self.timeout = timeout;

        let capture = self.client.capture(url, timeout, wait.as_puppeteer()).await?;
        let navigation = Navigation {
            final_url: capture.final_url.clone(),
            responses: capture
                .responses
                .iter()
                .map(|r| ObservedResponse {
                    url: r.url.clone(),
                    status: r.status,
                    location: r.location.clone(),
                })
                .collect(),
        };
        self.capture = Some(capture);
        Ok(navigation)
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        Ok(self.loaded()?.html.clone())
    }

    async fn head_children(&mut self) -> Result<Vec<HeadNode>, RenderError> {
        Ok(self
            .loaded()?
            .head
            .iter()
            .map(|el| HeadNode {
                tag: el.tag.clone(),
                attributes: el.attributes.clone(),
                text: el.text.clone(),
            })
            .collect())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, RenderError> {
        let url = match (&self.capture, &self.url) {
            (Some(capture), _) => capture.final_url.clone(),
            (None, Some(url)) => url.clone(),
            (None, None) => return Err(RenderError::NotLoaded),
        };
        Ok(self.client.screenshot(&url, self.timeout).await?)
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        debug!(url = self.url.as_deref().unwrap_or(""), "Closing browserless session");
        self.capture = None;
        Ok(())
    }
}
